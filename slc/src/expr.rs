use crate::error::CompilerError;
use crate::token::{Punct, Token};

/// Binary operators from lowest to highest precedence
const LEVELS: &[&[Punct]] = &[
    &[Punct::OrOp],
    &[Punct::AndOp],
    &[Punct::VerticalBar],
    &[Punct::Caret],
    &[Punct::Ampersand],
    &[Punct::EqOp, Punct::NeOp],
    &[Punct::LeftAngle, Punct::RightAngle, Punct::LeOp, Punct::GeOp],
    &[Punct::LeftOp, Punct::RightOp],
    &[Punct::Plus, Punct::Dash],
    &[Punct::Star, Punct::Slash, Punct::Percent],
];

/// Deepest nesting of parentheses and unary operators in one expression
const MAX_NESTING: usize = 128;

fn expr_error(message: impl Into<String>) -> CompilerError {
    CompilerError::Preprocessor(message.into())
}

/// Evaluate a fully macro-expanded `#if` expression
///
/// `defined` must already have been replaced by constants. Identifiers that
/// remain evaluate to 0.
pub(crate) fn evaluate(tokens: &[Token]) -> Result<i64, CompilerError> {
    if tokens.is_empty() {
        return Err(expr_error("Expected an expression after #if"));
    }
    let mut pos = 0;
    let value = parse_level(tokens, &mut pos, 0, 0)?;
    if let Some(extra) = tokens.get(pos) {
        return Err(expr_error(format!("Unexpected \"{extra}\" in #if expression")));
    }
    Ok(value)
}

fn nested(depth: usize) -> Result<usize, CompilerError> {
    if depth >= MAX_NESTING {
        return Err(expr_error("#if expression nested too deeply"));
    }
    Ok(depth + 1)
}

fn parse_level(
    tokens: &[Token],
    pos: &mut usize,
    level: usize,
    depth: usize,
) -> Result<i64, CompilerError> {
    let Some(ops) = LEVELS.get(level) else {
        return parse_unary(tokens, pos, depth);
    };
    let mut lhs = parse_level(tokens, pos, level + 1, depth)?;
    while let Some(Token::Punct(op)) = tokens.get(*pos)
        && ops.contains(op)
    {
        *pos += 1;
        let rhs = parse_level(tokens, pos, level + 1, depth)?;
        lhs = apply(*op, lhs, rhs)?;
    }
    Ok(lhs)
}

fn apply(op: Punct, lhs: i64, rhs: i64) -> Result<i64, CompilerError> {
    let value = match op {
        Punct::OrOp => i64::from(lhs != 0 || rhs != 0),
        Punct::AndOp => i64::from(lhs != 0 && rhs != 0),
        Punct::VerticalBar => lhs | rhs,
        Punct::Caret => lhs ^ rhs,
        Punct::Ampersand => lhs & rhs,
        Punct::EqOp => i64::from(lhs == rhs),
        Punct::NeOp => i64::from(lhs != rhs),
        Punct::LeftAngle => i64::from(lhs < rhs),
        Punct::RightAngle => i64::from(lhs > rhs),
        Punct::LeOp => i64::from(lhs <= rhs),
        Punct::GeOp => i64::from(lhs >= rhs),
        Punct::LeftOp => lhs.wrapping_shl(rhs as u32),
        Punct::RightOp => lhs.wrapping_shr(rhs as u32),
        Punct::Plus => lhs.wrapping_add(rhs),
        Punct::Dash => lhs.wrapping_sub(rhs),
        Punct::Star => lhs.wrapping_mul(rhs),
        Punct::Slash | Punct::Percent if rhs == 0 => {
            return Err(expr_error("Division by zero in #if expression"));
        }
        Punct::Slash => lhs.wrapping_div(rhs),
        Punct::Percent => lhs.wrapping_rem(rhs),
        _ => return Err(expr_error(format!("Unsupported operator \"{}\"", op.as_str()))),
    };
    Ok(value)
}

fn parse_unary(tokens: &[Token], pos: &mut usize, depth: usize) -> Result<i64, CompilerError> {
    let op = match tokens.get(*pos) {
        Some(Token::Punct(op @ (Punct::Bang | Punct::Tilde | Punct::Dash | Punct::Plus))) => *op,
        _ => return parse_primary(tokens, pos, depth),
    };
    *pos += 1;
    let value = parse_unary(tokens, pos, nested(depth)?)?;
    Ok(match op {
        Punct::Bang => i64::from(value == 0),
        Punct::Tilde => !value,
        Punct::Dash => value.wrapping_neg(),
        _ => value,
    })
}

fn parse_primary(tokens: &[Token], pos: &mut usize, depth: usize) -> Result<i64, CompilerError> {
    let Some(token) = tokens.get(*pos) else {
        return Err(expr_error("Unexpected end of #if expression"));
    };
    *pos += 1;
    match token {
        Token::IntConstant(v) => Ok(i64::from(*v)),
        Token::UintConstant(v) => Ok(i64::from(*v)),
        Token::Identifier(_) => Ok(0),
        Token::Punct(Punct::LeftParen) => {
            let value = parse_level(tokens, pos, 0, nested(depth)?)?;
            if !matches!(tokens.get(*pos), Some(Token::Punct(Punct::RightParen))) {
                return Err(expr_error("Expected \")\" in #if expression"));
            }
            *pos += 1;
            Ok(value)
        }
        other => Err(expr_error(format!(
            "Unexpected \"{other}\" in #if expression"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Diagnostic;
    use crate::tokenizer::Tokenizer;
    use std::rc::Rc;

    fn eval(src: &str) -> Result<i64, CompilerError> {
        let mut tokenizer = Tokenizer::from_bytes("<expr>", Rc::from(src.as_bytes()));
        let mut tokens = Vec::new();
        loop {
            let token = tokenizer.read_token(&mut |_: Diagnostic| {});
            if token.is_eof() {
                break;
            }
            if !token.is_skipped() {
                tokens.push(token);
            }
        }
        evaluate(&tokens)
    }

    #[test]
    fn precedence() {
        assert_eq!(eval("2 + 3 * 4").unwrap(), 14);
        assert_eq!(eval("(2 + 3) * 4").unwrap(), 20);
        assert_eq!(eval("1 << 2 + 1").unwrap(), 8);
        assert_eq!(eval("1 | 2 & 3").unwrap(), 3);
    }

    #[test]
    fn logical_and_comparison() {
        assert_eq!(eval("5 > 3 && 10 >= 10 && 2 < 4 && 3 != 4").unwrap(), 1);
        assert_eq!(eval("(1 && 0) || (0 && 1)").unwrap(), 0);
        assert_eq!(eval("!0 && !!1 && -(-5) == 5 && ~0 == -1").unwrap(), 1);
    }

    #[test]
    fn unknown_identifiers_are_zero() {
        assert_eq!(eval("UNDEFINED_THING + 1").unwrap(), 1);
    }

    #[test]
    fn errors() {
        assert!(eval("1 / 0").is_err());
        assert!(eval("(1 + 2").is_err());
        assert!(eval("1 2").is_err());
        assert!(eval("").is_err());
        assert!(eval("1.5").is_err());
    }

    #[test]
    fn deep_nesting_is_an_error() {
        let parens = format!("{}1{}", "(".repeat(5000), ")".repeat(5000));
        let err = eval(&parens).unwrap_err();
        assert_eq!(err.to_string(), "#if expression nested too deeply");

        let negations = format!("{}1", "- ".repeat(50_000));
        assert!(eval(&negations).is_err());
        assert!(eval(&format!("{}1", "! ".repeat(MAX_NESTING + 1))).is_err());
    }

    #[test]
    fn moderate_nesting_evaluates() {
        let parens = format!("{}7{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(eval(&parens).unwrap(), 7);
        assert_eq!(eval(&format!("{}1", "- ".repeat(MAX_NESTING))).unwrap(), 1);
    }
}
