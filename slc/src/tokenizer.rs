use std::rc::Rc;

use crate::code_source::CodeSource;
use crate::diagnostic::{Diagnostic, DiagnosticSink};
use crate::error::{CompilerError, CompilerWarning};
use crate::location::SourceLocation;
use crate::token::{Punct, Token, is_identifier_continue, is_identifier_start};

/// Splits source bytes into tokens
///
/// Problems are reported to the sink passed to [`Tokenizer::read_token`];
/// after a fatal report the offending input is returned as [`Token::Error`]
/// and reading can continue.
pub struct Tokenizer {
    source_name: String,
    data: Rc<[u8]>,
    pos: usize,
    location: SourceLocation,
}

impl Tokenizer {
    /// Create a tokenizer over the content of `source`
    ///
    /// # Errors
    /// Returns the load error if the source cannot be read.
    pub fn new(source: &CodeSource) -> Result<Self, CompilerError> {
        let data = source.load()?;
        Ok(Self::from_bytes(source.name(), data))
    }

    /// Create a tokenizer over raw bytes
    #[must_use]
    pub fn from_bytes(source_name: impl Into<String>, data: Rc<[u8]>) -> Self {
        Self {
            source_name: source_name.into(),
            data,
            pos: 0,
            location: SourceLocation::default(),
        }
    }

    /// Display name of the source being read
    #[must_use]
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Location of the next token
    #[must_use]
    pub const fn location(&self) -> SourceLocation {
        self.location
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.data.get(self.pos + offset).copied()
    }

    fn advance(&mut self, n: usize) {
        self.pos += n;
        self.location.column += n;
    }

    /// Consume one line break (`\n`, `\r\n` or `\r`) if present
    fn consume_newline(&mut self) -> bool {
        let len = match (self.peek(0), self.peek(1)) {
            (Some(b'\r'), Some(b'\n')) => 2,
            (Some(b'\n' | b'\r'), _) => 1,
            _ => return false,
        };
        self.pos += len;
        self.location.line += 1;
        self.location.column = 0;
        true
    }

    fn is_escaped_newline(&self) -> bool {
        self.peek(0) == Some(b'\\') && matches!(self.peek(1), Some(b'\n' | b'\r'))
    }

    fn fatal(
        &self,
        sink: &mut dyn DiagnosticSink,
        start: SourceLocation,
        token: &Token,
        message: String,
    ) {
        sink.report(Diagnostic::error(
            &self.source_name,
            start,
            token.clone(),
            CompilerError::Lexical(message),
        ));
    }

    fn warn(
        &self,
        sink: &mut dyn DiagnosticSink,
        start: SourceLocation,
        token: &Token,
        warning: CompilerWarning,
    ) {
        sink.report(Diagnostic::warning(
            &self.source_name,
            start,
            token.clone(),
            warning,
        ));
    }

    /// Read the next token, reporting problems to `sink`
    pub fn read_token(&mut self, sink: &mut dyn DiagnosticSink) -> Token {
        let start = self.location;
        let Some(c) = self.peek(0) else {
            return Token::Eof;
        };

        match c {
            b'\n' | b'\r' => {
                self.consume_newline();
                Token::Newline
            }
            b' ' | b'\t' | 0x0b | 0x0c | b'\\' if c != b'\\' || self.is_escaped_newline() => {
                self.read_whitespace();
                Token::Whitespace
            }
            b'/' if self.peek(1) == Some(b'/') => {
                while let Some(c) = self.peek(0) {
                    if c == b'\n' || c == b'\r' {
                        break;
                    }
                    self.advance(1);
                }
                Token::Comment
            }
            b'/' if self.peek(1) == Some(b'*') => self.read_block_comment(sink, start),
            b'"' => self.read_string(sink, start),
            b'0'..=b'9' => self.read_number(sink, start),
            b'.' if self.peek(1).is_some_and(|d| d.is_ascii_digit()) => {
                self.read_number(sink, start)
            }
            c if is_identifier_start(c) => {
                let begin = self.pos;
                while self.peek(0).is_some_and(is_identifier_continue) {
                    self.advance(1);
                }
                let ident = String::from_utf8_lossy(&self.data[begin..self.pos]).into_owned();
                Token::Identifier(ident)
            }
            _ => match self.read_punct() {
                Some(punct) => Token::Punct(punct),
                None => {
                    let len = utf8_len(c).min(self.data.len() - self.pos);
                    let text = match std::str::from_utf8(&self.data[self.pos..self.pos + len]) {
                        Ok(s) => format!("'{s}'"),
                        Err(_) => format!("0x{c:02x}"),
                    };
                    self.advance(len);
                    let token = Token::Error;
                    self.fatal(sink, start, &token, format!("Unexpected character {text}"));
                    token
                }
            },
        }
    }

    fn read_whitespace(&mut self) {
        loop {
            match self.peek(0) {
                Some(b' ' | b'\t' | 0x0b | 0x0c) => self.advance(1),
                Some(b'\\') if self.is_escaped_newline() => {
                    self.advance(1);
                    self.consume_newline();
                }
                _ => break,
            }
        }
    }

    fn read_block_comment(&mut self, sink: &mut dyn DiagnosticSink, start: SourceLocation) -> Token {
        self.advance(2);
        loop {
            match self.peek(0) {
                None => {
                    let token = Token::Error;
                    self.fatal(sink, start, &token, "Unterminated comment".to_string());
                    return token;
                }
                Some(b'*') if self.peek(1) == Some(b'/') => {
                    self.advance(2);
                    return Token::Comment;
                }
                Some(b'\n' | b'\r') => {
                    self.consume_newline();
                }
                Some(_) => self.advance(1),
            }
        }
    }

    fn read_string(&mut self, sink: &mut dyn DiagnosticSink, start: SourceLocation) -> Token {
        self.advance(1);
        let begin = self.pos;
        loop {
            match self.peek(0) {
                None | Some(b'\n' | b'\r') => {
                    let token = Token::Error;
                    self.fatal(sink, start, &token, "Unterminated string literal".to_string());
                    return token;
                }
                Some(b'"') => {
                    let text = String::from_utf8_lossy(&self.data[begin..self.pos]).into_owned();
                    self.advance(1);
                    return Token::String(text);
                }
                Some(_) => self.advance(1),
            }
        }
    }

    fn scan_digits(&mut self, radix: u32) -> usize {
        let begin = self.pos;
        while self
            .peek(0)
            .is_some_and(|c| (c as char).is_digit(radix))
        {
            self.advance(1);
        }
        self.pos - begin
    }

    fn read_number(&mut self, sink: &mut dyn DiagnosticSink, start: SourceLocation) -> Token {
        let begin = self.pos;

        if self.peek(0) == Some(b'0') && matches!(self.peek(1), Some(b'x' | b'X')) {
            self.advance(2);
            let digits_start = self.pos;
            if self.scan_digits(16) == 0 {
                return self.finish_invalid(sink, start, "Invalid hexadecimal constant");
            }
            let text = String::from_utf8_lossy(&self.data[digits_start..self.pos]).into_owned();
            return self.finish_integer(sink, start, &text, 16);
        }

        self.scan_digits(10);
        let mut is_float = false;
        if self.peek(0) == Some(b'.') {
            is_float = true;
            self.advance(1);
            self.scan_digits(10);
        }
        if matches!(self.peek(0), Some(b'e' | b'E')) {
            is_float = true;
            self.advance(1);
            if matches!(self.peek(0), Some(b'+' | b'-')) {
                self.advance(1);
            }
            if self.scan_digits(10) == 0 {
                return self.finish_invalid(sink, start, "Exponent has no digits");
            }
        }

        let text = String::from_utf8_lossy(&self.data[begin..self.pos]).into_owned();
        if is_float {
            return self.finish_float(sink, start, &text);
        }
        if matches!(self.peek(0), Some(b'f' | b'F')) || self.at_double_suffix() {
            return self.finish_float(sink, start, &text);
        }
        if text.len() > 1 && text.starts_with('0') {
            if !text.bytes().all(|c| (b'0'..=b'7').contains(&c)) {
                return self.finish_invalid(sink, start, "Invalid octal constant");
            }
            return self.finish_integer(sink, start, &text[1..], 8);
        }
        self.finish_integer(sink, start, &text, 10)
    }

    fn at_double_suffix(&self) -> bool {
        matches!(
            (self.peek(0), self.peek(1)),
            (Some(b'l'), Some(b'f')) | (Some(b'L'), Some(b'F'))
        )
    }

    fn finish_integer(
        &mut self,
        sink: &mut dyn DiagnosticSink,
        start: SourceLocation,
        digits: &str,
        radix: u32,
    ) -> Token {
        let unsigned = matches!(self.peek(0), Some(b'u' | b'U'));
        if unsigned {
            self.advance(1);
        }
        if self.peek(0).is_some_and(is_identifier_continue) {
            return self.finish_invalid(sink, start, "Invalid suffix on integer constant");
        }

        let (value, overflow) = parse_u32(digits, radix);
        let token = if unsigned {
            Token::UintConstant(value)
        } else {
            Token::IntConstant(value as i32)
        };
        if overflow {
            self.warn(
                sink,
                start,
                &token,
                CompilerWarning::ConstantOverflow(if unsigned { "unsigned" } else { "integer" }),
            );
        }
        token
    }

    fn finish_float(
        &mut self,
        sink: &mut dyn DiagnosticSink,
        start: SourceLocation,
        text: &str,
    ) -> Token {
        let double = self.at_double_suffix();
        if double {
            self.advance(2);
        } else if matches!(self.peek(0), Some(b'f' | b'F')) {
            self.advance(1);
        }
        if self.peek(0).is_some_and(is_identifier_continue) {
            return self.finish_invalid(sink, start, "Invalid suffix on floating point constant");
        }

        let Ok(value) = text.parse::<f64>() else {
            return self.finish_invalid(sink, start, "Invalid floating point constant");
        };
        let (token, overflow) = if double {
            (Token::DoubleConstant(value), value.is_infinite())
        } else {
            let narrowed = value as f32;
            (Token::FloatConstant(narrowed), narrowed.is_infinite())
        };
        if overflow {
            self.warn(
                sink,
                start,
                &token,
                CompilerWarning::ConstantOverflow(if double { "double" } else { "float" }),
            );
        }
        token
    }

    /// Skip the rest of a malformed constant and report it
    fn finish_invalid(
        &mut self,
        sink: &mut dyn DiagnosticSink,
        start: SourceLocation,
        message: &str,
    ) -> Token {
        while self.peek(0).is_some_and(|c| is_identifier_continue(c) || c == b'.') {
            self.advance(1);
        }
        let token = Token::Error;
        self.fatal(sink, start, &token, message.to_string());
        token
    }

    fn read_punct(&mut self) -> Option<Punct> {
        let c0 = self.peek(0)?;
        let c1 = self.peek(1);
        let c2 = self.peek(2);

        let (punct, len) = match (c0, c1, c2) {
            (b'<', Some(b'<'), Some(b'=')) => (Punct::LeftAssign, 3),
            (b'>', Some(b'>'), Some(b'=')) => (Punct::RightAssign, 3),
            (b'<', Some(b'<'), _) => (Punct::LeftOp, 2),
            (b'>', Some(b'>'), _) => (Punct::RightOp, 2),
            (b'<', Some(b'='), _) => (Punct::LeOp, 2),
            (b'>', Some(b'='), _) => (Punct::GeOp, 2),
            (b'=', Some(b'='), _) => (Punct::EqOp, 2),
            (b'!', Some(b'='), _) => (Punct::NeOp, 2),
            (b'&', Some(b'&'), _) => (Punct::AndOp, 2),
            (b'|', Some(b'|'), _) => (Punct::OrOp, 2),
            (b'^', Some(b'^'), _) => (Punct::XorOp, 2),
            (b'+', Some(b'+'), _) => (Punct::IncOp, 2),
            (b'-', Some(b'-'), _) => (Punct::DecOp, 2),
            (b'*', Some(b'='), _) => (Punct::MulAssign, 2),
            (b'/', Some(b'='), _) => (Punct::DivAssign, 2),
            (b'+', Some(b'='), _) => (Punct::AddAssign, 2),
            (b'%', Some(b'='), _) => (Punct::ModAssign, 2),
            (b'&', Some(b'='), _) => (Punct::AndAssign, 2),
            (b'^', Some(b'='), _) => (Punct::XorAssign, 2),
            (b'|', Some(b'='), _) => (Punct::OrAssign, 2),
            (b'-', Some(b'='), _) => (Punct::SubAssign, 2),
            (b'(', _, _) => (Punct::LeftParen, 1),
            (b')', _, _) => (Punct::RightParen, 1),
            (b'[', _, _) => (Punct::LeftBracket, 1),
            (b']', _, _) => (Punct::RightBracket, 1),
            (b'{', _, _) => (Punct::LeftBrace, 1),
            (b'}', _, _) => (Punct::RightBrace, 1),
            (b'.', _, _) => (Punct::Dot, 1),
            (b',', _, _) => (Punct::Comma, 1),
            (b':', _, _) => (Punct::Colon, 1),
            (b';', _, _) => (Punct::Semicolon, 1),
            (b'=', _, _) => (Punct::Equal, 1),
            (b'!', _, _) => (Punct::Bang, 1),
            (b'-', _, _) => (Punct::Dash, 1),
            (b'~', _, _) => (Punct::Tilde, 1),
            (b'+', _, _) => (Punct::Plus, 1),
            (b'*', _, _) => (Punct::Star, 1),
            (b'/', _, _) => (Punct::Slash, 1),
            (b'%', _, _) => (Punct::Percent, 1),
            (b'<', _, _) => (Punct::LeftAngle, 1),
            (b'>', _, _) => (Punct::RightAngle, 1),
            (b'|', _, _) => (Punct::VerticalBar, 1),
            (b'^', _, _) => (Punct::Caret, 1),
            (b'&', _, _) => (Punct::Ampersand, 1),
            (b'?', _, _) => (Punct::Question, 1),
            (b'#', _, _) => (Punct::Hash, 1),
            _ => return None,
        };
        self.advance(len);
        Some(punct)
    }
}

/// Length of a UTF-8 sequence from its leading byte
const fn utf8_len(lead: u8) -> usize {
    match lead {
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => 1,
    }
}

/// Parse digits in `radix`, wrapping to 32 bits; the flag reports overflow
fn parse_u32(digits: &str, radix: u32) -> (u32, bool) {
    let mut value: u64 = 0;
    let mut overflow = false;
    for c in digits.chars() {
        let Some(d) = c.to_digit(radix) else {
            break;
        };
        value = value * u64::from(radix) + u64::from(d);
        if value > u64::from(u32::MAX) {
            overflow = true;
            value &= u64::from(u32::MAX);
        }
    }
    (value as u32, overflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::DiagnosticKind;

    fn tokenize(input: &str) -> (Vec<Token>, Vec<Diagnostic>) {
        let mut tokenizer = Tokenizer::from_bytes("<test>", Rc::from(input.as_bytes()));
        let mut diagnostics = Vec::new();
        let mut tokens = Vec::new();
        loop {
            let token = tokenizer.read_token(&mut |d: Diagnostic| diagnostics.push(d));
            if token.is_eof() {
                break;
            }
            if !token.is_skipped() {
                tokens.push(token);
            }
        }
        (tokens, diagnostics)
    }

    fn ident(s: &str) -> Token {
        Token::Identifier(s.to_string())
    }

    #[test]
    fn declaration() {
        let (tokens, diags) = tokenize("uniform vec4 color;");
        assert!(diags.is_empty());
        assert_eq!(
            tokens,
            vec![
                ident("uniform"),
                ident("vec4"),
                ident("color"),
                Token::Punct(Punct::Semicolon)
            ]
        );
    }

    #[test]
    fn numbers() {
        let (tokens, diags) = tokenize("42 0x1F 017 3u 1.5 .5 2e3 1.0f 2.0lf");
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(
            tokens,
            vec![
                Token::IntConstant(42),
                Token::IntConstant(31),
                Token::IntConstant(15),
                Token::UintConstant(3),
                Token::FloatConstant(1.5),
                Token::FloatConstant(0.5),
                Token::FloatConstant(2000.0),
                Token::FloatConstant(1.0),
                Token::DoubleConstant(2.0),
            ]
        );
    }

    #[test]
    fn longest_operator_match() {
        let (tokens, _) = tokenize("a <<= b >> c && d++");
        let puncts: Vec<_> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Punct(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(
            puncts,
            vec![Punct::LeftAssign, Punct::RightOp, Punct::AndOp, Punct::IncOp]
        );
    }

    #[test]
    fn comments_and_whitespace_are_skipped() {
        let (tokens, diags) = tokenize("a /* block\ncomment */ b // line\nc");
        assert!(diags.is_empty());
        assert_eq!(
            tokens,
            vec![ident("a"), ident("b"), Token::Newline, ident("c")]
        );
    }

    #[test]
    fn locations_track_lines_and_columns() {
        let mut tokenizer = Tokenizer::from_bytes("<test>", Rc::from(&b"ab\n  cd"[..]));
        let mut sink = |_: Diagnostic| {};
        assert_eq!(tokenizer.location(), SourceLocation::new(0, 0));
        tokenizer.read_token(&mut sink);
        tokenizer.read_token(&mut sink);
        tokenizer.read_token(&mut sink);
        assert_eq!(tokenizer.location(), SourceLocation::new(1, 2));
        assert_eq!(tokenizer.read_token(&mut sink), ident("cd"));
    }

    #[test]
    fn escaped_newline_is_whitespace() {
        let (tokens, _) = tokenize("a \\\n b");
        assert_eq!(tokens, vec![ident("a"), ident("b")]);
    }

    #[test]
    fn unexpected_character_is_fatal() {
        let (tokens, diags) = tokenize("a $ b");
        assert_eq!(tokens, vec![ident("a"), ident("b")]);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].is_fatal());
        assert_eq!(diags[0].location, SourceLocation::new(0, 2));
        assert_eq!(diags[0].to_string(), "  1: 2: Unexpected character '$'");
    }

    #[test]
    fn unterminated_comment_is_fatal() {
        let (_, diags) = tokenize("a /* never closed");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].is_fatal());
    }

    #[test]
    fn malformed_numbers_are_fatal() {
        for input in ["0x", "1e", "09", "12abc"] {
            let (_, diags) = tokenize(input);
            assert_eq!(diags.len(), 1, "{input}");
            assert!(diags[0].is_fatal(), "{input}");
        }
    }

    #[test]
    fn integer_overflow_is_a_warning() {
        let (tokens, diags) = tokenize("4294967296");
        assert_eq!(tokens, vec![Token::IntConstant(0)]);
        assert_eq!(diags.len(), 1);
        assert!(matches!(
            diags[0].kind,
            DiagnosticKind::Warning(CompilerWarning::ConstantOverflow("integer"))
        ));
    }

    #[test]
    fn strings() {
        let (tokens, diags) = tokenize("\"lib/common.glsl\"");
        assert!(diags.is_empty());
        assert_eq!(tokens, vec![Token::String("lib/common.glsl".into())]);

        let (_, diags) = tokenize("\"open\nx");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].is_fatal());
    }
}
