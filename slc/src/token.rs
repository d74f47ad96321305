use std::fmt;

/// Check if a character can start an identifier (letter or underscore)
pub const fn is_identifier_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

/// Check if a character can continue an identifier (letter, digit, or underscore)
pub const fn is_identifier_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// Check whether `name` is spelled like an identifier of the language
#[must_use]
pub fn is_valid_identifier(name: &str) -> bool {
    let bytes = name.as_bytes();
    match bytes.split_first() {
        Some((&first, rest)) => {
            is_identifier_start(first) && rest.iter().all(|&c| is_identifier_continue(c))
        }
        None => false,
    }
}

/// Punctuators and operators
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Punct {
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Dot,
    Comma,
    Colon,
    Semicolon,
    Equal,
    Bang,
    Dash,
    Tilde,
    Plus,
    Star,
    Slash,
    Percent,
    LeftAngle,
    RightAngle,
    VerticalBar,
    Caret,
    Ampersand,
    Question,
    Hash,
    LeftOp,
    RightOp,
    IncOp,
    DecOp,
    LeOp,
    GeOp,
    EqOp,
    NeOp,
    AndOp,
    OrOp,
    XorOp,
    MulAssign,
    DivAssign,
    AddAssign,
    ModAssign,
    LeftAssign,
    RightAssign,
    AndAssign,
    XorAssign,
    OrAssign,
    SubAssign,
}

impl Punct {
    /// Source spelling of the punctuator
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Punct::LeftParen => "(",
            Punct::RightParen => ")",
            Punct::LeftBracket => "[",
            Punct::RightBracket => "]",
            Punct::LeftBrace => "{",
            Punct::RightBrace => "}",
            Punct::Dot => ".",
            Punct::Comma => ",",
            Punct::Colon => ":",
            Punct::Semicolon => ";",
            Punct::Equal => "=",
            Punct::Bang => "!",
            Punct::Dash => "-",
            Punct::Tilde => "~",
            Punct::Plus => "+",
            Punct::Star => "*",
            Punct::Slash => "/",
            Punct::Percent => "%",
            Punct::LeftAngle => "<",
            Punct::RightAngle => ">",
            Punct::VerticalBar => "|",
            Punct::Caret => "^",
            Punct::Ampersand => "&",
            Punct::Question => "?",
            Punct::Hash => "#",
            Punct::LeftOp => "<<",
            Punct::RightOp => ">>",
            Punct::IncOp => "++",
            Punct::DecOp => "--",
            Punct::LeOp => "<=",
            Punct::GeOp => ">=",
            Punct::EqOp => "==",
            Punct::NeOp => "!=",
            Punct::AndOp => "&&",
            Punct::OrOp => "||",
            Punct::XorOp => "^^",
            Punct::MulAssign => "*=",
            Punct::DivAssign => "/=",
            Punct::AddAssign => "+=",
            Punct::ModAssign => "%=",
            Punct::LeftAssign => "<<=",
            Punct::RightAssign => ">>=",
            Punct::AndAssign => "&=",
            Punct::XorAssign => "^=",
            Punct::OrAssign => "|=",
            Punct::SubAssign => "-=",
        }
    }
}

/// A lexical unit produced by the tokenizer
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    /// End of input
    Eof,
    /// Line break; significant to the preprocessor only
    Newline,
    /// Run of blanks or an escaped line break
    Whitespace,
    /// `//` or `/* */` comment
    Comment,
    /// Placeholder for input the tokenizer could not read
    Error,
    /// Identifier or keyword
    Identifier(String),
    /// Signed integer constant
    IntConstant(i32),
    /// Unsigned integer constant (`u` suffix)
    UintConstant(u32),
    /// Single precision float constant
    FloatConstant(f32),
    /// Double precision float constant (`lf` suffix)
    DoubleConstant(f64),
    /// Double-quoted string, only used by include directives
    String(String),
    /// Punctuator or operator
    Punct(Punct),
}

impl Token {
    /// Tokens the preprocessor and parser never see
    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Token::Whitespace | Token::Comment | Token::Error)
    }

    /// Check for end of input
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        matches!(self, Token::Eof)
    }

    /// Check for a specific punctuator
    #[must_use]
    pub fn is_punct(&self, punct: Punct) -> bool {
        matches!(self, Token::Punct(p) if *p == punct)
    }

    /// Return the identifier text if this is an identifier
    #[must_use]
    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Token::Identifier(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Eof => f.write_str("<EOF>"),
            Token::Newline => f.write_str("\n"),
            Token::Whitespace => f.write_str(" "),
            Token::Comment => f.write_str("/* */"),
            Token::Error => f.write_str("<error>"),
            Token::Identifier(s) => f.write_str(s),
            Token::IntConstant(v) => write!(f, "{v}"),
            Token::UintConstant(v) => write!(f, "{v}u"),
            Token::FloatConstant(v) => write!(f, "{v:?}"),
            Token::DoubleConstant(v) => write!(f, "{v:?}lf"),
            Token::String(s) => write!(f, "\"{s}\""),
            Token::Punct(p) => f.write_str(p.as_str()),
        }
    }
}
