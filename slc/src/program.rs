use crate::error::CompilerError;
use crate::location::SourceLocation;
use crate::preprocessor::Preprocessor;
use crate::token::{Punct, Token};

/// A top-level declaration: everything up to a `;` or a closing `}` at
/// nesting depth zero
#[derive(Clone, Debug, PartialEq)]
pub struct Declaration {
    location: SourceLocation,
    tokens: Vec<Token>,
}

impl Declaration {
    /// Location of the first token
    #[must_use]
    pub const fn location(&self) -> SourceLocation {
        self.location
    }

    /// Tokens of the declaration, including its terminator
    #[must_use]
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Whether the declaration ends in a `{ }` block, like a function
    /// definition or a struct without instance name
    #[must_use]
    pub fn has_body(&self) -> bool {
        self.tokens
            .last()
            .is_some_and(|t| t.is_punct(Punct::RightBrace))
    }

    /// The declared name: the last identifier before the first `(`, `[`,
    /// `=`, `{` or `;`
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.tokens
            .iter()
            .take_while(|t| {
                !matches!(
                    t,
                    Token::Punct(
                        Punct::LeftParen
                            | Punct::LeftBracket
                            | Punct::Equal
                            | Punct::LeftBrace
                            | Punct::Semicolon
                    )
                )
            })
            .filter_map(Token::as_identifier)
            .last()
    }
}

/// A parsed compilation unit
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    declarations: Vec<Declaration>,
}

impl Program {
    /// Create an empty program
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declarations in source order
    #[must_use]
    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    /// Find a declaration by name
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Declaration> {
        self.declarations.iter().find(|d| d.name() == Some(name))
    }

    /// Consume the preprocessor's token stream and append its declarations
    ///
    /// Syntax errors are recorded on the preprocessor as fatal errors;
    /// parsing continues after them so later errors are reported too.
    pub fn parse(&mut self, preprocessor: &mut Preprocessor<'_>) {
        loop {
            let (location, token) = preprocessor.next_token();
            match token {
                Token::Eof => break,
                Token::Punct(Punct::Semicolon) => {}
                token => {
                    if let Some(declaration) = Self::parse_declaration(preprocessor, location, token)
                    {
                        self.declarations.push(declaration);
                    }
                }
            }
        }
        tracing::debug!(declarations = self.declarations.len(), "parsed program");
    }

    fn parse_declaration(
        preprocessor: &mut Preprocessor<'_>,
        location: SourceLocation,
        first: Token,
    ) -> Option<Declaration> {
        let mut tokens = Vec::new();
        let mut open: Vec<(SourceLocation, Punct)> = Vec::new();
        let (mut token_location, mut token) = (location, first);

        loop {
            match &token {
                Token::Eof => {
                    let message = match open.last() {
                        Some((_, punct)) => format!("Unclosed \"{}\"", punct.as_str()),
                        None => "Expected \";\" at end of declaration".to_string(),
                    };
                    let at = open.last().map_or(token_location, |(loc, _)| *loc);
                    preprocessor.error(at, Token::Eof, CompilerError::Syntax(message));
                    return None;
                }
                Token::Punct(p @ (Punct::LeftParen | Punct::LeftBracket | Punct::LeftBrace)) => {
                    open.push((token_location, *p));
                }
                Token::Punct(p @ (Punct::RightParen | Punct::RightBracket | Punct::RightBrace)) => {
                    let expected = match open.pop() {
                        Some((_, opener)) => closer_for(opener),
                        None => None,
                    };
                    if expected != Some(*p) {
                        preprocessor.error(
                            token_location,
                            token.clone(),
                            CompilerError::Syntax(format!("Unexpected \"{}\"", p.as_str())),
                        );
                        Self::recover(preprocessor);
                        return None;
                    }
                    if *p == Punct::RightBrace && open.is_empty() {
                        tokens.push(token);
                        return Some(Declaration { location, tokens });
                    }
                }
                Token::Punct(Punct::Semicolon) if open.is_empty() => {
                    tokens.push(token);
                    return Some(Declaration { location, tokens });
                }
                _ => {}
            }
            tokens.push(token);
            (token_location, token) = preprocessor.next_token();
        }
    }

    /// Skip past the next `;` or `{ }` block at depth zero, or to end of input
    fn recover(preprocessor: &mut Preprocessor<'_>) {
        let mut depth = 0usize;
        loop {
            let (_, token) = preprocessor.next_token();
            match token {
                Token::Eof => return,
                Token::Punct(Punct::Semicolon) if depth == 0 => return,
                Token::Punct(Punct::LeftParen | Punct::LeftBracket | Punct::LeftBrace) => {
                    depth += 1;
                }
                Token::Punct(Punct::RightBrace) if depth == 1 => return,
                Token::Punct(Punct::RightParen | Punct::RightBracket | Punct::RightBrace) => {
                    depth = depth.saturating_sub(1);
                }
                _ => {}
            }
        }
    }
}

const fn closer_for(opener: Punct) -> Option<Punct> {
    match opener {
        Punct::LeftParen => Some(Punct::RightParen),
        Punct::LeftBracket => Some(Punct::RightBracket),
        Punct::LeftBrace => Some(Punct::RightBrace),
        _ => None,
    }
}
