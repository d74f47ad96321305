use std::collections::HashMap;
use std::rc::Rc;

use crate::location::SourceLocation;
use crate::token::Token;

/// Table of macro definitions keyed by name
///
/// Values are shared: cloning the table shares every definition with the
/// original, and edits only ever replace or remove entries.
pub type DefineTable = HashMap<String, Rc<MacroDefinition>>;

/// An object-like macro: a name and its unexpanded token body
#[derive(Clone, Debug, PartialEq)]
pub struct MacroDefinition {
    name: String,
    tokens: Vec<(SourceLocation, Token)>,
}

impl MacroDefinition {
    /// Create a definition with an empty body
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tokens: Vec::new(),
        }
    }

    pub(crate) fn add_token(&mut self, location: SourceLocation, token: Token) {
        self.tokens.push((location, token));
    }

    /// Name of the macro
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Body tokens with the location each one started at
    #[must_use]
    pub fn tokens(&self) -> &[(SourceLocation, Token)] {
        &self.tokens
    }

    /// Number of tokens in the body
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the body is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
