use std::path::PathBuf;

use thiserror::Error;

use crate::location::SourceLocation;

/// Errors raised by the compiler driver and its collaborators
///
/// Every variant is fatal to the operation that produced it.
#[derive(Debug, Error)]
pub enum CompilerError {
    /// Generic failure
    #[error("{0}")]
    Failed(String),
    /// A define name that is not a valid identifier
    #[error("Define name \"{0}\" is not a valid identifier")]
    InvalidIdentifier(String),
    /// A local include that could not be loaded
    #[error("Could not load include \"{name}\": {source}")]
    IncludeNotFound {
        /// Name as written in the include directive
        name: String,
        /// Underlying load failure
        source: std::io::Error,
    },
    /// A local include requested from a source that has no directory
    #[error("Cannot resolve local include \"{name}\": including source is not a file")]
    NoParentDirectory {
        /// Name as written in the include directive
        name: String,
    },
    /// A search-path include; there is no search path to look in
    #[error("Could not resolve \"{name}\" in search path.")]
    SearchPathUnsupported {
        /// Name as written in the include directive
        name: String,
    },
    /// A file that includes itself, directly or indirectly
    #[error("Include cycle detected for \"{}\"", .0.display())]
    IncludeCycle(PathBuf),
    /// Includes nested deeper than the configured limit
    #[error("Include depth limit of {limit} exceeded while including \"{name}\"")]
    IncludeDepthExceeded {
        /// Name as written in the include directive
        name: String,
        /// Configured limit
        limit: usize,
    },
    /// Macro expansion nested deeper than the configured limit
    #[error("Macro \"{name}\" exceeds the expansion limit of {limit}")]
    RecursionLimitExceeded {
        /// Macro being expanded when the limit was hit
        name: String,
        /// Configured limit
        limit: usize,
    },
    /// Lexical error reported by the tokenizer
    #[error("{0}")]
    Lexical(String),
    /// Malformed or unsupported preprocessor directive
    #[error("{0}")]
    Preprocessor(String),
    /// Syntax error reported while building a program
    #[error("{0}")]
    Syntax(String),
    /// An error tagged with the location where it occurred
    #[error("{location}: {error}")]
    Located {
        /// Where the error occurred
        location: SourceLocation,
        /// The error itself
        error: Box<CompilerError>,
    },
    /// I/O error while loading a source
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompilerError {
    /// Tag this error with a source location
    #[must_use]
    pub fn at(self, location: SourceLocation) -> Self {
        CompilerError::Located {
            location,
            error: Box::new(self),
        }
    }

    /// Strip any location tags and return the underlying error
    #[must_use]
    pub fn root(&self) -> &CompilerError {
        match self {
            CompilerError::Located { error, .. } => error.root(),
            other => other,
        }
    }
}

/// Recoverable diagnostics; never abort the operation that produced them
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompilerWarning {
    /// Generic warning
    #[error("{0}")]
    Failed(String),
    /// Numeric constant that does not fit its type
    #[error("Overflow in {0} constant")]
    ConstantOverflow(&'static str),
    /// Message from a `#warning` directive
    #[error("#warning {0}")]
    Directive(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn located_error_uses_location_prefix() {
        let err = CompilerError::Lexical("Unexpected character '$'".into())
            .at(SourceLocation::new(0, 4));
        assert_eq!(err.to_string(), "  1: 4: Unexpected character '$'");
        assert!(matches!(err.root(), CompilerError::Lexical(_)));
    }

    #[test]
    fn search_path_message_names_the_include() {
        let err = CompilerError::SearchPathUnsupported {
            name: "common.glsl".into(),
        };
        assert_eq!(
            err.to_string(),
            "Could not resolve \"common.glsl\" in search path."
        );
    }

    #[test]
    fn invalid_identifier_message() {
        let err = CompilerError::InvalidIdentifier("1bad".into());
        assert_eq!(
            err.to_string(),
            "Define name \"1bad\" is not a valid identifier"
        );
    }
}
