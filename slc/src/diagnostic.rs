use std::fmt;
use std::rc::Rc;

use crate::error::{CompilerError, CompilerWarning};
use crate::location::SourceLocation;
use crate::token::Token;

/// The error domain a diagnostic belongs to
#[derive(Debug)]
pub enum DiagnosticKind {
    /// Fatal to the current operation
    Error(CompilerError),
    /// Recoverable
    Warning(CompilerWarning),
}

/// A message produced while reading or compiling a source
#[derive(Debug)]
pub struct Diagnostic {
    /// Display name of the source the message refers to
    pub source_name: String,
    /// Start of the offending token
    pub location: SourceLocation,
    /// The offending token
    pub token: Token,
    /// Error or warning payload
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    /// Create a fatal diagnostic
    #[must_use]
    pub fn error(
        source_name: impl Into<String>,
        location: SourceLocation,
        token: Token,
        error: CompilerError,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            location,
            token,
            kind: DiagnosticKind::Error(error),
        }
    }

    /// Create a recoverable diagnostic
    #[must_use]
    pub fn warning(
        source_name: impl Into<String>,
        location: SourceLocation,
        token: Token,
        warning: CompilerWarning,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            location,
            token,
            kind: DiagnosticKind::Warning(warning),
        }
    }

    /// Whether this diagnostic aborts the current operation
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self.kind, DiagnosticKind::Error(_))
    }

    /// Turn a fatal diagnostic into a located compiler error
    ///
    /// Warnings are returned unchanged in the `Err` variant.
    pub fn into_error(self) -> Result<CompilerError, Self> {
        match self.kind {
            DiagnosticKind::Error(error) => Ok(error.at(self.location)),
            DiagnosticKind::Warning(_) => Err(self),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DiagnosticKind::Error(e) => write!(f, "{}: {e}", self.location),
            DiagnosticKind::Warning(w) => write!(f, "{}: {w}", self.location),
        }
    }
}

/// Receiver for diagnostics produced by the tokenizer and preprocessor
pub trait DiagnosticSink {
    /// Accept one diagnostic
    fn report(&mut self, diagnostic: Diagnostic);
}

impl<F: FnMut(Diagnostic)> DiagnosticSink for F {
    fn report(&mut self, diagnostic: Diagnostic) {
        self(diagnostic);
    }
}

/// Callback invoked for every diagnostic a compile produces
pub type DiagnosticHandler = Rc<dyn Fn(&Diagnostic)>;

/// Sink that keeps the first fatal diagnostic and drops everything else
#[derive(Debug, Default)]
pub struct FirstFatal {
    first: Option<Diagnostic>,
}

impl FirstFatal {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a fatal diagnostic has been seen
    #[must_use]
    pub const fn has_fatal(&self) -> bool {
        self.first.is_some()
    }

    /// Consume the sink and return the first fatal error, location-tagged
    #[must_use]
    pub fn into_error(self) -> Option<CompilerError> {
        self.first.and_then(|d| d.into_error().ok())
    }
}

impl DiagnosticSink for FirstFatal {
    fn report(&mut self, diagnostic: Diagnostic) {
        if !diagnostic.is_fatal() || self.first.is_some() {
            return;
        }
        self.first = Some(diagnostic);
    }
}
