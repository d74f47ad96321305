use std::fmt;

use crate::diagnostic::DiagnosticHandler;

/// Default maximum depth for nested macro expansion
pub const DEFAULT_RECURSION_LIMIT: usize = 128;

/// Default maximum depth for nested includes
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 32;

/// Configuration for the compiler driver
#[derive(Clone)]
pub struct CompilerConfig {
    /// Maximum recursion depth for macro expansion
    pub recursion_limit: usize,
    /// Maximum number of nested includes below the main source
    pub max_include_depth: usize,
    /// Optional callback receiving every diagnostic of a compile
    pub diagnostic_handler: Option<DiagnosticHandler>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CompilerConfig {
    /// Create a configuration with default limits and no handler
    #[must_use]
    pub const fn new() -> Self {
        Self {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
            diagnostic_handler: None,
        }
    }

    /// Override the macro expansion limit
    #[must_use]
    pub const fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Override the include nesting limit
    #[must_use]
    pub const fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }

    /// Set a handler for compile diagnostics
    #[must_use]
    pub fn with_diagnostic_handler(mut self, handler: DiagnosticHandler) -> Self {
        self.diagnostic_handler = Some(handler);
        self
    }
}

impl fmt::Debug for CompilerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilerConfig")
            .field("recursion_limit", &self.recursion_limit)
            .field("max_include_depth", &self.max_include_depth)
            .field("diagnostic_handler", &self.diagnostic_handler.is_some())
            .finish()
    }
}
