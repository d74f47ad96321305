#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # Shading Language Compiler Front-End
//!
//! This library drives the front end of a small C-like shading language
//! compiler: it owns the table of command-line style defines, resolves
//! `#include` directives relative to the including file, and runs source
//! text through the preprocessor into a parsed [`Program`].
//!
//! ## Features
//!
//! - Defines captured lexically and shared between snapshots
//! - Object-like macro expansion and conditional compilation (`#if`,
//!   `#ifdef`, `#ifndef`, `#elif`, `#else`, `#endif`)
//! - Local includes with cycle detection and a nesting limit
//! - Diagnostics with `line:column` locations, split into fatal errors and
//!   warnings
//! - C FFI for integration with other languages
//!
//! ## Example
//!
//! ```rust
//! use slc::Compiler;
//!
//! let mut compiler = Compiler::new();
//! compiler.add_define("USE_FOG", None).unwrap();
//!
//! let source = br#"
//! #ifdef USE_FOG
//! uniform float fog_density;
//! #endif
//! void main() { }
//! "#;
//!
//! let program = compiler.compile_bytes(source.as_slice()).unwrap();
//! assert!(program.find("fog_density").is_some());
//! ```

mod c_api;
mod code_source;
mod compiler;
mod config;
mod define;
mod diagnostic;
mod error;
mod expr;
mod location;
mod preprocessor;
mod program;
mod token;
mod tokenizer;

pub use code_source::CodeSource;
pub use compiler::Compiler;
pub use config::{
    CompilerConfig, DEFAULT_MAX_INCLUDE_DEPTH, DEFAULT_RECURSION_LIMIT,
};
pub use define::{DefineTable, MacroDefinition};
pub use diagnostic::{Diagnostic, DiagnosticHandler, DiagnosticKind, DiagnosticSink, FirstFatal};
pub use error::{CompilerError, CompilerWarning};
pub use location::SourceLocation;
pub use preprocessor::Preprocessor;
pub use program::{Declaration, Program};
pub use token::{Punct, Token, is_valid_identifier};
pub use tokenizer::Tokenizer;

use std::path::Path;

/// Compile source text with the given configuration and no defines
///
/// Returns `None` if compilation failed; details go to the configured
/// diagnostic handler.
#[must_use]
pub fn compile_str<S: AsRef<str>>(code: S, config: &CompilerConfig) -> Option<Program> {
    let compiler = Compiler::with_config(config.clone());
    compiler.compile_bytes(code.as_ref().as_bytes())
}

/// Compile a file with the given configuration and no defines
///
/// Returns `None` if the file cannot be read or compilation failed.
#[must_use]
pub fn compile_path<P: AsRef<Path>>(path: P, config: &CompilerConfig) -> Option<Program> {
    let compiler = Compiler::with_config(config.clone());
    compiler.compile_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn simple_shader() {
        let src = r#"
#version 450
uniform vec4 tint;
void main() {
    gl_FragColor = tint;
}
"#;
        let program = compile_str(src, &CompilerConfig::default()).unwrap();
        assert_eq!(program.declarations().len(), 2);
        assert!(program.find("main").unwrap().has_body());
    }

    #[test]
    fn defines_drive_conditionals() {
        let src = r#"
#if QUALITY >= 2
float shadow_samples[16];
#else
float shadow_samples[4];
#endif
"#;
        let mut compiler = Compiler::new();
        compiler.add_define("QUALITY", Some("3")).unwrap();
        let high = compiler.compile_bytes(src.as_bytes()).unwrap();
        assert!(high.declarations()[0].tokens().contains(&Token::IntConstant(16)));

        compiler.add_define("QUALITY", Some("1")).unwrap();
        let low = compiler.compile_bytes(src.as_bytes()).unwrap();
        assert!(low.declarations()[0].tokens().contains(&Token::IntConstant(4)));
    }

    #[test]
    fn macro_bodies_are_validated_at_expansion() {
        let mut compiler = Compiler::new();
        compiler.add_define("BROKEN", Some(") (")).unwrap();
        assert!(compiler.compile_bytes(b"float x = 1.0;".as_slice()).is_some());
        assert!(compiler.compile_bytes(b"float x = BROKEN;".as_slice()).is_none());
    }

    #[test]
    fn failed_compile_reports_location() {
        let messages = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&messages);
        let config = CompilerConfig::new().with_diagnostic_handler(Rc::new(move |d: &Diagnostic| {
            sink.borrow_mut().push(d.to_string());
        }));
        assert!(compile_str("float a;\nfloat b = @;\n", &config).is_none());
        assert_eq!(messages.borrow()[0], "  2:10: Unexpected character '@'");
    }

    #[test]
    fn deeply_nested_condition_fails_cleanly() {
        let src = format!(
            "#if {}1{}\nfloat x;\n#endif\n",
            "(".repeat(2000),
            ")".repeat(2000)
        );
        let messages = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&messages);
        let config = CompilerConfig::new().with_diagnostic_handler(Rc::new(move |d: &Diagnostic| {
            sink.borrow_mut().push(d.to_string());
        }));
        assert!(compile_str(&src, &config).is_none());
        assert_eq!(messages.borrow()[0], "  1: 1: #if expression nested too deeply");
    }

    #[test]
    fn include_chain_from_disk() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::create_dir(dir.path().join("inc")).expect("create inc");
        std::fs::write(
            dir.path().join("inc").join("light.glsl"),
            "#include \"math.glsl\"\nstruct Light { vec3 dir; };\n",
        )
        .expect("write light");
        std::fs::write(
            dir.path().join("inc").join("math.glsl"),
            "#define SATURATE(x) clamp(x, 0.0, 1.0)\n",
        )
        .expect("write math");
        std::fs::write(
            dir.path().join("main.glsl"),
            "#include \"inc/light.glsl\"\nvoid main() { }\n",
        )
        .expect("write main");

        // function-like macros in the nested include make the whole compile fail
        assert!(compile_path(dir.path().join("main.glsl"), &CompilerConfig::default()).is_none());

        std::fs::write(
            dir.path().join("inc").join("math.glsl"),
            "#define EPSILON 1e-5\n",
        )
        .expect("rewrite math");
        let program = compile_path(dir.path().join("main.glsl"), &CompilerConfig::default())
            .expect("program with nested includes");
        assert!(program.find("Light").is_some());
        assert!(program.find("main").is_some());
    }
}
