use std::path::Path;
use std::rc::Rc;

use crate::code_source::CodeSource;
use crate::config::CompilerConfig;
use crate::define::{DefineTable, MacroDefinition};
use crate::diagnostic::FirstFatal;
use crate::error::CompilerError;
use crate::preprocessor::Preprocessor;
use crate::program::Program;
use crate::token::is_valid_identifier;
use crate::tokenizer::Tokenizer;

/// Display name of the source used to tokenize define bodies
const DEFINE_SOURCE_NAME: &str = "<define>";

/// Display name of sources compiled from memory
const PROGRAM_SOURCE_NAME: &str = "<program>";

/// Front-end driver: owns the define table and runs compiles
///
/// Every compile preprocesses against a snapshot of the defines, so
/// definitions made inside a source never reach the compiler's own table.
#[derive(Debug, Default)]
pub struct Compiler {
    defines: DefineTable,
    config: CompilerConfig,
}

impl Compiler {
    /// Create a compiler with no defines and default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a compiler with the given configuration
    #[must_use]
    pub fn with_config(config: CompilerConfig) -> Self {
        Self {
            defines: DefineTable::new(),
            config,
        }
    }

    /// The active configuration
    #[must_use]
    pub const fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Replace the configuration
    pub fn set_config(&mut self, config: CompilerConfig) {
        self.config = config;
    }

    /// Define `name` as the token sequence of `definition`, or `1` if none
    ///
    /// The body is captured lexically; it is not checked for meaning until it
    /// is expanded. A previous definition of the same name is replaced.
    ///
    /// # Errors
    /// Returns `CompilerError::InvalidIdentifier` if `name` is not an
    /// identifier, or the first fatal tokenizer error prefixed with its
    /// location. The table is left unchanged on error.
    pub fn add_define(&mut self, name: &str, definition: Option<&str>) -> Result<(), CompilerError> {
        if !is_valid_identifier(name) {
            return Err(CompilerError::InvalidIdentifier(name.to_string()));
        }
        let definition = definition.unwrap_or("1");

        let source = CodeSource::for_bytes(DEFINE_SOURCE_NAME, definition.as_bytes());
        let mut tokenizer = Tokenizer::new(&source)?;
        let mut sink = FirstFatal::new();
        let mut define = MacroDefinition::new(name);

        while !sink.has_fatal() {
            let location = tokenizer.location();
            let token = tokenizer.read_token(&mut sink);
            if token.is_skipped() {
                continue;
            }
            if token.is_eof() {
                break;
            }
            define.add_token(location, token);
        }

        if let Some(error) = sink.into_error() {
            tracing::debug!(define = name, %error, "rejected define");
            return Err(error);
        }

        tracing::debug!(define = name, tokens = define.len(), "added define");
        self.defines.insert(name.to_string(), Rc::new(define));
        Ok(())
    }

    /// Remove the definition of `name`; does nothing if it is not defined
    pub fn remove_define(&mut self, name: &str) {
        if self.defines.remove(name).is_some() {
            tracing::debug!(define = name, "removed define");
        }
    }

    /// Snapshot of the define table sharing its definitions
    #[must_use]
    pub fn copy_defines(&self) -> DefineTable {
        self.defines.clone()
    }

    /// Read access to the define table
    #[must_use]
    pub const fn defines(&self) -> &DefineTable {
        &self.defines
    }

    /// Check if a macro is defined
    #[must_use]
    pub fn is_defined(&self, name: &str) -> bool {
        self.defines.contains_key(name)
    }

    /// Look up a definition by name
    #[must_use]
    pub fn get_define(&self, name: &str) -> Option<&Rc<MacroDefinition>> {
        self.defines.get(name)
    }

    /// Find the source an include directive in `base` refers to
    ///
    /// Local includes are resolved against the directory of `base` and
    /// loaded before returning. Search-path includes are not supported.
    ///
    /// # Errors
    /// - `CompilerError::NoParentDirectory` for a local include from a source
    ///   that is not file-backed
    /// - `CompilerError::IncludeNotFound` if the resolved file cannot be read
    /// - `CompilerError::SearchPathUnsupported` for every non-local include
    pub fn resolve_include(
        &self,
        base: &CodeSource,
        local: bool,
        name: &str,
    ) -> Result<CodeSource, CompilerError> {
        if !local {
            return Err(CompilerError::SearchPathUnsupported {
                name: name.to_string(),
            });
        }

        let Some(path) = base.resolve_relative(name) else {
            return Err(CompilerError::NoParentDirectory {
                name: name.to_string(),
            });
        };

        let source = CodeSource::for_file(path);
        match source.load() {
            Ok(_) => {
                tracing::debug!(include = name, from = base.name(), "resolved include");
                Ok(source)
            }
            Err(CompilerError::Io(err)) => Err(CompilerError::IncludeNotFound {
                name: name.to_string(),
                source: err,
            }),
            Err(e) => Err(e),
        }
    }

    fn compile(&self, source: CodeSource) -> Option<Program> {
        let name = source.name().to_string();
        let mut program = Program::new();
        let mut preprocessor = Preprocessor::new(self, source);

        program.parse(&mut preprocessor);

        if preprocessor.has_fatal_error() {
            tracing::debug!(source = %name, "compilation failed");
            return None;
        }
        tracing::debug!(
            source = %name,
            declarations = program.declarations().len(),
            "compilation succeeded"
        );
        Some(program)
    }

    /// Compile the file at `path`
    ///
    /// Returns `None` if any fatal error occurs, including failure to read
    /// the file. Diagnostics go to the configured diagnostic handler.
    #[must_use]
    pub fn compile_file(&self, path: impl AsRef<Path>) -> Option<Program> {
        self.compile(CodeSource::for_file(path.as_ref()))
    }

    /// Compile source text held in memory
    ///
    /// Returns `None` if any fatal error occurs. Local includes cannot be
    /// resolved from in-memory sources.
    #[must_use]
    pub fn compile_bytes(&self, bytes: impl Into<Rc<[u8]>>) -> Option<Program> {
        self.compile(CodeSource::for_bytes(PROGRAM_SOURCE_NAME, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::{Diagnostic, DiagnosticKind};
    use crate::location::SourceLocation;
    use crate::token::{Punct, Token};
    use std::cell::RefCell;

    fn body(compiler: &Compiler, name: &str) -> Vec<Token> {
        compiler.copy_defines()[name]
            .tokens()
            .iter()
            .map(|(_, t)| t.clone())
            .collect()
    }

    #[test]
    fn add_define_captures_tokens_without_whitespace() {
        let mut compiler = Compiler::new();
        compiler
            .add_define("SCALE", Some("  2.0 /* half */ * k "))
            .unwrap();
        assert_eq!(
            body(&compiler, "SCALE"),
            vec![
                Token::FloatConstant(2.0),
                Token::Punct(Punct::Star),
                Token::Identifier("k".into())
            ]
        );
        let define = compiler.get_define("SCALE").unwrap();
        assert_eq!(define.name(), "SCALE");
        assert_eq!(define.tokens()[0].0, SourceLocation::new(0, 2));
        assert_eq!(define.tokens()[2].0, SourceLocation::new(0, 19));
    }

    #[test]
    fn add_define_is_purely_lexical() {
        let mut compiler = Compiler::new();
        compiler.add_define("ODD", Some(") + ( ;")).unwrap();
        assert_eq!(body(&compiler, "ODD").len(), 4);
    }

    #[test]
    fn missing_definition_means_one() {
        let mut compiler = Compiler::new();
        compiler.add_define("FOO", None).unwrap();
        compiler.add_define("BAR", Some("1")).unwrap();
        assert_eq!(body(&compiler, "FOO"), vec![Token::IntConstant(1)]);
        assert_eq!(body(&compiler, "FOO"), body(&compiler, "BAR"));
    }

    #[test]
    fn empty_definition_has_empty_body() {
        let mut compiler = Compiler::new();
        compiler.add_define("EMPTY", Some("")).unwrap();
        assert!(compiler.get_define("EMPTY").unwrap().is_empty());
    }

    #[test]
    fn invalid_identifier_leaves_table_unchanged() {
        let mut compiler = Compiler::new();
        compiler.add_define("OK", None).unwrap();
        for name in ["1bad", "", "a-b", "with space"] {
            let err = compiler.add_define(name, Some("2")).unwrap_err();
            assert!(matches!(err, CompilerError::InvalidIdentifier(ref n) if n == name));
        }
        assert_eq!(compiler.defines().len(), 1);
        assert!(compiler.is_defined("OK"));
    }

    #[test]
    fn tokenizer_error_is_located_and_first_wins() {
        let mut compiler = Compiler::new();
        let err = compiler.add_define("BAD", Some("a $ b @")).unwrap_err();
        assert_eq!(err.to_string(), "  1: 2: Unexpected character '$'");
        assert!(!compiler.is_defined("BAD"));
    }

    #[test]
    fn tokenizer_error_keeps_previous_definition() {
        let mut compiler = Compiler::new();
        compiler.add_define("X", Some("1")).unwrap();
        let before = Rc::clone(compiler.get_define("X").unwrap());
        assert!(compiler.add_define("X", Some("0x")).is_err());
        assert!(Rc::ptr_eq(&before, compiler.get_define("X").unwrap()));
    }

    #[test]
    fn warnings_do_not_fail_a_define() {
        let mut compiler = Compiler::new();
        compiler.add_define("BIG", Some("99999999999")).unwrap();
        assert_eq!(body(&compiler, "BIG").len(), 1);
    }

    #[test]
    fn redefinition_replaces_without_touching_snapshots() {
        let mut compiler = Compiler::new();
        compiler.add_define("A", Some("1")).unwrap();
        let snapshot = compiler.copy_defines();
        compiler.add_define("A", Some("2")).unwrap();

        assert_eq!(snapshot["A"].tokens()[0].1, Token::IntConstant(1));
        assert_eq!(body(&compiler, "A"), vec![Token::IntConstant(2)]);
        assert!(!Rc::ptr_eq(&snapshot["A"], &compiler.defines()["A"]));
    }

    #[test]
    fn snapshots_are_independent_of_removal() {
        let mut compiler = Compiler::new();
        compiler.add_define("A", None).unwrap();
        let mut snapshot = compiler.copy_defines();
        compiler.remove_define("A");
        assert!(snapshot.contains_key("A"));

        snapshot.remove("A");
        compiler.add_define("A", None).unwrap();
        assert!(!snapshot.contains_key("A"));
        assert!(compiler.is_defined("A"));
    }

    #[test]
    fn remove_absent_define_is_a_noop() {
        let mut compiler = Compiler::new();
        compiler.add_define("KEEP", Some("3")).unwrap();
        let before = compiler.copy_defines();
        compiler.remove_define("MISSING");
        let after = compiler.copy_defines();
        assert_eq!(before.len(), after.len());
        assert!(Rc::ptr_eq(&before["KEEP"], &after["KEEP"]));
    }

    #[test]
    fn copy_defines_is_idempotent() {
        let mut compiler = Compiler::new();
        compiler.add_define("A", None).unwrap();
        compiler.add_define("B", Some("x y")).unwrap();
        let first = compiler.copy_defines();
        let second = compiler.copy_defines();
        assert_eq!(first.len(), second.len());
        for (name, define) in &first {
            assert!(Rc::ptr_eq(define, &second[name]));
        }
    }

    #[test]
    fn search_path_includes_always_fail() {
        let compiler = Compiler::new();
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::write(dir.path().join("x"), "float x;").expect("write x");
        let bases = [
            CodeSource::for_bytes("<program>", b"".as_slice()),
            CodeSource::for_file(dir.path().join("main.glsl")),
        ];
        for base in &bases {
            for name in ["x", "missing.glsl"] {
                let err = compiler.resolve_include(base, false, name).unwrap_err();
                assert_eq!(
                    err.to_string(),
                    format!("Could not resolve \"{name}\" in search path.")
                );
            }
        }
    }

    #[test]
    fn local_include_resolves_against_base_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::create_dir(dir.path().join("lib")).expect("create lib");
        std::fs::write(dir.path().join("lib").join("common.glsl"), "float common;")
            .expect("write common");
        let base = CodeSource::for_file(dir.path().join("main.glsl"));

        let compiler = Compiler::new();
        let source = compiler
            .resolve_include(&base, true, "lib/common.glsl")
            .unwrap();
        assert_eq!(source.name(), "common.glsl");
        assert!(source.is_loaded());
        assert_eq!(&*source.load().unwrap(), b"float common;");
    }

    #[test]
    fn missing_local_include_is_not_found() {
        let dir = tempfile::tempdir().expect("temp dir");
        let base = CodeSource::for_file(dir.path().join("main.glsl"));
        let err = Compiler::new()
            .resolve_include(&base, true, "nope.glsl")
            .unwrap_err();
        assert!(matches!(err, CompilerError::IncludeNotFound { ref name, .. } if name == "nope.glsl"));
    }

    #[test]
    fn local_include_from_memory_is_not_applicable() {
        let base = CodeSource::for_bytes("<program>", b"".as_slice());
        let err = Compiler::new()
            .resolve_include(&base, true, "a.glsl")
            .unwrap_err();
        assert!(matches!(err, CompilerError::NoParentDirectory { .. }));
        assert!(!matches!(err, CompilerError::IncludeNotFound { .. }));
    }

    #[test]
    fn compile_bytes_success_and_failure() {
        let compiler = Compiler::new();
        let program = compiler
            .compile_bytes(b"uniform float t;\nvoid main() { }\n".as_slice())
            .expect("valid program");
        assert_eq!(program.declarations().len(), 2);

        assert!(compiler.compile_bytes(b"float $x;".as_slice()).is_none());
        assert!(compiler.compile_bytes(b"void main() {".as_slice()).is_none());
        assert!(compiler.compile_bytes(b"#error nope\n".as_slice()).is_none());
    }

    #[test]
    fn compile_uses_compiler_defines() {
        let mut compiler = Compiler::new();
        compiler.add_define("ENABLE_FOG", None).unwrap();
        let src = b"#ifdef ENABLE_FOG\nfloat fog;\n#endif\n".as_slice();
        let program = compiler.compile_bytes(src).unwrap();
        assert!(program.find("fog").is_some());

        compiler.remove_define("ENABLE_FOG");
        let program = compiler.compile_bytes(src).unwrap();
        assert!(program.declarations().is_empty());
    }

    #[test]
    fn compile_file_matches_compile_bytes() {
        let dir = tempfile::tempdir().expect("temp dir");
        let text = "const int N = 4;\nfloat data[N];\nvoid main() { data[0] = 1.0; }\n";
        let path = dir.path().join("shader.glsl");
        std::fs::write(&path, text).expect("write shader");

        let compiler = Compiler::new();
        let from_file = compiler.compile_file(&path).unwrap();
        let from_bytes = compiler.compile_bytes(text.as_bytes()).unwrap();
        let tokens = |p: &Program| -> Vec<Vec<Token>> {
            p.declarations().iter().map(|d| d.tokens().to_vec()).collect()
        };
        assert_eq!(tokens(&from_file), tokens(&from_bytes));
    }

    #[test]
    fn compile_file_resolves_local_includes() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::write(dir.path().join("common.glsl"), "#define PI 3.14159\nfloat tau = 2.0 * PI;\n")
            .expect("write common");
        std::fs::write(dir.path().join("main.glsl"), "#include \"common.glsl\"\nvoid main() { }\n")
            .expect("write main");

        let program = Compiler::new()
            .compile_file(dir.path().join("main.glsl"))
            .expect("program with include");
        assert!(program.find("tau").is_some());
        assert!(program.find("main").is_some());
    }

    #[test]
    fn compile_missing_file_fails() {
        let dir = tempfile::tempdir().expect("temp dir");
        assert!(Compiler::new().compile_file(dir.path().join("none.glsl")).is_none());
    }

    #[test]
    fn diagnostics_reach_the_handler() {
        let seen: Rc<RefCell<Vec<(bool, String)>>> = Rc::default();
        let sink = Rc::clone(&seen);
        let config = CompilerConfig::new().with_diagnostic_handler(Rc::new(move |d: &Diagnostic| {
            let fatal = matches!(d.kind, DiagnosticKind::Error(_));
            sink.borrow_mut().push((fatal, format!("{}: {d}", d.source_name)));
        }));
        let compiler = Compiler::with_config(config);

        assert!(compiler.compile_bytes(b"#warning soon\nfloat x".as_slice()).is_none());
        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (false, "<program>:   1: 0: #warning soon".to_string()));
        assert!(seen[1].0);
        assert!(seen[1].1.starts_with("<program>:"));
    }
}
