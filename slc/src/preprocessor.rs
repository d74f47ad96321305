use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::rc::Rc;

use crate::code_source::CodeSource;
use crate::compiler::Compiler;
use crate::define::{DefineTable, MacroDefinition};
use crate::diagnostic::{Diagnostic, DiagnosticHandler, DiagnosticSink};
use crate::error::{CompilerError, CompilerWarning};
use crate::expr;
use crate::location::SourceLocation;
use crate::token::{Punct, Token};
use crate::tokenizer::Tokenizer;

/// State of one `#if`/`#ifdef`/`#ifndef` block
#[derive(Clone, Copy, Debug)]
struct Conditional {
    /// Whether the enclosing code is emitted at all
    parent_active: bool,
    /// Whether the current branch is emitted
    active: bool,
    /// Whether any branch of this block has been taken
    taken: bool,
    /// Whether `#else` has been seen
    seen_else: bool,
}

impl Conditional {
    fn new(parent_active: bool, condition: bool) -> Self {
        let active = parent_active && condition;
        Self {
            parent_active,
            active,
            taken: active,
            seen_else: false,
        }
    }
}

/// One source on the include stack
struct IncludeFrame {
    source: CodeSource,
    path: Option<PathBuf>,
    tokenizer: Tokenizer,
    conditionals: Vec<Conditional>,
    at_line_start: bool,
}

impl IncludeFrame {
    fn new(source: CodeSource, tokenizer: Tokenizer) -> Self {
        let path = source
            .file()
            .map(|p| std::fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf()));
        Self {
            source,
            path,
            tokenizer,
            conditionals: Vec::new(),
            at_line_start: true,
        }
    }

    fn is_active(&self) -> bool {
        self.conditionals.last().is_none_or(|c| c.active)
    }
}

enum Pending {
    Token(SourceLocation, Token),
    EndExpansion,
}

/// Records diagnostics, remembers whether any was fatal, and forwards them
struct DiagnosticLog {
    entries: Vec<Diagnostic>,
    fatal: bool,
    handler: Option<DiagnosticHandler>,
}

impl DiagnosticSink for DiagnosticLog {
    fn report(&mut self, diagnostic: Diagnostic) {
        if diagnostic.is_fatal() {
            self.fatal = true;
        }
        tracing::debug!(source = %diagnostic.source_name, "{diagnostic}");
        if let Some(handler) = &self.handler {
            handler(&diagnostic);
        }
        self.entries.push(diagnostic);
    }
}

/// Expands macros, conditionals and includes into a token stream
///
/// Bound to a [`Compiler`] for its defines, limits and include resolution.
/// Tokens are pulled with [`Preprocessor::next_token`]; the stream never
/// contains skipped tokens or newlines and ends with [`Token::Eof`].
pub struct Preprocessor<'c> {
    compiler: &'c Compiler,
    defines: DefineTable,
    frames: Vec<IncludeFrame>,
    main_name: String,
    pending: VecDeque<Pending>,
    expanding: Vec<String>,
    lookahead: Option<(SourceLocation, Token)>,
    finished: bool,
    diagnostics: DiagnosticLog,
}

impl<'c> Preprocessor<'c> {
    /// Create a preprocessor reading `source` with the compiler's defines
    ///
    /// A source that cannot be loaded is recorded as a fatal error and
    /// produces an empty stream.
    #[must_use]
    pub fn new(compiler: &'c Compiler, source: CodeSource) -> Self {
        let mut pp = Self {
            compiler,
            defines: compiler.copy_defines(),
            frames: Vec::new(),
            main_name: source.name().to_string(),
            pending: VecDeque::new(),
            expanding: Vec::new(),
            lookahead: None,
            finished: false,
            diagnostics: DiagnosticLog {
                entries: Vec::new(),
                fatal: false,
                handler: compiler.config().diagnostic_handler.clone(),
            },
        };
        match Tokenizer::new(&source) {
            Ok(tokenizer) => pp.frames.push(IncludeFrame::new(source, tokenizer)),
            Err(e) => pp.error(SourceLocation::default(), Token::Eof, e),
        }
        pp
    }

    /// Whether a fatal error has been recorded
    #[must_use]
    pub const fn has_fatal_error(&self) -> bool {
        self.diagnostics.fatal
    }

    /// All diagnostics recorded so far
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics.entries
    }

    /// Macro table as modified by `#define`/`#undef` so far
    #[must_use]
    pub fn defines(&self) -> &DefineTable {
        &self.defines
    }

    fn current_name(&self) -> &str {
        self.frames
            .last()
            .map_or(self.main_name.as_str(), |f| f.source.name())
    }

    /// Record a fatal error against the current source
    pub fn error(&mut self, location: SourceLocation, token: Token, error: CompilerError) {
        let diagnostic = Diagnostic::error(self.current_name(), location, token, error);
        self.diagnostics.report(diagnostic);
    }

    /// Record a warning against the current source
    pub fn warn(&mut self, location: SourceLocation, token: Token, warning: CompilerWarning) {
        let diagnostic = Diagnostic::warning(self.current_name(), location, token, warning);
        self.diagnostics.report(diagnostic);
    }

    /// Look at the next token without consuming it
    pub fn peek_token(&mut self) -> &(SourceLocation, Token) {
        let next = match self.lookahead.take() {
            Some(next) => next,
            None => self.produce(),
        };
        self.lookahead.insert(next)
    }

    /// Consume and return the next token
    pub fn next_token(&mut self) -> (SourceLocation, Token) {
        match self.lookahead.take() {
            Some(next) => next,
            None => self.produce(),
        }
    }

    /// Read the next significant token of the innermost source
    fn read_frame_token(&mut self) -> (SourceLocation, Token) {
        let Some(frame) = self.frames.last_mut() else {
            return (SourceLocation::default(), Token::Eof);
        };
        loop {
            let location = frame.tokenizer.location();
            let token = frame.tokenizer.read_token(&mut self.diagnostics);
            if !token.is_skipped() {
                return (location, token);
            }
        }
    }

    fn produce(&mut self) -> (SourceLocation, Token) {
        loop {
            if let Some(pending) = self.pending.pop_front() {
                match pending {
                    Pending::Token(_, Token::Newline) => {}
                    Pending::Token(location, token) => {
                        if !self.try_expand(location, &token) {
                            return (location, token);
                        }
                    }
                    Pending::EndExpansion => {
                        self.expanding.pop();
                    }
                }
                continue;
            }

            let (location, token) = self.read_frame_token();
            match token {
                Token::Eof => {
                    if self.end_of_source(location) {
                        continue;
                    }
                    return (location, Token::Eof);
                }
                Token::Newline => {
                    if let Some(frame) = self.frames.last_mut() {
                        frame.at_line_start = true;
                    }
                }
                Token::Punct(Punct::Hash) if self.at_line_start() => {
                    self.set_line_start(false);
                    self.handle_directive(location);
                }
                token => {
                    self.set_line_start(false);
                    if self.is_active() && !self.try_expand(location, &token) {
                        return (location, token);
                    }
                }
            }
        }
    }

    fn at_line_start(&self) -> bool {
        self.frames.last().is_some_and(|f| f.at_line_start)
    }

    fn set_line_start(&mut self, value: bool) {
        if let Some(frame) = self.frames.last_mut() {
            frame.at_line_start = value;
        }
    }

    fn is_active(&self) -> bool {
        self.frames.last().is_none_or(IncludeFrame::is_active)
    }

    /// Handle end of the innermost source; returns true if reading continues
    /// in an including source
    fn end_of_source(&mut self, location: SourceLocation) -> bool {
        if self.finished {
            return false;
        }
        if self
            .frames
            .last()
            .is_some_and(|f| !f.conditionals.is_empty())
        {
            self.error(
                location,
                Token::Eof,
                CompilerError::Preprocessor("Unterminated #if at end of file".into()),
            );
        }
        if self.frames.len() > 1 {
            if let Some(frame) = self.frames.pop() {
                tracing::debug!(source = frame.source.name(), "leaving include");
            }
            true
        } else {
            self.finished = true;
            false
        }
    }

    /// Expand `token` if it names an enabled macro; returns true if the
    /// token was consumed
    fn try_expand(&mut self, location: SourceLocation, token: &Token) -> bool {
        let Some(name) = token.as_identifier() else {
            return false;
        };
        if self.expanding.iter().any(|n| n == name) {
            return false;
        }
        let Some(define) = self.defines.get(name).map(Rc::clone) else {
            return false;
        };

        let limit = self.compiler.config().recursion_limit;
        if self.expanding.len() >= limit {
            self.error(
                location,
                token.clone(),
                CompilerError::RecursionLimitExceeded {
                    name: name.to_string(),
                    limit,
                },
            );
            return true;
        }

        tracing::trace!(define = name, "expanding macro");
        self.expanding.push(name.to_string());
        self.pending.push_front(Pending::EndExpansion);
        for (_, body_token) in define.tokens().iter().rev() {
            self.pending
                .push_front(Pending::Token(location, body_token.clone()));
        }
        true
    }

    /// Read the remaining tokens of the current directive line
    fn read_directive_line(&mut self) -> Vec<(SourceLocation, Token)> {
        let mut line = Vec::new();
        loop {
            let (location, token) = self.read_frame_token();
            match token {
                Token::Newline | Token::Eof => {
                    self.set_line_start(true);
                    return line;
                }
                token => line.push((location, token)),
            }
        }
    }

    fn handle_directive(&mut self, hash_location: SourceLocation) {
        let mut line = self.read_directive_line().into_iter();
        let Some((location, token)) = line.next() else {
            return;
        };
        let name = match token {
            Token::Identifier(name) => name,
            token => {
                if self.is_active() {
                    self.error(
                        location,
                        token,
                        CompilerError::Preprocessor("Invalid preprocessor directive".into()),
                    );
                }
                return;
            }
        };
        let args: Vec<_> = line.collect();
        tracing::trace!(directive = %name, "preprocessor directive");

        match name.as_str() {
            "ifdef" | "ifndef" => self.handle_ifdef(location, &name, &args),
            "if" => {
                let condition = self.is_active() && self.evaluate_condition(location, &args);
                self.push_conditional(condition);
            }
            "elif" => self.handle_elif(location, &args),
            "else" => self.handle_else(location),
            "endif" => self.handle_endif(location),
            _ if !self.is_active() => {}
            "define" => self.handle_define(location, args),
            "undef" => self.handle_undef(location, &args),
            "include" => self.handle_include(location, &args),
            "error" => {
                let message = join_tokens(&args);
                self.error(
                    hash_location,
                    Token::Identifier(name),
                    CompilerError::Preprocessor(format!("#error {message}")),
                );
            }
            "warning" => {
                let message = join_tokens(&args);
                self.warn(
                    hash_location,
                    Token::Identifier(name),
                    CompilerWarning::Directive(message),
                );
            }
            "version" | "extension" | "pragma" | "line" => {}
            _ => {
                let message = format!("Unknown preprocessor directive #{name}");
                self.error(
                    location,
                    Token::Identifier(name),
                    CompilerError::Preprocessor(message),
                );
            }
        }
    }

    fn push_conditional(&mut self, condition: bool) {
        let parent_active = self.is_active();
        if let Some(frame) = self.frames.last_mut() {
            frame
                .conditionals
                .push(Conditional::new(parent_active, condition));
        }
    }

    fn expect_identifier(
        &mut self,
        location: SourceLocation,
        directive: &str,
        args: &[(SourceLocation, Token)],
    ) -> Option<String> {
        match args.first() {
            Some((_, Token::Identifier(name))) => Some(name.clone()),
            Some((loc, token)) => {
                self.error(
                    *loc,
                    token.clone(),
                    CompilerError::Preprocessor(format!("Expected identifier after #{directive}")),
                );
                None
            }
            None => {
                self.error(
                    location,
                    Token::Identifier(directive.to_string()),
                    CompilerError::Preprocessor(format!("Expected identifier after #{directive}")),
                );
                None
            }
        }
    }

    fn handle_ifdef(
        &mut self,
        location: SourceLocation,
        directive: &str,
        args: &[(SourceLocation, Token)],
    ) {
        let condition = if self.is_active() {
            match self.expect_identifier(location, directive, args) {
                Some(name) => self.defines.contains_key(&name) == (directive == "ifdef"),
                None => false,
            }
        } else {
            false
        };
        self.push_conditional(condition);
    }

    fn handle_elif(&mut self, location: SourceLocation, args: &[(SourceLocation, Token)]) {
        let Some(current) = self.frames.last().and_then(|f| f.conditionals.last().copied()) else {
            self.unmatched(location, "#elif");
            return;
        };
        if current.seen_else {
            self.error(
                location,
                Token::Identifier("elif".into()),
                CompilerError::Preprocessor("#elif after #else".into()),
            );
            return;
        }
        let active = current.parent_active
            && !current.taken
            && self.evaluate_condition(location, args);
        self.update_conditional(|c| {
            c.active = active;
            c.taken |= active;
        });
    }

    fn handle_else(&mut self, location: SourceLocation) {
        let Some(current) = self.frames.last().and_then(|f| f.conditionals.last().copied()) else {
            self.unmatched(location, "#else");
            return;
        };
        if current.seen_else {
            self.error(
                location,
                Token::Identifier("else".into()),
                CompilerError::Preprocessor("#else after #else".into()),
            );
            return;
        }
        self.update_conditional(|c| {
            c.active = c.parent_active && !c.taken;
            c.taken = true;
            c.seen_else = true;
        });
    }

    fn handle_endif(&mut self, location: SourceLocation) {
        let popped = self
            .frames
            .last_mut()
            .and_then(|f| f.conditionals.pop())
            .is_some();
        if !popped {
            self.unmatched(location, "#endif");
        }
    }

    fn update_conditional(&mut self, f: impl FnOnce(&mut Conditional)) {
        if let Some(c) = self.frames.last_mut().and_then(|f| f.conditionals.last_mut()) {
            f(c);
        }
    }

    fn unmatched(&mut self, location: SourceLocation, directive: &str) {
        self.error(
            location,
            Token::Identifier(directive.trim_start_matches('#').to_string()),
            CompilerError::Preprocessor(format!("{directive} without #if")),
        );
    }

    /// Evaluate an `#if`/`#elif` condition; errors count as false
    fn evaluate_condition(
        &mut self,
        location: SourceLocation,
        args: &[(SourceLocation, Token)],
    ) -> bool {
        let result = self
            .resolve_defined(args)
            .and_then(|tokens| self.expand_for_condition(&tokens, &mut HashSet::new(), 0))
            .and_then(|tokens| expr::evaluate(&tokens));
        match result {
            Ok(value) => value != 0,
            Err(e) => {
                self.error(location, Token::Identifier("if".into()), e);
                false
            }
        }
    }

    /// Replace `defined X` and `defined(X)` with 1 or 0
    fn resolve_defined(&self, args: &[(SourceLocation, Token)]) -> Result<Vec<Token>, CompilerError> {
        let mut out = Vec::with_capacity(args.len());
        let mut iter = args.iter().map(|(_, t)| t);
        while let Some(token) = iter.next() {
            if token.as_identifier() != Some("defined") {
                out.push(token.clone());
                continue;
            }
            let name = match iter.next() {
                Some(Token::Identifier(name)) => name,
                Some(Token::Punct(Punct::LeftParen)) => {
                    let Some(Token::Identifier(name)) = iter.next() else {
                        return Err(CompilerError::Preprocessor(
                            "Expected identifier after defined(".into(),
                        ));
                    };
                    if !iter.next().is_some_and(|t| t.is_punct(Punct::RightParen)) {
                        return Err(CompilerError::Preprocessor(
                            "Expected \")\" after defined(".into(),
                        ));
                    }
                    name
                }
                _ => {
                    return Err(CompilerError::Preprocessor(
                        "Expected identifier after defined".into(),
                    ));
                }
            };
            out.push(Token::IntConstant(i32::from(self.defines.contains_key(name))));
        }
        Ok(out)
    }

    fn expand_for_condition(
        &self,
        tokens: &[Token],
        disabled: &mut HashSet<String>,
        depth: usize,
    ) -> Result<Vec<Token>, CompilerError> {
        let limit = self.compiler.config().recursion_limit;
        let mut out = Vec::with_capacity(tokens.len());
        for token in tokens {
            let define = token
                .as_identifier()
                .filter(|name| !disabled.contains(*name))
                .and_then(|name| self.defines.get(name));
            let Some(define) = define else {
                out.push(token.clone());
                continue;
            };
            if depth >= limit {
                return Err(CompilerError::RecursionLimitExceeded {
                    name: define.name().to_string(),
                    limit,
                });
            }
            let body: Vec<Token> = define
                .tokens()
                .iter()
                .map(|(_, t)| t.clone())
                .filter(|t| *t != Token::Newline)
                .collect();
            disabled.insert(define.name().to_string());
            let expanded = self.expand_for_condition(&body, disabled, depth + 1);
            disabled.remove(define.name());
            out.extend(expanded?);
        }
        Ok(out)
    }

    fn handle_define(&mut self, location: SourceLocation, args: Vec<(SourceLocation, Token)>) {
        let Some(name) = self.expect_identifier(location, "define", &args) else {
            return;
        };
        let name_location = args[0].0;
        let mut body = args.into_iter().skip(1).peekable();

        // `NAME(` with no space in between starts a parameter list
        if let Some((paren_location, token)) = body.peek()
            && token.is_punct(Punct::LeftParen)
            && paren_location.line == name_location.line
            && paren_location.column == name_location.column + name.len()
        {
            let paren_location = *paren_location;
            self.error(
                paren_location,
                Token::Punct(Punct::LeftParen),
                CompilerError::Preprocessor(format!(
                    "Function-like macro \"{name}\" is not supported"
                )),
            );
            return;
        }

        let mut define = MacroDefinition::new(name.clone());
        for (loc, token) in body {
            define.add_token(loc, token);
        }
        tracing::debug!(define = %name, tokens = define.len(), "#define");
        self.defines.insert(name, Rc::new(define));
    }

    fn handle_undef(&mut self, location: SourceLocation, args: &[(SourceLocation, Token)]) {
        if let Some(name) = self.expect_identifier(location, "undef", args) {
            tracing::debug!(define = %name, "#undef");
            self.defines.remove(&name);
        }
    }

    fn handle_include(&mut self, location: SourceLocation, args: &[(SourceLocation, Token)]) {
        let (local, name) = match args {
            [(_, Token::String(name))] => (true, name.clone()),
            [(_, first), inner @ .., (_, last)]
                if first.is_punct(Punct::LeftAngle) && last.is_punct(Punct::RightAngle) =>
            {
                let name: String = inner.iter().map(|(_, t)| t.to_string()).collect();
                (false, name)
            }
            _ => {
                self.error(
                    location,
                    Token::Identifier("include".into()),
                    CompilerError::Preprocessor(
                        "Expected \"file\" or <file> after #include".into(),
                    ),
                );
                return;
            }
        };
        self.include(location, local, name);
    }

    fn include(&mut self, location: SourceLocation, local: bool, name: String) {
        let limit = self.compiler.config().max_include_depth;
        if self.frames.len() > limit {
            self.error(
                location,
                Token::String(name.clone()),
                CompilerError::IncludeDepthExceeded { name, limit },
            );
            return;
        }
        let Some(base) = self.frames.last().map(|f| &f.source) else {
            return;
        };

        let compiler = self.compiler;
        let resolved = compiler
            .resolve_include(base, local, &name)
            .and_then(|source| Tokenizer::new(&source).map(|t| IncludeFrame::new(source, t)));
        let frame = match resolved {
            Ok(frame) => frame,
            Err(e) => {
                self.error(location, Token::String(name), e);
                return;
            }
        };

        if let Some(path) = &frame.path
            && self.frames.iter().any(|f| f.path.as_ref() == Some(path))
        {
            let path = path.clone();
            self.error(location, Token::String(name), CompilerError::IncludeCycle(path));
            return;
        }

        tracing::debug!(include = %name, depth = self.frames.len(), "entering include");
        self.frames.push(frame);
    }
}

fn join_tokens(tokens: &[(SourceLocation, Token)]) -> String {
    tokens
        .iter()
        .map(|(_, t)| t.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
