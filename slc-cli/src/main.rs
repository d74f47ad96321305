#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # slc CLI
//!
//! A command-line interface for the slc shading language front end.

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use serde::Serialize;
use slc::{Compiler, CompilerConfig, Diagnostic, DiagnosticHandler, DiagnosticKind, Program};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Exit codes for different error conditions
mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const IO_ERROR: i32 = 2;
    pub const COMPILE_ERROR: i32 = 3;
    pub const ARGUMENT_ERROR: i32 = 4;
}

/// Command-line interface for the slc compiler front end
#[derive(Parser)]
#[command(
    name = "slc",
    version,
    author,
    about = "Front end for a small C-like shading language",
    long_about = "slc preprocesses and parses shading language sources, resolving defines, conditionals and local includes, and reports the top-level declarations it finds.",
    after_help = "EXAMPLES:
  # Check a shader
  $ slc shader.frag

  # Define macros the way a build system would
  $ slc shader.frag -D USE_FOG -D QUALITY=2

  # Read from stdin (local includes are unavailable)
  $ cat shader.frag | slc -

  # Machine-readable summary
  $ slc shader.frag --json

  # Show warnings and debug logging
  $ slc shader.frag -W -v"
)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Input file to compile (use '-' for stdin)
    #[arg(help = "Input shader file to compile (use '-' for stdin)")]
    input: PathBuf,

    /// Define a macro
    #[arg(
        short = 'D',
        long = "define",
        value_name = "NAME[=VALUE]",
        help = "Define NAME as VALUE, or as 1 if no value is given"
    )]
    defines: Vec<String>,

    /// Remove a macro
    #[arg(
        short = 'U',
        long = "undefine",
        value_name = "NAME",
        help = "Remove a define given earlier on the command line"
    )]
    undefines: Vec<String>,

    /// Maximum recursion depth for macro expansion
    #[arg(
        long,
        default_value_t = slc::DEFAULT_RECURSION_LIMIT,
        help = "Maximum recursion depth for macro expansion"
    )]
    recursion_limit: usize,

    /// Maximum include nesting depth
    #[arg(
        long,
        default_value_t = slc::DEFAULT_MAX_INCLUDE_DEPTH,
        help = "Maximum nesting depth for #include"
    )]
    max_include_depth: usize,

    /// Output in JSON format
    #[arg(long, help = "Output compilation result in JSON format")]
    #[cfg(feature = "json")]
    json: bool,

    /// Output in plain text format (no formatting)
    #[arg(long, help = "Output in plain text format for scripts")]
    plain: bool,

    /// Enable verbose output
    #[arg(
        short = 'v',
        long,
        help = "Enable verbose output with diagnostic information"
    )]
    verbose: bool,

    /// Suppress non-error output
    #[arg(short = 'q', long, help = "Suppress non-error output (quiet mode)")]
    quiet: bool,

    /// Show warnings
    #[arg(short = 'W', long, help = "Show compiler warnings")]
    warnings: bool,

    /// Show what would happen without compiling
    #[arg(
        short = 'n',
        long,
        help = "Show what would happen without actually compiling"
    )]
    dry_run: bool,

    /// Disable colored output
    #[arg(long, help = "Disable colored output")]
    no_color: bool,

    /// Force colored output
    #[arg(long, help = "Force colored output even when not a terminal")]
    force_color: bool,
}

/// Error returned when the compiler rejects the input
#[derive(Debug, Error)]
#[error("compilation failed with {errors} error(s)")]
struct CompileFailed {
    errors: usize,
}

/// Error returned for invalid combinations of arguments
#[derive(Debug, Error)]
#[error("{0}")]
struct ArgumentError(String);

/// A diagnostic as printed or serialized by the CLI
#[derive(Debug, Clone, Serialize)]
struct Report {
    source: String,
    line: usize,
    column: usize,
    severity: &'static str,
    message: String,
}

impl From<&Diagnostic> for Report {
    fn from(diagnostic: &Diagnostic) -> Self {
        let (severity, message) = match &diagnostic.kind {
            DiagnosticKind::Error(e) => ("error", e.to_string()),
            DiagnosticKind::Warning(w) => ("warning", w.to_string()),
        };
        Self {
            source: diagnostic.source_name.clone(),
            line: diagnostic.location.line + 1,
            column: diagnostic.location.column,
            severity,
            message,
        }
    }
}

/// Main application entry point
fn main() {
    std::process::exit(match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e:#}", "Error:".red().bold());
            determine_exit_code(&e)
        }
    });
}

/// Determine the appropriate exit code based on the error
fn determine_exit_code(error: &anyhow::Error) -> i32 {
    if error.downcast_ref::<std::io::Error>().is_some() {
        exit_code::IO_ERROR
    } else if error.downcast_ref::<CompileFailed>().is_some()
        || error.downcast_ref::<slc::CompilerError>().is_some()
    {
        exit_code::COMPILE_ERROR
    } else if error.downcast_ref::<ArgumentError>().is_some() {
        exit_code::ARGUMENT_ERROR
    } else {
        exit_code::GENERAL_ERROR
    }
}

/// Exit code of a successful compile: shown warnings turn it into a
/// general error
fn success_exit_code(cli: &Cli, reports: &[Report]) -> i32 {
    let shown = cli.warnings && !cli.quiet;
    if shown && reports.iter().any(|r| r.severity == "warning") {
        exit_code::GENERAL_ERROR
    } else {
        exit_code::SUCCESS
    }
}

/// Run the main application logic and return the exit code
fn run() -> Result<i32> {
    let cli = Cli::parse();

    let color = use_color(&cli);
    colored::control::set_override(color);
    init_logging(&cli, color);
    validate_args(&cli)?;

    if cli.dry_run {
        show_dry_run_info(&cli);
        return Ok(exit_code::SUCCESS);
    }

    let reports = Rc::new(RefCell::new(Vec::new()));
    let config = create_config(&cli, Rc::clone(&reports));
    let compiler = create_compiler(&cli, config)?;

    let start_time = std::time::Instant::now();
    let program = if is_stdin(&cli.input) {
        let input = read_stdin()?;
        compiler.compile_bytes(input)
    } else {
        if !cli.input.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("input file not found: {}", cli.input.display()),
            )
            .into());
        }
        compiler.compile_file(&cli.input)
    };
    let processing_time = start_time.elapsed();
    tracing::debug!(?processing_time, "compile finished");

    let reports = reports.borrow();
    print_reports(&cli, &reports);

    #[cfg(feature = "json")]
    if cli.json {
        write_json_output(&cli, program.as_ref(), &reports, processing_time)?;
    }

    let Some(program) = program else {
        let errors = reports.iter().filter(|r| r.severity == "error").count();
        return Err(CompileFailed { errors }.into());
    };

    #[cfg(feature = "json")]
    if cli.json {
        return Ok(success_exit_code(&cli, &reports));
    }

    if !cli.quiet {
        print_summary(&cli, &program);
    }
    if cli.verbose && !cli.quiet {
        eprintln!(
            "{} Compiled {} in {:?}",
            "✓".green(),
            format_input(&cli.input),
            processing_time
        );
    }
    Ok(success_exit_code(&cli, &reports))
}

/// Install the tracing subscriber; `RUST_LOG` overrides the default level
fn init_logging(cli: &Cli, ansi: bool) {
    let default_level = if cli.verbose { "slc=debug" } else { "slc=warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(ansi),
        )
        .with(filter)
        .init();
}

/// Decide whether to use colors
fn use_color(cli: &Cli) -> bool {
    if cli.no_color || cli.plain {
        false
    } else if cli.force_color {
        true
    } else {
        atty::is(atty::Stream::Stderr)
    }
}

/// Validate command-line arguments
fn validate_args(cli: &Cli) -> Result<()> {
    if cli.no_color && cli.force_color {
        return Err(
            ArgumentError("--no-color and --force-color are mutually exclusive".into()).into(),
        );
    }
    if cli.verbose && cli.quiet {
        return Err(
            ArgumentError("--verbose and --quiet are mutually exclusive".into()).into(),
        );
    }
    if cli.recursion_limit == 0 {
        return Err(ArgumentError("Recursion limit must be greater than 0".into()).into());
    }
    for define in &cli.defines {
        let (name, _) = split_define(define);
        if !slc::is_valid_identifier(name) {
            return Err(ArgumentError(format!("Invalid define name: {name}")).into());
        }
    }
    Ok(())
}

/// Split `NAME=VALUE` into its parts; a bare `NAME` has no value
fn split_define(define: &str) -> (&str, Option<&str>) {
    match define.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (define, None),
    }
}

/// Show dry run information
fn show_dry_run_info(cli: &Cli) {
    eprintln!("Dry run: would compile {}", format_input(&cli.input));
    eprintln!("Recursion limit: {}", cli.recursion_limit);
    eprintln!("Include depth limit: {}", cli.max_include_depth);

    if !cli.defines.is_empty() {
        eprintln!("Defines:");
        for define in &cli.defines {
            let (name, value) = split_define(define);
            eprintln!("  {name} = {}", value.unwrap_or("1"));
        }
    }
    if !cli.undefines.is_empty() {
        eprintln!("Undefines: {}", cli.undefines.join(", "));
    }

    #[cfg(feature = "json")]
    if cli.json {
        eprintln!("Output format: JSON");
    } else if cli.plain {
        eprintln!("Output format: Plain text");
    }
}

/// Create compiler configuration from CLI arguments
fn create_config(cli: &Cli, reports: Rc<RefCell<Vec<Report>>>) -> CompilerConfig {
    CompilerConfig::new()
        .with_recursion_limit(cli.recursion_limit)
        .with_max_include_depth(cli.max_include_depth)
        .with_diagnostic_handler(create_diagnostic_handler(reports))
}

/// Create a handler collecting diagnostics for later printing
fn create_diagnostic_handler(reports: Rc<RefCell<Vec<Report>>>) -> DiagnosticHandler {
    Rc::new(move |diagnostic: &Diagnostic| {
        reports.borrow_mut().push(Report::from(diagnostic));
    })
}

/// Create the compiler and apply `-D`/`-U` in command-line order
fn create_compiler(cli: &Cli, config: CompilerConfig) -> Result<Compiler> {
    let mut compiler = Compiler::with_config(config);
    for define in &cli.defines {
        let (name, value) = split_define(define);
        compiler
            .add_define(name, value)
            .with_context(|| format!("Invalid definition for {name}"))?;
    }
    for name in &cli.undefines {
        compiler.remove_define(name);
    }
    Ok(compiler)
}

/// Read source text from stdin
fn read_stdin() -> Result<Vec<u8>> {
    use std::io::Read;
    let mut buffer = Vec::new();
    std::io::stdin()
        .read_to_end(&mut buffer)
        .context("Failed to read from stdin")?;
    Ok(buffer)
}

/// Print collected diagnostics to stderr
fn print_reports(cli: &Cli, reports: &[Report]) {
    for report in reports {
        let is_error = report.severity == "error";
        if !is_error && (!cli.warnings || cli.quiet) {
            continue;
        }
        let severity = if is_error {
            report.severity.red().bold()
        } else {
            report.severity.yellow().bold()
        };
        eprintln!(
            "{}:{}:{}: {severity}: {}",
            report.source.bold(),
            report.line,
            report.column,
            report.message
        );
    }
}

/// Print the declarations of a compiled program
fn print_summary(cli: &Cli, program: &Program) {
    if cli.plain {
        for declaration in program.declarations() {
            println!("{}", declaration.name().unwrap_or("-"));
        }
        return;
    }
    println!(
        "{} {} declaration(s)",
        format_input(&cli.input).bold(),
        program.declarations().len()
    );
    for declaration in program.declarations() {
        let location = declaration.location();
        let kind = if declaration.has_body() { "block" } else { "statement" };
        println!(
            "  {:>4}:{:<3} {:<9} {}",
            location.line + 1,
            location.column,
            kind.dimmed(),
            declaration.name().unwrap_or("<anonymous>")
        );
    }
}

/// Write JSON output
#[cfg(feature = "json")]
fn write_json_output(
    cli: &Cli,
    program: Option<&Program>,
    reports: &[Report],
    processing_time: std::time::Duration,
) -> Result<()> {
    use serde_json::json;

    let declarations: Vec<_> = program
        .map(|p| {
            p.declarations()
                .iter()
                .map(|d| {
                    json!({
                        "name": d.name(),
                        "line": d.location().line + 1,
                        "column": d.location().column,
                        "has_body": d.has_body(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let result = json!({
        "success": program.is_some(),
        "input_file": format_input(&cli.input),
        "defines": cli.defines,
        "declarations": declarations,
        "diagnostics": reports,
        "processing_time_ms": processing_time.as_secs_f64() * 1000.0,
    });

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn is_stdin(path: &Path) -> bool {
    path == Path::new("-")
}

/// Format input path for display
fn format_input(path: &Path) -> String {
    if is_stdin(path) {
        "stdin".to_string()
    } else {
        path.display().to_string()
    }
}
