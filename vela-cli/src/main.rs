//! Vela CLI — reads a source file and runs it.
//!
//! Mirrors the reference host's `main.pc` behavior: lex, parse, execute,
//! print `Exit` on a clean run or `Abort <message>` on a fatal error.
//! Everything beyond that (the `run` subcommand vs. the bare positional
//! shorthand, `--trace`/`--no-color`, and the demonstration natives
//! registered below) is ambient CLI ergonomics,
//! not part of the language core.

use std::io::BufRead;
use std::path::PathBuf;
use std::time::Instant;

use bumpalo::Bump;
use clap::{Parser as ClapParser, Subcommand};
use tracing_subscriber::EnvFilter;

use vela_core::native::{Context, Literal};
use vela_core::Interpreter;

#[derive(ClapParser)]
#[command(
    name = "vela",
    version,
    about = "Vela — a small C-like tree-walking scripting language",
    long_about = "Vela lexes, parses, and tree-walks a small dynamically-typed \
                  C-like scripting language.\n\n\
                  Examples:\n  \
                  vela main.pc            Run a script\n  \
                  vela run main.pc        Same, via the explicit subcommand\n  \
                  vela run main.pc --trace   Run with verbose diagnostics"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Script to run (shorthand for `vela run <file>`)
    file: Option<PathBuf>,

    /// Raise the log level to include trace-level parse/eval diagnostics
    #[arg(long, global = true)]
    trace: bool,

    /// Disable ANSI color in diagnostic rendering
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Vela source file
    Run {
        /// Path to the source file
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.trace { "vela=trace" } else { "vela=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_ansi(!cli.no_color)
        .with_target(false)
        .without_time()
        .init();

    let file = match (cli.command, cli.file) {
        (Some(Commands::Run { file }), _) => file,
        (None, Some(file)) => file,
        (None, None) => {
            eprintln!("usage: vela <file> | vela run <file>");
            std::process::exit(2);
        }
    };

    let source = std::fs::read_to_string(&file).unwrap_or_else(|err| {
        eprintln!("Abort could not read '{}': {err}", file.display());
        std::process::exit(0);
    });

    let arena = Bump::new();
    let mut interpreter = Interpreter::new(&arena);
    register_natives(&mut interpreter);

    let start = Instant::now();
    let ok = interpreter.run(&source);
    tracing::debug!(elapsed = ?start.elapsed(), "run finished");

    if ok {
        println!("Exit");
    } else {
        let message = interpreter
            .diagnostics
            .iter()
            .rev()
            .find(|d| d.severity == vela_core::Severity::Error)
            .map(|d| d.message.clone())
            .unwrap_or_else(|| "unknown error".to_string());
        println!("Abort {message}");
    }

    interpreter.clear();
}

/// Supplemental default natives:
/// `clock()`, `len(x)`, `read_line()`. These exercise
/// `Interpreter::register` from the embedder's side; the core only
/// supplies the registration mechanism.
fn register_natives(interpreter: &mut Interpreter) {
    let start = Instant::now();
    interpreter
        .register("clock", move |_ctx: &mut Context, _argc: usize| {
            Literal::Number(start.elapsed().as_secs_f64())
        })
        .expect("natives are registered once, before any script-defined duplicate");

    interpreter
        .register("len", |ctx: &mut Context, argc: usize| {
            if argc == 0 {
                return Literal::Number(0.0);
            }
            if ctx.is_string(0) {
                Literal::Number(ctx.get_string(0).chars().count() as f64)
            } else {
                Literal::Number(0.0)
            }
        })
        .expect("natives are registered once, before any script-defined duplicate");

    interpreter
        .register("read_line", |_ctx: &mut Context, _argc: usize| {
            let mut line = String::new();
            match std::io::stdin().lock().read_line(&mut line) {
                Ok(0) => Literal::Nil,
                Ok(_) => Literal::String(line.trim_end_matches(['\n', '\r']).to_string()),
                Err(_) => Literal::Nil,
            }
        })
        .expect("natives are registered once, before any script-defined duplicate");
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_core::io::CollectSink;

    #[test]
    fn len_native_counts_string_chars() {
        let arena = Bump::new();
        let sink = CollectSink::default();
        let mut interp = Interpreter::with_sink(&arena, Box::new(sink.clone()));
        register_natives(&mut interp);
        let ok = interp.run("print(len(\"hello\"));");
        assert!(ok);
        assert_eq!(sink.lines(), vec!["5"]);
    }

    #[test]
    fn clock_native_returns_a_non_negative_number() {
        let arena = Bump::new();
        let sink = CollectSink::default();
        let mut interp = Interpreter::with_sink(&arena, Box::new(sink.clone()));
        register_natives(&mut interp);
        let ok = interp.run("print(clock() >= 0);");
        assert!(ok);
        assert_eq!(sink.lines(), vec!["1"]);
    }

    #[test]
    fn cli_parses_bare_file_shorthand_and_run_subcommand() {
        let bare = Cli::try_parse_from(["vela", "main.pc"]).unwrap();
        assert_eq!(bare.file, Some(PathBuf::from("main.pc")));
        assert!(bare.command.is_none());

        let explicit = Cli::try_parse_from(["vela", "run", "main.pc"]).unwrap();
        assert!(matches!(explicit.command, Some(Commands::Run { file }) if file == PathBuf::from("main.pc")));
    }
}
