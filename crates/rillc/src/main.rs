//! The Rill command line.
//!
//! With no script arguments it starts the interactive shell; with script
//! files it runs each through the session pipeline. `--check` compares
//! script output against the embedded expected lines (the golden-file
//! format) instead of printing it.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rill_repl::{check_file, run_file, GoldenResult, SessionConfig, ShellConfig};

#[derive(Parser, Debug)]
#[command(name = "rillc", version, about = "The Rill interpreter")]
struct Cli {
    /// Print the interactive prompt.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    prompt: bool,

    /// Print the banner on startup.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    banner: bool,

    /// Echo input before output (transcript style).
    #[arg(long, default_value_t = false)]
    echo: bool,

    /// Terminal name (accepted for compatibility; only "dumb" changes
    /// behavior, suppressing prompt and banner).
    #[arg(long)]
    terminal: Option<String>,

    /// Expose host information to scripts.
    #[arg(long, default_value_t = false, action = clap::ArgAction::Set)]
    system: bool,

    /// Base directory for `use`.
    #[arg(long)]
    directory: Option<PathBuf>,

    /// Directory for script files (defaults to --directory).
    #[arg(long)]
    script_directory: Option<PathBuf>,

    /// Bound on nested `use` calls.
    #[arg(long, default_value_t = 10)]
    max_use_depth: u32,

    /// Bound on inline/fusion passes; 0 disables inlining.
    #[arg(long, default_value_t = 10)]
    inline_pass_count: u32,

    /// Allow queries to span the evaluator/backend boundary.
    #[arg(long, default_value_t = false, action = clap::ArgAction::Set)]
    hybrid: bool,

    /// Report redundant and non-exhaustive matches.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    match_coverage_enabled: bool,

    /// Compare script output against embedded `> ` lines instead of
    /// printing it.
    #[arg(long, default_value_t = false)]
    check: bool,

    /// Script files to execute.
    files: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let directory = cli.directory.clone().unwrap_or_else(|| PathBuf::from("."));
    let script_directory = cli
        .script_directory
        .clone()
        .unwrap_or_else(|| directory.clone());
    let session = SessionConfig {
        source_name: "stdIn".to_string(),
        directory,
        script_directory,
        max_use_depth: cli.max_use_depth,
        match_coverage_enabled: cli.match_coverage_enabled,
        inline_pass_count: cli.inline_pass_count,
        hybrid: cli.hybrid,
    };

    if cli.files.is_empty() {
        let dumb = cli.terminal.as_deref() == Some("dumb");
        if cli.system && !dumb {
            println!("{} {}", std::env::consts::OS, std::env::consts::ARCH);
        }
        let shell = ShellConfig {
            prompt: cli.prompt && !dumb,
            banner: cli.banner && !dumb,
            echo: cli.echo,
            session,
        };
        let code = rill_repl::run_shell(shell);
        return ExitCode::from(code as u8);
    }

    let mut failed = false;
    for file in &cli.files {
        if cli.check {
            match check_file(file, session.clone()) {
                Ok(GoldenResult::Matches) => {
                    println!("{}: ok", file.display());
                }
                Ok(GoldenResult::Differs { expected, actual }) => {
                    failed = true;
                    eprintln!("{}: output differs", file.display());
                    for line in &expected {
                        eprintln!("  expected: {line}");
                    }
                    for line in &actual {
                        eprintln!("  actual:   {line}");
                    }
                }
                Err(e) => {
                    failed = true;
                    eprintln!("{}: {e}", file.display());
                }
            }
        } else {
            match run_file(file, session.clone()) {
                Ok(output) => print!("{output}"),
                Err(e) => {
                    failed = true;
                    eprintln!("{}: {e}", file.display());
                }
            }
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
