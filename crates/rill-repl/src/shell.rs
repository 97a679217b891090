//! The interactive shell: rustyline line editing around the session.
//!
//! Input accumulates across lines until a `;` arrives, then the buffered
//! chunk runs through the session pipeline and its output lines print.

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::session::{Session, SessionConfig};

/// Shell configuration.
#[derive(Clone, Debug)]
pub struct ShellConfig {
    /// Print the primary/continuation prompts.
    pub prompt: bool,
    /// Print the banner on startup.
    pub banner: bool,
    /// Echo each input chunk before its output (script-style transcripts).
    pub echo: bool,
    pub session: SessionConfig,
}

impl Default for ShellConfig {
    fn default() -> Self {
        ShellConfig {
            prompt: true,
            banner: true,
            echo: false,
            session: SessionConfig::default(),
        }
    }
}

const BANNER: &str = concat!("rill ", env!("CARGO_PKG_VERSION"));
const PROMPT: &str = "- ";
const CONTINUATION: &str = "= ";

/// Run the interactive loop until end of input. Returns the process exit
/// code.
pub fn run_shell(config: ShellConfig) -> i32 {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("cannot initialize terminal: {e}");
            return 1;
        }
    };
    if config.banner {
        println!("{BANNER}");
    }

    let mut session = Session::new(config.session.clone());
    let mut buffer = String::new();

    loop {
        let prompt = if config.prompt {
            if buffer.is_empty() {
                PROMPT
            } else {
                CONTINUATION
            }
        } else {
            ""
        };
        match editor.readline(prompt) {
            Ok(line) => {
                buffer.push_str(&line);
                buffer.push('\n');
                // A declaration ends at a semicolon; keep buffering until
                // one arrives.
                if !line.contains(';') {
                    continue;
                }
                let chunk = std::mem::take(&mut buffer);
                let _ = editor.add_history_entry(chunk.trim());
                if config.echo {
                    print!("{chunk}");
                }
                for out in session.eval_chunk(&chunk) {
                    println!("{out}");
                }
            }
            Err(ReadlineError::Interrupted) => {
                buffer.clear();
            }
            Err(ReadlineError::Eof) => return 0,
            Err(e) => {
                eprintln!("input error: {e}");
                return 1;
            }
        }
    }
}
