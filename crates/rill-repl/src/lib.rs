//! Rill REPL: session state, the interactive shell, and the golden-file
//! script runner.

pub mod script;
pub mod session;
pub mod shell;

pub use script::{check_file, run_file, run_text, GoldenResult};
pub use session::{Session, SessionConfig};
pub use shell::{run_shell, ShellConfig};
