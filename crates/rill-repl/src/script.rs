//! Golden-file script runner.
//!
//! A script (`.smli`) interleaves declarations with expected output
//! lines, which are prefixed `> `. The runner strips the expected lines,
//! executes the remaining input against a fresh session, prefixes every
//! produced output line with `> `, and compares the two sequences
//! byte-for-byte.

use std::path::Path;

use crate::session::{Session, SessionConfig};

/// The prefix marking expected-output lines in a script.
pub const OUTPUT_PREFIX: &str = "> ";

/// Split a script into its input text and its expected output lines.
pub fn split_script(text: &str) -> (String, Vec<String>) {
    let mut input = String::new();
    let mut expected = Vec::new();
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix(OUTPUT_PREFIX) {
            expected.push(rest.to_string());
        } else if line == ">" {
            // A bare marker stands for an empty expected line.
            expected.push(String::new());
        } else {
            input.push_str(line);
            input.push('\n');
        }
    }
    (input, expected)
}

/// Execute a script's input against a fresh session, returning the
/// produced output lines.
pub fn run_text(text: &str, config: SessionConfig) -> Vec<String> {
    let (input, _) = split_script(text);
    let mut session = Session::new(config);
    session.eval_chunk(&input)
}

/// Execute a script file and return its output with the `> ` prefix on
/// every line, the form the golden comparison uses.
pub fn run_file(path: &Path, config: SessionConfig) -> std::io::Result<String> {
    let text = std::fs::read_to_string(path)?;
    let lines = run_text(&text, config);
    Ok(lines
        .iter()
        .map(|l| format!("{OUTPUT_PREFIX}{l}\n"))
        .collect())
}

/// The result of a golden comparison.
#[derive(Debug, PartialEq, Eq)]
pub enum GoldenResult {
    Matches,
    Differs {
        expected: Vec<String>,
        actual: Vec<String>,
    },
}

/// Execute a script file and compare its output against the embedded
/// expected lines, byte for byte.
pub fn check_file(path: &Path, config: SessionConfig) -> std::io::Result<GoldenResult> {
    let text = std::fs::read_to_string(path)?;
    let (input, expected) = split_script(&text);
    let mut session = Session::new(config);
    let actual = session.eval_chunk(&input);
    if expected == actual {
        Ok(GoldenResult::Matches)
    } else {
        Ok(GoldenResult::Differs { expected, actual })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_separates_input_and_expected() {
        let text = "1 + 2;\n> val it = 3 : int\nval x = 4;\n> val x = 4 : int\n";
        let (input, expected) = split_script(text);
        assert_eq!(input, "1 + 2;\nval x = 4;\n");
        assert_eq!(expected, vec!["val it = 3 : int", "val x = 4 : int"]);
    }

    #[test]
    fn matching_script_passes() {
        let text = "1 + 2;\n> val it = 3 : int\n";
        let (input, expected) = split_script(text);
        let mut session = Session::new(SessionConfig::default());
        let actual = session.eval_chunk(&input);
        assert_eq!(expected, actual);
    }

    #[test]
    fn diverging_script_reports_both_sides() {
        let text = "1 + 2;\n> val it = 4 : int\n";
        let (input, expected) = split_script(text);
        let mut session = Session::new(SessionConfig::default());
        let actual = session.eval_chunk(&input);
        assert_ne!(expected, actual);
    }

    #[test]
    fn multi_declaration_script_runs_in_order() {
        let text = "val x = 2;\nval y = x * 3;\ny;\n";
        let lines = run_text(text, SessionConfig::default());
        assert_eq!(
            lines,
            vec![
                "val x = 2 : int",
                "val y = 6 : int",
                "val it = 6 : int",
            ]
        );
    }
}
