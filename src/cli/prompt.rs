//! Interactive selection on the terminal
//!
//! Asks the operator which databases to export and where to write the
//! archive. Decisions already made on the command line are not asked again.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{ExportError, Result};
use crate::export::catalog::Manifest;
use crate::export::selection::{self, DatabaseChoice, Selector, StaticSelection};

/// Selector that prompts for whatever was not given up front
pub struct PromptSelection {
    databases: Option<DatabaseChoice>,
    destination: Option<PathBuf>,
}

impl PromptSelection {
    pub fn new(databases: Option<DatabaseChoice>, destination: Option<PathBuf>) -> Self {
        Self {
            databases,
            destination,
        }
    }
}

#[async_trait]
impl Selector for PromptSelection {
    async fn choose_databases(&self, available: &[String]) -> Result<Vec<String>> {
        if let Some(choice) = &self.databases {
            return StaticSelection::new(choice.clone(), None)
                .choose_databases(available)
                .await;
        }

        let mut question = String::from("Databases on the server:\n");
        for (i, name) in available.iter().enumerate() {
            question.push_str(&format!("  {:>3}) {}\n", i + 1, name));
        }
        question.push_str("Databases to export (names or numbers, '*' for all): ");

        let answer = ask(question).await?;
        Ok(parse_database_answer(&answer, available))
    }

    async fn choose_destination(&self, manifest: &Manifest, estimate: u64) -> Result<PathBuf> {
        if let Some(path) = &self.destination {
            return Ok(path.clone());
        }

        let default = selection::default_destination();
        let question = format!(
            "About to export ~{} document(s) from {} table(s).\nArchive path [{}]: ",
            estimate,
            manifest.table_count(),
            default.display()
        );

        let answer = ask(question).await?;
        Ok(parse_destination_answer(&answer).unwrap_or(default))
    }
}

/// Print a question on stderr and read one line from stdin
async fn ask(question: String) -> Result<String> {
    tokio::task::spawn_blocking(move || prompt_line(&question))
        .await
        .map_err(|e| ExportError::Internal(format!("prompt task failed: {e}")))?
}

fn prompt_line(question: &str) -> Result<String> {
    let mut stderr = io::stderr();
    stderr.write_all(question.as_bytes())?;
    stderr.flush()?;

    let mut input = String::new();
    let read = io::stdin().lock().read_line(&mut input)?;
    if read == 0 {
        // EOF: the operator closed the terminal
        return Err(ExportError::Cancelled);
    }
    Ok(input.trim().to_string())
}

/// Resolve an answer against the listed databases
///
/// Accepts `*` or `all`, or a list of names and 1-based indexes separated
/// by commas or spaces. Unknown names are kept so enumeration can reject
/// them with a proper error; out-of-range indexes are ignored.
pub fn parse_database_answer(answer: &str, available: &[String]) -> Vec<String> {
    let answer = answer.trim();
    if answer == "*" || answer.eq_ignore_ascii_case("all") {
        return selection::user_databases(available);
    }

    answer
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .filter_map(|token| match token.parse::<usize>() {
            Ok(_) if available.iter().any(|a| a == token) => Some(token.to_string()),
            Ok(index) => index
                .checked_sub(1)
                .and_then(|i| available.get(i))
                .cloned(),
            Err(_) => Some(token.to_string()),
        })
        .collect()
}

/// Destination typed by the operator, `None` to take the default
///
/// A bare name gets a `.zip` extension.
pub fn parse_destination_answer(answer: &str) -> Option<PathBuf> {
    let answer = answer.trim();
    if answer.is_empty() {
        return None;
    }
    let mut path = PathBuf::from(answer);
    if path.extension().is_none() {
        path.set_extension("zip");
    }
    Some(path)
}
