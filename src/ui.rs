// UI layer: the terminal-facing bits of the CLI.
//
// Prompts use `dialoguer`, batch progress uses an `indicatif` bar on
// stderr, and reports are coloured with `crossterm` when stdout is a
// terminal. Nothing here talks to the API.

use crate::bulk::{BatchReport, Outcome, Progress};
use crate::models::{Item, Tag};
use crate::paths::LocationTree;
use anyhow::{Context, Result};
use crossterm::style::Stylize;
use dialoguer::{Confirm, Password};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;

/// Ask for the account password without echoing it.
pub fn prompt_password(username: Option<&str>) -> Result<String> {
    let prompt = match username {
        Some(user) => format!("Homebox password for {user}"),
        None => "Homebox password".to_string(),
    };
    Password::new()
        .with_prompt(prompt)
        .interact()
        .context("reading password")
}

/// Yes/no question, defaulting to "no".
pub fn confirm(prompt: &str) -> Result<bool> {
    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .context("reading confirmation")
}

/// Progress bar driven by the batch callbacks. Hidden automatically when
/// stderr is not a terminal.
pub struct BatchProgress {
    bar: ProgressBar,
}

impl BatchProgress {
    pub fn new(action: &str) -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template("{spinner} {prefix} [{bar:30}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        bar.set_prefix(action.to_string());
        BatchProgress { bar }
    }

    pub fn observe(&self, progress: Progress<'_>) {
        match progress {
            Progress::Started { total } => self.bar.set_length(total as u64),
            Progress::Row(row) => {
                self.bar.set_message(row.key.clone());
                self.bar.inc(1);
            }
        }
    }

    pub fn finish(self) {
        self.bar.finish_and_clear();
    }
}

/// One line per row, then a summary of outcome counts.
pub fn print_report(report: &BatchReport) {
    let color = std::io::stdout().is_terminal();
    for row in &report.rows {
        let outcome = row.outcome.to_string();
        let outcome = if !color {
            outcome
        } else {
            match &row.outcome {
                Outcome::Failed(_) => outcome.red().to_string(),
                Outcome::Created(_) | Outcome::Updated(_) => outcome.green().to_string(),
                Outcome::Planned(_) => outcome.cyan().to_string(),
                Outcome::Unchanged(_) | Outcome::Skipped(_) => outcome.dark_grey().to_string(),
            }
        };
        println!("line {:>4}  {:<30}  {}", row.line, row.key, outcome);
    }

    let summary = report
        .counts()
        .iter()
        .map(|(label, n)| format!("{n} {label}"))
        .collect::<Vec<_>>()
        .join(", ");
    if summary.is_empty() {
        println!("no rows");
    } else if report.has_failures() && color {
        println!("{}", summary.bold().red());
    } else {
        println!("{summary}");
    }
}

pub fn print_locations(tree: &LocationTree) -> crate::Result<()> {
    for location in tree.iter() {
        println!("{}\t{}", location.id, tree.path_of(&location.id)?);
    }
    Ok(())
}

pub fn print_items(items: &[Item], tree: &LocationTree) -> crate::Result<()> {
    for item in items {
        let path = match item.location_id() {
            Some(id) => tree.path_of(id)?,
            None => String::new(),
        };
        let tags = item
            .tags
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join(",");
        println!("{}\t{}\t{}\t{}\t{}", item.id, item.name, item.quantity, path, tags);
    }
    Ok(())
}

pub fn print_tags(tags: &[Tag]) {
    for tag in tags {
        println!("{}\t{}", tag.id, tag.name);
    }
}
