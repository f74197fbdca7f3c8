//! User-facing progress output
//!
//! [`Ui`] prints short status lines with a symbol per kind of message.
//! Every line is also kept in a transcript, which tests read back.

use console::{Term, style};
use std::sync::{Mutex, PoisonError};

/// Kind of status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Note,
    Progress,
    Success,
    Exclamation,
    Problem,
    Detail,
}

impl Level {
    fn symbol(&self) -> &'static str {
        match self {
            Level::Note => "→",
            Level::Progress => "◐",
            Level::Success => "✓",
            Level::Exclamation => "⚠",
            Level::Problem => "✗",
            Level::Detail => "·",
        }
    }

    fn styled_symbol(&self) -> console::StyledObject<&'static str> {
        match self {
            Level::Note => style(self.symbol()).blue().bold(),
            Level::Progress => style(self.symbol()).cyan(),
            Level::Success => style(self.symbol()).green(),
            Level::Exclamation => style(self.symbol()).yellow(),
            Level::Problem => style(self.symbol()).red(),
            Level::Detail => style(self.symbol()).dim(),
        }
    }
}

/// Progress reporter for installer operations
pub struct Ui {
    term: Option<Term>,
    verbose: bool,
    transcript: Mutex<Vec<(Level, String)>>,
}

impl Default for Ui {
    fn default() -> Self {
        Self::new()
    }
}

impl Ui {
    /// Report to stdout
    pub fn new() -> Self {
        Self {
            term: Some(Term::stdout()),
            verbose: false,
            transcript: Mutex::new(Vec::new()),
        }
    }

    /// Record without printing
    pub fn quiet() -> Self {
        Self {
            term: None,
            ..Self::new()
        }
    }

    /// Also show detail lines
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    fn emit(&self, level: Level, message: impl Into<String>) {
        let message = message.into();
        if level == Level::Detail && !self.verbose {
            return;
        }
        if let Some(term) = &self.term {
            let line = match level {
                Level::Success => format!("{} {}", level.styled_symbol(), style(&message).green()),
                Level::Problem => format!("{} {}", level.styled_symbol(), style(&message).red()),
                Level::Detail => format!("  {} {}", level.styled_symbol(), style(&message).dim()),
                _ => format!("{} {}", level.styled_symbol(), message),
            };
            let _ = term.write_line(&line);
        }
        self.transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((level, message));
    }

    pub fn note(&self, message: impl Into<String>) {
        self.emit(Level::Note, message);
    }

    pub fn progress(&self, message: impl Into<String>) {
        self.emit(Level::Progress, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.emit(Level::Success, message);
    }

    pub fn exclamation(&self, message: impl Into<String>) {
        self.emit(Level::Exclamation, message);
    }

    pub fn problem(&self, message: impl Into<String>) {
        self.emit(Level::Problem, message);
    }

    /// Only shown (and recorded) in verbose mode
    pub fn detail(&self, message: impl Into<String>) {
        self.emit(Level::Detail, message);
    }

    /// Every line emitted so far
    pub fn transcript(&self) -> Vec<(Level, String)> {
        self.transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a line of `level` containing `needle` was emitted
    pub fn saw(&self, level: Level, needle: &str) -> bool {
        self.transcript()
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript() {
        let ui = Ui::quiet();
        ui.note("Deploying traefik");
        ui.success("traefik deployed");
        ui.detail("hidden");

        let lines = ui.transcript();
        assert_eq!(lines.len(), 2);
        assert!(ui.saw(Level::Note, "traefik"));
        assert!(ui.saw(Level::Success, "deployed"));
        assert!(!ui.saw(Level::Detail, "hidden"));
    }

    #[test]
    fn test_verbose_records_details() {
        let ui = Ui::quiet().verbose();
        ui.detail("helm install traefik");
        assert!(ui.saw(Level::Detail, "helm install"));
    }
}
