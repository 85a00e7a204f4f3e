//! User-facing progress output and the end-of-run summary
//!
//! Diagnostics go through `tracing`; this is the plain stdout narrative the
//! user watches, silenced entirely by `--quiet`.

use super::{Stage, StageResult};

/// `title` framed by `=` and `-` rules two characters wider than the title.
pub fn section_banner(title: &str) -> String {
    let width = title.chars().count() + 2;
    format!("\n{}\n{}\n{}\n", "=".repeat(width), title, "-".repeat(width))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Console {
    quiet: bool,
}

impl Console {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    pub fn section(&self, title: &str) {
        if !self.quiet {
            println!("{}", section_banner(title));
        }
    }

    pub fn line(&self, message: impl AsRef<str>) {
        if !self.quiet {
            println!("{}", message.as_ref());
        }
    }
}

/// How one stage ended, detached from the error value itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Skipped(String),
    Succeeded,
    /// Failed but the run carried on.
    Degraded(String),
    Failed(String),
}

impl Outcome {
    pub fn icon(&self) -> &'static str {
        match self {
            Outcome::Skipped(_) => "⏭️",
            Outcome::Succeeded => "✅",
            Outcome::Degraded(_) => "⚠️",
            Outcome::Failed(_) => "❌",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRecord {
    pub stage: Stage,
    pub outcome: Outcome,
}

/// Stage outcomes in the order they ran.
#[derive(Debug, Default)]
pub struct RunReport {
    records: Vec<StageRecord>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: Stage, outcome: Outcome) {
        self.records.push(StageRecord { stage, outcome });
    }

    /// Record a stage result; `fatal` decides whether a failure is reported
    /// as fatal or as degraded.
    pub fn record_result(&mut self, stage: Stage, result: &StageResult, fatal: bool) {
        let outcome = match result {
            StageResult::Skipped(reason) => Outcome::Skipped(reason.clone()),
            StageResult::Succeeded => Outcome::Succeeded,
            StageResult::Failed(e) if fatal => Outcome::Failed(e.to_string()),
            StageResult::Failed(e) => Outcome::Degraded(e.to_string()),
        };
        self.record(stage, outcome);
    }

    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }

    pub fn outcome(&self, stage: Stage) -> Option<&Outcome> {
        self.records
            .iter()
            .find(|r| r.stage == stage)
            .map(|r| &r.outcome)
    }

    pub fn has_fatal(&self) -> bool {
        self.records
            .iter()
            .any(|r| matches!(r.outcome, Outcome::Failed(_)))
    }

    pub fn summary_lines(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|r| {
                let detail = match &r.outcome {
                    Outcome::Skipped(reason) => format!("skipped ({reason})"),
                    Outcome::Succeeded => "done".to_string(),
                    Outcome::Degraded(reason) => format!("failed, continuing ({reason})"),
                    Outcome::Failed(reason) => format!("failed ({reason})"),
                };
                format!("  {} {}: {}", r.outcome.icon(), r.stage.title(), detail)
            })
            .collect()
    }

    pub fn print_summary(&self, console: &Console) {
        console.line("");
        console.line("🏠 HomeBox Bootstrap Summary");
        console.line("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        for line in self.summary_lines() {
            console.line(line);
        }
        console.line("");
        if self.has_fatal() {
            console.line("❌ Bootstrap did not complete");
        } else {
            console.line("✅ Bootstrap complete!");
        }
    }
}
