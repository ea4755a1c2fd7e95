//! Emission report types shared by every format emitter.
//!
//! A report tracks how many tasks went through an emitter, how many were
//! skipped by the partial-failure policy, and the accumulated warnings, so
//! users can see exactly what happened during a run.

use serde::Serialize;
use std::fmt;

/// The outcome of one emission run.
///
/// A task that hits a per-task error (unresolvable geometry, conflicting
/// spans) moves to the skipped count with a warning; it never fails the run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct EmissionReport {
    /// Number of tasks seen on the input stream.
    pub tasks_total: usize,
    /// Number of tasks that produced no output because of a per-task error.
    pub tasks_skipped: usize,
    /// Human-readable warnings accumulated during the run.
    pub warnings: Vec<String>,
}

impl EmissionReport {
    /// Record a warning and also forward it to the logger.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{message}");
        self.warnings.push(message);
    }

    /// Record a skipped task together with the reason.
    pub fn skip_task(&mut self, task_id: i64, reason: impl fmt::Display) {
        self.tasks_skipped += 1;
        self.warn(format!("task {task_id} skipped: {reason}"));
    }

    /// Number of tasks that produced output.
    pub fn tasks_succeeded(&self) -> usize {
        self.tasks_total - self.tasks_skipped
    }
}

impl fmt::Display for EmissionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} task(s), {} skipped",
            self.tasks_total, self.tasks_skipped
        )?;

        if !self.warnings.is_empty() {
            writeln!(f)?;
            writeln!(f, "Warnings ({}):", self.warnings.len())?;
            for warning in &self.warnings {
                writeln!(f, "  - {warning}")?;
            }
        }

        Ok(())
    }
}
