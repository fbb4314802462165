//! Run report: ordered results, overall verdict and summary rendering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use super::{Phase, TestResult, Verdict};
use crate::core::{DeviceCategory, TransportKind};
use crate::error::AppResult;

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunOutcome {
    /// Every scheduled case produced a result
    Completed,
    /// Cancellation was observed before all scheduled cases executed
    Aborted,
    /// The device could not be connected or the harness itself failed
    Fatal,
}

impl RunOutcome {
    /// Name used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Completed => "COMPLETED",
            RunOutcome::Aborted => "ABORTED",
            RunOutcome::Fatal => "FATAL",
        }
    }
}

/// Per-phase tallies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub phase: Phase,
    pub total: usize,
    pub passed: usize,
    pub warnings: usize,
    pub failed: usize,
    pub skipped: usize,
    pub aborted: usize,
}

impl PhaseSummary {
    fn new(phase: Phase) -> Self {
        Self {
            phase,
            total: 0,
            passed: 0,
            warnings: 0,
            failed: 0,
            skipped: 0,
            aborted: 0,
        }
    }

    fn add(&mut self, verdict: Verdict) {
        self.total += 1;
        match verdict {
            Verdict::Pass => self.passed += 1,
            Verdict::Warning => self.warnings += 1,
            Verdict::Fail | Verdict::Fatal => self.failed += 1,
            Verdict::Skipped => self.skipped += 1,
            Verdict::Aborted => self.aborted += 1,
        }
    }

    /// A phase in which nothing actually ran.
    pub fn all_skipped(&self) -> bool {
        self.total > 0 && self.skipped == self.total
    }
}

/// Tally results per phase, in phase order, omitting phases with no results.
pub fn summarize_phases(results: &[TestResult]) -> Vec<PhaseSummary> {
    Phase::ALL
        .iter()
        .filter_map(|&phase| {
            let mut summary = PhaseSummary::new(phase);
            for result in results.iter().filter(|r| r.phase == Some(phase)) {
                summary.add(result.verdict);
            }
            (summary.total > 0).then_some(summary)
        })
        .collect()
}

/// Worst verdict observed. Skipped results do not count, except that a phase in
/// which every case was skipped counts as a Warning. An empty run passes.
pub fn overall_verdict(results: &[TestResult]) -> Verdict {
    let worst = results
        .iter()
        .filter(|r| r.verdict != Verdict::Skipped)
        .fold(Verdict::Pass, |acc, r| acc.worst(r.verdict));

    if summarize_phases(results).iter().any(PhaseSummary::all_skipped) {
        worst.worst(Verdict::Warning)
    } else {
        worst
    }
}

/// Complete record of one conformance run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub category: DeviceCategory,
    pub transport: TransportKind,
    /// Address or driver id of the device under test
    pub device: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    pub verdict: Verdict,
    /// Number of cases the plan scheduled for this run
    pub scheduled: usize,
    pub results: Vec<TestResult>,
    pub phases: Vec<PhaseSummary>,
}

impl RunReport {
    /// Assemble a report and compute its verdict.
    pub fn new(
        category: DeviceCategory,
        transport: TransportKind,
        device: String,
        started_at: DateTime<Utc>,
        outcome: RunOutcome,
        scheduled: usize,
        results: Vec<TestResult>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            category,
            transport,
            device,
            started_at,
            ended_at: Utc::now(),
            outcome,
            verdict: overall_verdict(&results),
            scheduled,
            phases: summarize_phases(&results),
            results,
        }
    }

    /// Number of results with `verdict`.
    pub fn count(&self, verdict: Verdict) -> usize {
        self.results.iter().filter(|r| r.verdict == verdict).count()
    }

    /// Result recorded for `case_id`.
    pub fn result(&self, case_id: &str) -> Option<&TestResult> {
        self.results.iter().find(|r| r.case_id == case_id)
    }

    /// Pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write pretty JSON to `path`.
    pub fn write_json(&self, path: &Path) -> AppResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Markdown summary.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "# Conformance Report\n\n**Date**: {}\n**Device**: {} ({} over {})\n**Run**: {}\n\n",
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
            self.device,
            self.category,
            self.transport,
            self.run_id
        ));

        md.push_str("## Summary\n\n");
        md.push_str(&format!("- **Outcome**: {}\n", self.outcome.as_str()));
        md.push_str(&format!("- **Verdict**: {}\n", self.verdict));
        md.push_str(&format!(
            "- **Results**: {} of {} scheduled\n",
            self.results.len(),
            self.scheduled
        ));
        md.push_str(&format!(
            "- **Passed**: {}, **Warnings**: {}, **Failed**: {}, **Skipped**: {}\n",
            self.count(Verdict::Pass),
            self.count(Verdict::Warning),
            self.count(Verdict::Fail),
            self.count(Verdict::Skipped)
        ));
        let elapsed = self.ended_at.signed_duration_since(self.started_at);
        md.push_str(&format!(
            "- **Duration**: {:.3}s\n\n",
            elapsed.num_milliseconds().max(0) as f64 / 1000.0
        ));

        for summary in &self.phases {
            md.push_str(&format!("## {} ({} cases)\n\n", summary.phase, summary.total));
            if summary.all_skipped() {
                md.push_str("_Every case in this phase was skipped._\n\n");
            }
            for result in self.results.iter().filter(|r| r.phase == Some(summary.phase)) {
                md.push_str(&format!(
                    "- `{}` **{}** {}: {}\n",
                    result.verdict, result.case_name, result.case_id, result.message
                ));
            }
            md.push('\n');
        }

        let unphased: Vec<_> = self.results.iter().filter(|r| r.phase.is_none()).collect();
        if !unphased.is_empty() {
            md.push_str("## Run\n\n");
            for result in unphased {
                md.push_str(&format!(
                    "- `{}` **{}**: {}\n",
                    result.verdict, result.case_name, result.message
                ));
            }
            md.push('\n');
        }

        md
    }
}
