//! Test case model, result model and result sinks.
//!
//! - `TestCase`: one named check against a facade, with prerequisite ids
//! - `TestPlan`: the ordered, validated set of cases for one device category
//! - `TestResult`: the verdict recorded for one case in one run
//! - `RunReport` (see [`report`]): ordered results plus the overall verdict
//! - `ResultSink` (see [`sink`]): where results are streamed as they are produced

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::config::RunSettings;
use crate::core::DeviceCategory;
use crate::error::{CheckError, ConformError, ErrorKind};
use crate::facade::DeviceFacade;

/// Run reports.
pub mod report;
/// Result sinks.
pub mod sink;

pub use report::{PhaseSummary, RunOutcome, RunReport};
pub use sink::{ChannelSink, FanoutSink, MemorySink, ResultSink, TracingSink};

/// Fixed, ordered groups of test cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Members common to every interface: identity, versions, supported actions
    Capabilities,
    /// Category-specific property reads
    Properties,
    /// Property writes, motion, actions and expected-error probes
    Methods,
    /// Connect/disconnect round trips
    StateTransitions,
}

impl Phase {
    /// Every phase, in execution order.
    pub const ALL: [Phase; 4] = [
        Phase::Capabilities,
        Phase::Properties,
        Phase::Methods,
        Phase::StateTransitions,
    ];

    /// Name used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Capabilities => "Capabilities",
            Phase::Properties => "Properties",
            Phase::Methods => "Methods",
            Phase::StateTransitions => "StateTransitions",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a single check, or of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    /// Behaved as the interface requires.
    Pass,
    /// Allowed but noteworthy, e.g. an unsupported optional member.
    Warning,
    /// Violated the interface.
    Fail,
    /// Not run because a prerequisite did not pass.
    Skipped,
    /// Interrupted by cancellation.
    Aborted,
    /// The run could not continue (connection failure or harness defect)
    Fatal,
}

impl Verdict {
    /// Ordering used for the overall verdict. Skipped ranks below Pass so it never
    /// worsens a run on its own.
    pub fn severity(&self) -> u8 {
        match self {
            Verdict::Skipped => 0,
            Verdict::Pass => 1,
            Verdict::Warning => 2,
            Verdict::Fail => 3,
            Verdict::Aborted => 4,
            Verdict::Fatal => 5,
        }
    }

    /// The more severe of the two.
    pub fn worst(self, other: Verdict) -> Verdict {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    /// Name used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Warning => "WARNING",
            Verdict::Fail => "FAIL",
            Verdict::Skipped => "SKIPPED",
            Verdict::Aborted => "ABORTED",
            Verdict::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome a check reports when it ran to completion.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// Check passed.
    Pass(String),
    /// Check passed with a reservation.
    Warning(String),
    /// Check failed.
    Fail(String),
}

impl CheckOutcome {
    /// Passing outcome.
    pub fn pass(message: impl Into<String>) -> Self {
        CheckOutcome::Pass(message.into())
    }

    /// Warning outcome.
    pub fn warning(message: impl Into<String>) -> Self {
        CheckOutcome::Warning(message.into())
    }

    /// Failing outcome.
    pub fn fail(message: impl Into<String>) -> Self {
        CheckOutcome::Fail(message.into())
    }

    /// Verdict this outcome records.
    pub fn verdict(&self) -> Verdict {
        match self {
            CheckOutcome::Pass(_) => Verdict::Pass,
            CheckOutcome::Warning(_) => Verdict::Warning,
            CheckOutcome::Fail(_) => Verdict::Fail,
        }
    }

    /// Diagnostic text.
    pub fn into_message(self) -> String {
        match self {
            CheckOutcome::Pass(m) | CheckOutcome::Warning(m) | CheckOutcome::Fail(m) => m,
        }
    }
}

/// What a check returns.
pub type CheckResult = Result<CheckOutcome, CheckError>;

type CheckFn = Arc<dyn Fn(CheckContext) -> BoxFuture<'static, CheckResult> + Send + Sync>;

/// Everything a check may touch while it runs.
#[derive(Clone)]
pub struct CheckContext {
    pub facade: DeviceFacade,
    pub run: Arc<RunSettings>,
}

/// Immutable descriptor of one conformance check.
#[derive(Clone)]
pub struct TestCase {
    pub id: String,
    pub name: String,
    pub phase: Phase,
    pub prerequisites: BTreeSet<String>,
    /// Set for cases that command motion; dropped from the schedule when moves are disabled
    pub moves_hardware: bool,
    check: CheckFn,
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("prerequisites", &self.prerequisites)
            .field("moves_hardware", &self.moves_hardware)
            .finish_non_exhaustive()
    }
}

impl TestCase {
    /// Case running `check`.
    pub fn new<F, Fut>(id: impl Into<String>, name: impl Into<String>, phase: Phase, check: F) -> Self
    where
        F: Fn(CheckContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CheckResult> + Send + 'static,
    {
        Self {
            id: id.into(),
            name: name.into(),
            phase,
            prerequisites: BTreeSet::new(),
            moves_hardware: false,
            check: Arc::new(move |ctx| check(ctx).boxed()),
        }
    }

    /// Declare cases that must not have failed for this one to run.
    pub fn requires(mut self, ids: &[&str]) -> Self {
        self.prerequisites
            .extend(ids.iter().map(|id| id.to_string()));
        self
    }

    /// Mark the case as moving hardware, so it can be excluded.
    pub fn moves_hardware(mut self) -> Self {
        self.moves_hardware = true;
        self
    }

    /// Start the check.
    pub fn run(&self, ctx: CheckContext) -> BoxFuture<'static, CheckResult> {
        (self.check)(ctx)
    }
}

/// Ordered, dependency-aware checks for one device category.
#[derive(Debug, Clone)]
pub struct TestPlan {
    pub category: DeviceCategory,
    cases: Vec<TestCase>,
}

impl TestPlan {
    /// Build a plan, rejecting duplicate ids and prerequisites that do not name an
    /// earlier case.
    pub fn new(category: DeviceCategory, mut cases: Vec<TestCase>) -> Result<Self, ConformError> {
        // Phases run in fixed order; declaration order is kept within a phase.
        cases.sort_by_key(|c| c.phase);

        let mut seen: HashSet<&str> = HashSet::new();
        for case in &cases {
            for prerequisite in &case.prerequisites {
                if !seen.contains(prerequisite.as_str()) {
                    return Err(ConformError::InvalidPlan(format!(
                        "case '{}' requires '{}', which is not declared before it",
                        case.id, prerequisite
                    )));
                }
            }
            if !seen.insert(case.id.as_str()) {
                return Err(ConformError::InvalidPlan(format!(
                    "duplicate case id '{}'",
                    case.id
                )));
            }
        }

        Ok(Self { category, cases })
    }

    /// Cases in plan order.
    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    /// Number of cases.
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// True for a plan without cases.
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Cases that will run under the given options, in execution order.
    pub fn scheduled(&self, run: &RunSettings) -> Vec<&TestCase> {
        self.cases
            .iter()
            .filter(|c| run.includes(c.phase))
            .filter(|c| run.allow_moves || !c.moves_hardware)
            .collect()
    }
}

/// Verdict recorded for one test case in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub case_id: String,
    pub case_name: String,
    /// `None` for entries produced outside a phase (connection failure)
    pub phase: Option<Phase>,
    pub verdict: Verdict,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

impl TestResult {
    /// Result for `case`, stamped now.
    pub fn new(case: &TestCase, verdict: Verdict, message: impl Into<String>) -> Self {
        Self {
            case_id: case.id.clone(),
            case_name: case.name.clone(),
            phase: Some(case.phase),
            verdict,
            message: message.into(),
            error_kind: None,
            timestamp: Utc::now(),
            duration_ms: 0,
        }
    }

    /// Entry that is not tied to a scheduled case, such as a failed connection.
    pub fn unscheduled(
        case_id: impl Into<String>,
        case_name: impl Into<String>,
        verdict: Verdict,
        message: impl Into<String>,
    ) -> Self {
        Self {
            case_id: case_id.into(),
            case_name: case_name.into(),
            phase: None,
            verdict,
            message: message.into(),
            error_kind: None,
            timestamp: Utc::now(),
            duration_ms: 0,
        }
    }

    /// Attach the error kind that produced the verdict.
    pub fn with_error_kind(mut self, kind: ErrorKind) -> Self {
        self.error_kind = Some(kind);
        self
    }

    /// Attach how long the case took.
    pub fn with_duration(mut self, duration: std::time::Duration) -> Self {
        self.duration_ms = duration.as_millis().min(u64::MAX as u128) as u64;
        self
    }
}
