//! Built-in test plans, one per device category.
//!
//! Every plan starts with the checks shared by all device interfaces
//! ([`common`]) and adds its category's property and method checks. Case ids are
//! stable and unique within a plan; prerequisites refer to them.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::config::RunSettings;
use crate::core::DeviceCategory;
use crate::error::{CheckError, ConformError, ErrorKind, FacadeError};
use crate::testing::{Phase, TestCase, TestPlan};

/// Checks shared by every category.
pub mod common;
/// FilterWheel checks.
pub mod filter_wheel;
/// Focuser checks.
pub mod focuser;
/// SafetyMonitor checks.
pub mod safety_monitor;

/// The conformance plan for a device category.
pub fn plan_for(category: DeviceCategory) -> Result<TestPlan, ConformError> {
    let specific = match category {
        DeviceCategory::FilterWheel => filter_wheel::cases(),
        DeviceCategory::Focuser => focuser::cases(),
        DeviceCategory::SafetyMonitor => safety_monitor::cases(),
    };
    let mut cases: Vec<TestCase> = common::cases();
    cases.extend(specific);
    TestPlan::new(category, cases)
}

/// Plain-text listing of a plan, one case per line.
pub fn describe(plan: &TestPlan) -> String {
    let mut out = String::new();
    let mut phase: Option<Phase> = None;
    for case in plan.cases() {
        if phase != Some(case.phase) {
            phase = Some(case.phase);
            out.push_str(&format!("{}\n", case.phase));
        }
        out.push_str(&format!("  {:<28} {}", case.id, case.name));
        if !case.prerequisites.is_empty() {
            let prerequisites: Vec<&str> = case.prerequisites.iter().map(String::as_str).collect();
            out.push_str(&format!(" (after {})", prerequisites.join(", ")));
        }
        if case.moves_hardware {
            out.push_str(" [moves]");
        }
        out.push('\n');
    }
    out
}

/// Poll `done` every `poll_interval` until it reports true or `move_timeout` elapses.
pub(crate) async fn wait_until<F, Fut>(
    run: &RunSettings,
    member: &str,
    mut done: F,
) -> Result<Duration, CheckError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, FacadeError>>,
{
    let started = Instant::now();
    loop {
        if done().await? {
            return Ok(started.elapsed());
        }
        if started.elapsed() >= run.move_timeout() {
            return Err(FacadeError::new(
                ErrorKind::Timeout,
                member,
                format!("motion did not complete within {:?}", run.move_timeout()),
            )
            .into());
        }
        tokio::time::sleep(run.poll_interval()).await;
    }
}
