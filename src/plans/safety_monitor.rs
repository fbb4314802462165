//! SafetyMonitor checks.

use crate::testing::{CheckContext, CheckOutcome, CheckResult, Phase, TestCase};

/// SafetyMonitor checks.
pub fn cases() -> Vec<TestCase> {
    vec![
        TestCase::new("is_safe", "Read IsSafe", Phase::Properties, is_safe),
        TestCase::new(
            "is_safe_disconnected",
            "IsSafe is false while disconnected",
            Phase::StateTransitions,
            is_safe_disconnected,
        )
        .requires(&["is_safe", "connect_cycle"]),
    ]
}

async fn is_safe(ctx: CheckContext) -> CheckResult {
    let safe = ctx.facade.safety_monitor()?.is_safe().await?;
    Ok(CheckOutcome::pass(if safe { "safe" } else { "unsafe" }))
}

async fn is_safe_disconnected(ctx: CheckContext) -> CheckResult {
    let monitor = ctx.facade.safety_monitor()?;
    monitor.common().set_connected(false).await?;
    let while_disconnected = monitor.is_safe().await;
    monitor.common().set_connected(true).await?;

    match while_disconnected {
        Ok(false) => Ok(CheckOutcome::pass("IsSafe is false while disconnected")),
        Ok(true) => Ok(CheckOutcome::fail("IsSafe is true while disconnected")),
        Err(e) => Ok(CheckOutcome::fail(format!(
            "IsSafe raised {} while disconnected instead of returning false",
            e
        ))),
    }
}
