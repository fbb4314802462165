//! Focuser checks.

use crate::testing::{CheckContext, CheckOutcome, CheckResult, Phase, TestCase};

use super::wait_until;

/// Largest step a move check commands.
const TRIAL_MOVE: i32 = 1_000;

/// Focuser checks.
pub fn cases() -> Vec<TestCase> {
    vec![
        TestCase::new("absolute", "Read Absolute", Phase::Properties, absolute),
        TestCase::new("max_step", "Read MaxStep", Phase::Properties, max_step),
        TestCase::new("max_increment", "Read MaxIncrement", Phase::Properties, max_increment)
            .requires(&["max_step"]),
        TestCase::new("focuser_position", "Read Position", Phase::Properties, position)
            .requires(&["absolute", "max_step"]),
        TestCase::new("step_size", "Read StepSize", Phase::Properties, step_size),
        TestCase::new(
            "temp_comp_available",
            "Read TempCompAvailable",
            Phase::Properties,
            temp_comp_available,
        ),
        TestCase::new("temp_comp", "Read TempComp", Phase::Properties, temp_comp)
            .requires(&["temp_comp_available"]),
        TestCase::new("temperature", "Read Temperature", Phase::Properties, temperature),
        TestCase::new("is_moving", "IsMoving is false at rest", Phase::Properties, is_moving),
        TestCase::new("temp_comp_write", "Write TempComp", Phase::Methods, temp_comp_write)
            .requires(&["temp_comp_available", "temp_comp"]),
        TestCase::new("move", "Move and wait for completion", Phase::Methods, move_and_wait)
            .requires(&["focuser_position", "max_increment", "is_moving"])
            .moves_hardware(),
        TestCase::new("halt", "Halt stops a move", Phase::Methods, halt)
            .requires(&["focuser_position", "max_increment", "is_moving"])
            .moves_hardware(),
    ]
}

async fn absolute(ctx: CheckContext) -> CheckResult {
    let absolute = ctx.facade.focuser()?.absolute().await?;
    Ok(CheckOutcome::pass(if absolute { "absolute focuser" } else { "relative focuser" }))
}

async fn max_step(ctx: CheckContext) -> CheckResult {
    let max_step = ctx.facade.focuser()?.max_step().await?;
    if max_step > 0 {
        Ok(CheckOutcome::pass(format!("MaxStep {}", max_step)))
    } else {
        Ok(CheckOutcome::fail(format!("MaxStep {} must be positive", max_step)))
    }
}

async fn max_increment(ctx: CheckContext) -> CheckResult {
    let focuser = ctx.facade.focuser()?;
    let max_increment = focuser.max_increment().await?;
    let max_step = focuser.max_step().await?;
    if max_increment <= 0 {
        Ok(CheckOutcome::fail(format!("MaxIncrement {} must be positive", max_increment)))
    } else if max_increment > max_step {
        Ok(CheckOutcome::warning(format!(
            "MaxIncrement {} exceeds MaxStep {}",
            max_increment, max_step
        )))
    } else {
        Ok(CheckOutcome::pass(format!("MaxIncrement {}", max_increment)))
    }
}

async fn position(ctx: CheckContext) -> CheckResult {
    let focuser = ctx.facade.focuser()?;
    let absolute = focuser.absolute().await?;
    match focuser.position().await {
        // Relative focusers have no position
        Err(e) if !absolute && e.is_unsupported() => {
            Ok(CheckOutcome::pass("relative focuser reports Position as not implemented"))
        }
        Err(e) => Err(e.into()),
        Ok(position) if !absolute => Ok(CheckOutcome::warning(format!(
            "relative focuser reports Position {}",
            position
        ))),
        Ok(position) => {
            let max_step = focuser.max_step().await?;
            if (0..=max_step).contains(&position) {
                Ok(CheckOutcome::pass(format!("Position {}", position)))
            } else {
                Ok(CheckOutcome::fail(format!(
                    "Position {} is outside 0..={}",
                    position, max_step
                )))
            }
        }
    }
}

async fn step_size(ctx: CheckContext) -> CheckResult {
    let step_size = ctx.facade.focuser()?.step_size().await?;
    if step_size > 0.0 {
        Ok(CheckOutcome::pass(format!("StepSize {} microns", step_size)))
    } else {
        Ok(CheckOutcome::fail(format!("StepSize {} must be positive", step_size)))
    }
}

async fn temp_comp_available(ctx: CheckContext) -> CheckResult {
    let available = ctx.facade.focuser()?.temp_comp_available().await?;
    Ok(CheckOutcome::pass(format!("TempCompAvailable {}", available)))
}

async fn temp_comp(ctx: CheckContext) -> CheckResult {
    let focuser = ctx.facade.focuser()?;
    let available = focuser.temp_comp_available().await?;
    let enabled = focuser.temp_comp().await?;
    if enabled && !available {
        Ok(CheckOutcome::fail("TempComp is true but TempCompAvailable is false"))
    } else {
        Ok(CheckOutcome::pass(format!("TempComp {}", enabled)))
    }
}

async fn temperature(ctx: CheckContext) -> CheckResult {
    let temperature = ctx.facade.focuser()?.temperature().await?;
    if (-50.0..=100.0).contains(&temperature) {
        Ok(CheckOutcome::pass(format!("{:.1} C", temperature)))
    } else {
        Ok(CheckOutcome::warning(format!("implausible temperature {:.1} C", temperature)))
    }
}

async fn is_moving(ctx: CheckContext) -> CheckResult {
    if ctx.facade.focuser()?.is_moving().await? {
        Ok(CheckOutcome::fail("IsMoving is true before any move was commanded"))
    } else {
        Ok(CheckOutcome::pass("not moving"))
    }
}

async fn temp_comp_write(ctx: CheckContext) -> CheckResult {
    let focuser = ctx.facade.focuser()?;
    let available = focuser.temp_comp_available().await?;
    let original = focuser.temp_comp().await?;

    if !available {
        return match focuser.set_temp_comp(true).await {
            Ok(()) => Ok(CheckOutcome::fail(
                "TempComp accepted true although TempCompAvailable is false",
            )),
            Err(e) if e.is_unsupported() => Ok(CheckOutcome::pass("TempComp write not implemented")),
            Err(e) => Err(e.into()),
        };
    }

    focuser.set_temp_comp(!original).await?;
    let toggled = focuser.temp_comp().await?;
    focuser.set_temp_comp(original).await?;
    let restored = focuser.temp_comp().await?;

    if toggled != !original {
        Ok(CheckOutcome::fail(format!("TempComp read {} after writing {}", toggled, !original)))
    } else if restored != original {
        Ok(CheckOutcome::fail(format!("TempComp read {} after restoring {}", restored, original)))
    } else {
        Ok(CheckOutcome::pass("TempComp toggled and restored"))
    }
}

/// Move `step` away from `position`, forward when that stays inside
/// `0..=max_step`, otherwise backward. The result is always inside the range,
/// whatever the device reported.
fn step_from(position: i32, step: i32, max_step: i32) -> i32 {
    let max_step = max_step.max(0);
    let step = step.max(1);
    match position.checked_add(step) {
        Some(forward) if (0..=max_step).contains(&forward) => forward,
        _ => position.saturating_sub(step).clamp(0, max_step),
    }
}

/// Target a short move away from `position`.
fn trial_target(position: i32, max_step: i32, max_increment: i32) -> i32 {
    step_from(position, TRIAL_MOVE.min(max_increment), max_step)
}

async fn move_and_wait(ctx: CheckContext) -> CheckResult {
    let focuser = ctx.facade.focuser()?;
    let start = focuser.position().await?;
    let target = trial_target(start, focuser.max_step().await?, focuser.max_increment().await?);

    focuser.move_to(target).await?;
    let elapsed = wait_until(&ctx.run, "IsMoving", move || async move {
        focuser.is_moving().await.map(|moving| !moving)
    })
    .await?;

    let reached = focuser.position().await?;
    if reached == target {
        Ok(CheckOutcome::pass(format!(
            "moved {} -> {} in {:.1}s",
            start,
            target,
            elapsed.as_secs_f64()
        )))
    } else {
        Ok(CheckOutcome::fail(format!(
            "commanded {} but stopped at {}",
            target, reached
        )))
    }
}

async fn halt(ctx: CheckContext) -> CheckResult {
    let focuser = ctx.facade.focuser()?;
    let start = focuser.position().await?;
    let max_step = focuser.max_step().await?;
    let max_increment = focuser.max_increment().await?;
    // Travel as far as allowed so the move is still running when Halt arrives
    let target = step_from(start, max_increment, max_step);

    focuser.move_to(target).await?;
    focuser.halt().await?;
    wait_until(&ctx.run, "IsMoving", move || async move {
        focuser.is_moving().await.map(|moving| !moving)
    })
    .await?;

    let stopped = focuser.position().await?;
    if stopped == target {
        Ok(CheckOutcome::warning(format!(
            "move to {} completed before Halt took effect",
            target
        )))
    } else {
        Ok(CheckOutcome::pass(format!("halted at {} on the way to {}", stopped, target)))
    }
}
