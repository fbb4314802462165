//! FilterWheel checks.

use crate::error::{ErrorKind, FacadeError};
use crate::facade::FilterWheelFacade;
use crate::testing::{CheckContext, CheckOutcome, CheckResult, Phase, TestCase};

use super::wait_until;

/// FilterWheel checks.
pub fn cases() -> Vec<TestCase> {
    vec![
        TestCase::new("focus_offsets", "Read FocusOffsets", Phase::Properties, focus_offsets),
        TestCase::new("names", "Read Names", Phase::Properties, names).requires(&["focus_offsets"]),
        TestCase::new("position", "Read Position", Phase::Properties, position).requires(&["names"]),
        TestCase::new(
            "move_to_each_slot",
            "Move to every slot",
            Phase::Methods,
            move_to_each_slot,
        )
        .requires(&["names", "position"])
        .moves_hardware(),
        TestCase::new(
            "position_out_of_range",
            "Reject out of range Position",
            Phase::Methods,
            position_out_of_range,
        )
        .requires(&["names"]),
    ]
}

/// Slots are addressed by a 16-bit Position, so more names than that cannot be reached.
fn slot_count(names: &[String]) -> Result<i16, FacadeError> {
    i16::try_from(names.len()).map_err(|_| {
        FacadeError::invalid_response(
            "Names",
            format!("{} slots cannot be addressed by a 16-bit Position", names.len()),
        )
    })
}

async fn read_slots(wheel: &FilterWheelFacade) -> Result<i16, FacadeError> {
    slot_count(&wheel.names().await?)
}

async fn focus_offsets(ctx: CheckContext) -> CheckResult {
    let offsets = ctx.facade.filter_wheel()?.focus_offsets().await?;
    if offsets.is_empty() {
        return Ok(CheckOutcome::fail("FocusOffsets is empty"));
    }
    Ok(CheckOutcome::pass(format!("{} offsets: {:?}", offsets.len(), offsets)))
}

async fn names(ctx: CheckContext) -> CheckResult {
    let wheel = ctx.facade.filter_wheel()?;
    let names = wheel.names().await?;
    slot_count(&names)?;
    let offsets = wheel.focus_offsets().await?;
    if names.len() != offsets.len() {
        return Ok(CheckOutcome::fail(format!(
            "{} names but {} focus offsets",
            names.len(),
            offsets.len()
        )));
    }
    if let Some(slot) = names.iter().position(|n| n.trim().is_empty()) {
        return Ok(CheckOutcome::warning(format!("slot {} has an empty name", slot)));
    }
    Ok(CheckOutcome::pass(names.join(", ")))
}

async fn position(ctx: CheckContext) -> CheckResult {
    let wheel = ctx.facade.filter_wheel()?;
    let slots = read_slots(wheel).await?;
    let position = wheel.position().await?;
    match position {
        -1 => Ok(CheckOutcome::pass("wheel is moving (-1)")),
        p if (0..slots).contains(&p) => Ok(CheckOutcome::pass(format!("at slot {}", p))),
        p => Ok(CheckOutcome::fail(format!(
            "Position {} is outside -1..={}",
            p,
            slots - 1
        ))),
    }
}

async fn move_to_each_slot(ctx: CheckContext) -> CheckResult {
    let wheel = ctx.facade.filter_wheel()?;
    let slots = read_slots(wheel).await?;
    let mut timings = Vec::with_capacity(slots as usize);

    for slot in 0..slots {
        wheel.set_position(slot).await?;
        let elapsed = wait_until(&ctx.run, "Position", move || async move {
            wheel.position().await.map(|p| p != -1)
        })
        .await?;
        let reached = wheel.position().await?;
        if reached != slot {
            return Ok(CheckOutcome::fail(format!(
                "commanded slot {} but the wheel stopped at {}",
                slot, reached
            )));
        }
        timings.push(format!("{}: {:.1}s", slot, elapsed.as_secs_f64()));
    }
    Ok(CheckOutcome::pass(format!("reached every slot ({})", timings.join(", "))))
}

async fn position_out_of_range(ctx: CheckContext) -> CheckResult {
    let wheel = ctx.facade.filter_wheel()?;
    let slots = read_slots(wheel).await?;
    match wheel.set_position(slots).await {
        Ok(()) => Ok(CheckOutcome::fail(format!(
            "Position {} was accepted with only {} slots",
            slots, slots
        ))),
        Err(e) if e.kind == ErrorKind::InvalidValue => {
            Ok(CheckOutcome::pass(format!("Position {} rejected", slots)))
        }
        Err(e) if e.is_unsupported() => Err(e.into()),
        Err(e) => Ok(CheckOutcome::fail(format!(
            "Position {} raised {} instead of InvalidValue",
            slots, e
        ))),
    }
}
