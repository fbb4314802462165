//! Checks for the members every device interface shares.

use crate::error::ErrorKind;
use crate::testing::{CheckContext, CheckOutcome, CheckResult, Phase, TestCase};

/// Action name no driver is expected to implement.
pub const UNKNOWN_ACTION: &str = "Conform:NoSuchAction";

const DESCRIPTIVE: [(&str, &str, &str); 4] = [
    ("name", "Name", "Read Name"),
    ("description", "Description", "Read Description"),
    ("driver_info", "DriverInfo", "Read DriverInfo"),
    ("driver_version", "DriverVersion", "Read DriverVersion"),
];

/// Checks every device interface shares.
pub fn cases() -> Vec<TestCase> {
    let mut cases = vec![
        TestCase::new("connected", "Connected reads true", Phase::Capabilities, connected),
        TestCase::new(
            "interface_version",
            "Read InterfaceVersion",
            Phase::Capabilities,
            interface_version,
        ),
    ];
    for (id, member, title) in DESCRIPTIVE {
        cases.push(TestCase::new(id, title, Phase::Capabilities, move |ctx| {
            non_empty_string(ctx, member)
        }));
    }
    cases.push(TestCase::new(
        "supported_actions",
        "Read SupportedActions",
        Phase::Capabilities,
        supported_actions,
    ));
    cases.push(TestCase::new(
        "action_unknown",
        "Unknown Action is rejected",
        Phase::Methods,
        action_unknown,
    ));
    cases.push(
        TestCase::new(
            "connect_cycle",
            "Disconnect and reconnect",
            Phase::StateTransitions,
            connect_cycle,
        )
        .requires(&["connected"]),
    );
    cases
}

async fn connected(ctx: CheckContext) -> CheckResult {
    if ctx.facade.common().connected().await? {
        Ok(CheckOutcome::pass("Connected is true"))
    } else {
        Ok(CheckOutcome::fail("Connected is false after connecting"))
    }
}

async fn interface_version(ctx: CheckContext) -> CheckResult {
    let version = ctx.facade.common().interface_version().await?;
    if version >= 1 {
        Ok(CheckOutcome::pass(format!("InterfaceVersion {}", version)))
    } else {
        Ok(CheckOutcome::fail(format!(
            "InterfaceVersion {} is not a valid interface version",
            version
        )))
    }
}

async fn non_empty_string(ctx: CheckContext, member: &'static str) -> CheckResult {
    let value = ctx.facade.common().get_string(member).await?;
    if value.trim().is_empty() {
        Ok(CheckOutcome::warning(format!("{} is empty", member)))
    } else {
        Ok(CheckOutcome::pass(value))
    }
}

async fn supported_actions(ctx: CheckContext) -> CheckResult {
    let actions = ctx.facade.common().supported_actions().await?;
    if actions.iter().any(|a| a.trim().is_empty()) {
        return Ok(CheckOutcome::fail("SupportedActions contains an empty name"));
    }
    if actions.is_empty() {
        Ok(CheckOutcome::pass("no actions supported"))
    } else {
        Ok(CheckOutcome::pass(format!("{} action(s): {}", actions.len(), actions.join(", "))))
    }
}

async fn action_unknown(ctx: CheckContext) -> CheckResult {
    match ctx.facade.common().action(UNKNOWN_ACTION, "").await {
        Ok(reply) => Ok(CheckOutcome::fail(format!(
            "Action '{}' succeeded with '{}'",
            UNKNOWN_ACTION, reply
        ))),
        Err(e) if e.kind == ErrorKind::Unsupported => {
            Ok(CheckOutcome::pass("unknown action rejected as not implemented"))
        }
        Err(e) => Ok(CheckOutcome::fail(format!(
            "unknown action raised {} instead of ActionNotImplemented",
            e
        ))),
    }
}

async fn connect_cycle(ctx: CheckContext) -> CheckResult {
    let common = ctx.facade.common();
    common.set_connected(false).await?;
    let after_disconnect = common.connected().await?;
    common.set_connected(true).await?;
    let after_reconnect = common.connected().await?;

    match (after_disconnect, after_reconnect) {
        (false, true) => Ok(CheckOutcome::pass("Connected followed false then true")),
        (true, _) => Ok(CheckOutcome::fail("Connected still true after disconnecting")),
        (false, false) => Ok(CheckOutcome::fail("Connected still false after reconnecting")),
    }
}
