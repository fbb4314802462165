//! Orchestrator behaviour against stub driver handles.
//!
//! The stub answers from a table of member values, counts every call and every
//! release, and can be told to report members as not implemented or to never
//! answer at all.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use rust_conform::config::ConformSettings;
use rust_conform::core::{Argument, DeviceCategory, DeviceValue, TransportKind};
use rust_conform::driver::{codes, Connector, DriverHandle, TransportError};
use rust_conform::error::{CheckError, ErrorKind};
use rust_conform::plans::plan_for;
use rust_conform::testing::{
    ChannelSink, CheckContext, CheckOutcome, MemorySink, Phase, RunOutcome, TestCase, TestPlan,
    Verdict,
};
use rust_conform::{ConformanceTestManager, RunState};

// =============================================================================
// Stub device
// =============================================================================

#[derive(Default)]
struct StubDevice {
    values: Mutex<HashMap<String, DeviceValue>>,
    limits: HashMap<String, (i64, i64)>,
    unsupported: HashSet<String>,
    hangs: HashSet<String>,
    calls: Mutex<HashMap<String, usize>>,
    releases: AtomicUsize,
}

impl StubDevice {
    fn new() -> Self {
        Self::default()
    }

    /// Well-formed four slot filter wheel.
    fn filter_wheel() -> Self {
        Self::new()
            .with("Connected", false)
            .with("Description", "Stub filter wheel")
            .with("DriverInfo", "stub")
            .with("DriverVersion", "1.0")
            .with("InterfaceVersion", 2)
            .with("Name", "Stub")
            .with("SupportedActions", DeviceValue::Array(vec![]))
            .with("FocusOffsets", vec![0, 10, 20, 30])
            .with(
                "Names",
                vec![
                    "L".to_string(),
                    "R".to_string(),
                    "G".to_string(),
                    "B".to_string(),
                ],
            )
            .with("Position", 0)
            .limit("Position", 0, 3)
    }

    fn with(self, member: &str, value: impl Into<DeviceValue>) -> Self {
        self.values
            .lock()
            .insert(member.to_ascii_lowercase(), value.into());
        self
    }

    fn limit(mut self, member: &str, low: i64, high: i64) -> Self {
        self.limits.insert(member.to_ascii_lowercase(), (low, high));
        self
    }

    fn unsupported(mut self, member: &str) -> Self {
        self.unsupported.insert(member.to_ascii_lowercase());
        self
    }

    fn hangs(mut self, member: &str) -> Self {
        self.hangs.insert(member.to_ascii_lowercase());
        self
    }

    fn calls(&self, member: &str) -> usize {
        self.calls
            .lock()
            .get(&member.to_ascii_lowercase())
            .copied()
            .unwrap_or(0)
    }

    fn value(&self, member: &str) -> Option<DeviceValue> {
        self.values.lock().get(&member.to_ascii_lowercase()).cloned()
    }

    fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    async fn enter(&self, member: &str) -> Result<String, TransportError> {
        let key = member.to_ascii_lowercase();
        *self.calls.lock().entry(key.clone()).or_insert(0) += 1;
        if self.hangs.contains(&key) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.unsupported.contains(&key) {
            return Err(TransportError::Device {
                code: codes::NOT_IMPLEMENTED,
                message: format!("{} is not implemented", member),
            });
        }
        Ok(key)
    }
}

#[async_trait]
impl DriverHandle for StubDevice {
    fn transport(&self) -> TransportKind {
        TransportKind::NetworkProtocol
    }

    fn describe(&self) -> String {
        "stub".to_string()
    }

    async fn get(&self, member: &str, _args: &[Argument]) -> Result<DeviceValue, TransportError> {
        let key = self.enter(member).await?;
        self.values
            .lock()
            .get(&key)
            .cloned()
            .ok_or_else(|| TransportError::Device {
                code: codes::NOT_IMPLEMENTED,
                message: format!("{} is not implemented", member),
            })
    }

    async fn put(&self, member: &str, args: &[Argument]) -> Result<DeviceValue, TransportError> {
        let key = self.enter(member).await?;
        if key == "action" {
            return Err(TransportError::Device {
                code: codes::ACTION_NOT_IMPLEMENTED,
                message: "no such action".to_string(),
            });
        }
        if let Some(arg) = args.first() {
            if let (Some((low, high)), Some(v)) = (self.limits.get(&key), arg.value.as_i64()) {
                if v < *low || v > *high {
                    return Err(TransportError::Device {
                        code: codes::INVALID_VALUE,
                        message: format!("{} is outside {}..={}", v, low, high),
                    });
                }
            }
            self.values.lock().insert(key, arg.value.clone());
        }
        Ok(DeviceValue::Null)
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

struct StubConnector {
    device: Arc<StubDevice>,
    fail: bool,
    opens: AtomicUsize,
}

impl StubConnector {
    fn new(device: Arc<StubDevice>) -> Arc<Self> {
        Arc::new(Self {
            device,
            fail: false,
            opens: AtomicUsize::new(0),
        })
    }

    fn failing(device: Arc<StubDevice>) -> Arc<Self> {
        Arc::new(Self {
            device,
            fail: true,
            opens: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Connector for StubConnector {
    async fn open(&self, _settings: &ConformSettings) -> Result<Arc<dyn DriverHandle>, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(TransportError::Connect("connection refused".to_string()));
        }
        let handle: Arc<dyn DriverHandle> = self.device.clone();
        Ok(handle)
    }
}

fn settings(category: DeviceCategory) -> ConformSettings {
    let mut settings = ConformSettings::default();
    settings.device.category = category;
    settings.device.transport = TransportKind::NetworkProtocol;
    settings.run.call_timeout_ms = 2_000;
    settings.run.case_timeout_ms = 5_000;
    settings.run.move_timeout_ms = 2_000;
    settings.run.poll_interval_ms = 10;
    settings
}

fn build(
    settings: ConformSettings,
    connector: Arc<StubConnector>,
    cancel: CancellationToken,
) -> (ConformanceTestManager, MemorySink) {
    let sink = MemorySink::new();
    let manager = ConformanceTestManager::new(settings, Arc::new(sink.clone()), cancel)
        .with_connector(connector);
    (manager, sink)
}

fn pass_case(id: &str) -> TestCase {
    TestCase::new(id, id, Phase::Properties, |_ctx: CheckContext| async {
        Ok::<_, CheckError>(CheckOutcome::pass("ok"))
    })
}

fn read_case(id: &str, member: &'static str) -> TestCase {
    TestCase::new(id, id, Phase::Properties, move |ctx: CheckContext| async move {
        let value = ctx.facade.common().get(member).await?;
        Ok::<_, CheckError>(CheckOutcome::pass(value.to_string()))
    })
}

// =============================================================================
// Result count and scenario runs
// =============================================================================

#[tokio::test]
async fn test_filter_wheel_network_stub_passes() {
    let device = Arc::new(StubDevice::filter_wheel());
    let (mut manager, sink) = build(
        settings(DeviceCategory::FilterWheel),
        StubConnector::new(device.clone()),
        CancellationToken::new(),
    );

    let report = manager.run_conformance_test().await.unwrap();
    let plan = plan_for(DeviceCategory::FilterWheel).unwrap();

    assert_eq!(report.verdict, Verdict::Pass, "{}", report.to_markdown());
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.results.len(), plan.len());
    assert_eq!(report.scheduled, plan.len());
    assert_eq!(sink.len(), plan.len());
    assert_eq!(manager.state(), RunState::Completed);

    // Finalizing disconnected the device but the handle is kept until disposal
    assert_eq!(device.value("Connected"), Some(DeviceValue::Bool(false)));
    assert_eq!(device.releases(), 0);
    manager.dispose();
    manager.dispose();
    drop(manager);
    assert_eq!(device.releases(), 1);
}

#[tokio::test]
async fn test_out_of_range_position_fails_only_that_case() {
    let device = Arc::new(StubDevice::filter_wheel().with("Position", 7));
    let (mut manager, _) = build(
        settings(DeviceCategory::FilterWheel),
        StubConnector::new(device.clone()),
        CancellationToken::new(),
    );

    let report = manager.run_conformance_test().await.unwrap();
    let plan = plan_for(DeviceCategory::FilterWheel).unwrap();

    assert_eq!(report.verdict, Verdict::Fail);
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.results.len(), plan.len());
    assert_eq!(report.result("position").unwrap().verdict, Verdict::Fail);
    assert_eq!(report.result("focus_offsets").unwrap().verdict, Verdict::Pass);
    assert_eq!(report.result("names").unwrap().verdict, Verdict::Pass);
    assert_eq!(report.result("position_out_of_range").unwrap().verdict, Verdict::Pass);
    assert_eq!(report.result("connect_cycle").unwrap().verdict, Verdict::Pass);
    // Depends on the failed read
    assert_eq!(report.result("move_to_each_slot").unwrap().verdict, Verdict::Skipped);
}

#[tokio::test]
async fn test_phase_selection_limits_schedule() {
    let device = Arc::new(StubDevice::filter_wheel());
    let mut settings = settings(DeviceCategory::FilterWheel);
    settings.run.phases = vec![Phase::Capabilities];
    let (mut manager, _) = build(settings, StubConnector::new(device.clone()), CancellationToken::new());

    let report = manager.run_conformance_test().await.unwrap();
    assert!(report.results.iter().all(|r| r.phase == Some(Phase::Capabilities)));
    assert_eq!(report.results.len(), report.scheduled);
    assert_eq!(device.calls("Names"), 0);
}

// =============================================================================
// Prerequisites
// =============================================================================

#[tokio::test]
async fn test_failed_prerequisite_skips_without_invoking() {
    let invoked = Arc::new(AtomicUsize::new(0));
    let counter = invoked.clone();
    let plan = TestPlan::new(
        DeviceCategory::FilterWheel,
        vec![
            TestCase::new("a", "fails", Phase::Properties, |_ctx: CheckContext| async {
                Ok::<_, CheckError>(CheckOutcome::fail("broken"))
            }),
            TestCase::new("b", "depends on a", Phase::Properties, move |_ctx: CheckContext| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, CheckError>(CheckOutcome::pass("ran"))
                }
            })
            .requires(&["a"]),
            pass_case("c").requires(&["b"]),
            pass_case("d"),
        ],
    )
    .unwrap();

    let device = Arc::new(StubDevice::filter_wheel());
    let (manager, _) = build(
        settings(DeviceCategory::FilterWheel),
        StubConnector::new(device),
        CancellationToken::new(),
    );
    let mut manager = manager.with_plan(plan);
    let report = manager.run_conformance_test().await.unwrap();

    assert_eq!(invoked.load(Ordering::SeqCst), 0);
    let b = report.result("b").unwrap();
    assert_eq!(b.verdict, Verdict::Skipped);
    assert_eq!(b.error_kind, Some(ErrorKind::PrerequisiteNotMet));
    assert_eq!(report.result("c").unwrap().verdict, Verdict::Skipped);
    assert_eq!(report.result("d").unwrap().verdict, Verdict::Pass);
    assert_eq!(report.results.len(), 4);
    assert_eq!(report.verdict, Verdict::Fail);
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancel_before_run_aborts_without_connecting() {
    let device = Arc::new(StubDevice::filter_wheel());
    let connector = StubConnector::new(device.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();
    cancel.cancel();

    let (mut manager, _) = build(settings(DeviceCategory::FilterWheel), connector.clone(), cancel);
    let report = manager.run_conformance_test().await.unwrap();

    assert_eq!(report.verdict, Verdict::Aborted);
    assert_eq!(report.outcome, RunOutcome::Aborted);
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].verdict, Verdict::Aborted);
    assert_eq!(connector.opens.load(Ordering::SeqCst), 0);
    assert_eq!(manager.state(), RunState::Aborted);
    drop(manager);
    assert_eq!(device.releases(), 0);
}

#[tokio::test]
async fn test_cancel_mid_run_aborts_and_releases_once() {
    let device = Arc::new(StubDevice::filter_wheel().hangs("Stuck"));
    let plan = TestPlan::new(
        DeviceCategory::FilterWheel,
        vec![pass_case("first"), read_case("stuck", "Stuck"), pass_case("never")],
    )
    .unwrap();
    let mut settings = settings(DeviceCategory::FilterWheel);
    settings.run.call_timeout_ms = 60_000;
    settings.run.case_timeout_ms = 60_000;

    let cancel = CancellationToken::new();
    let (manager, sink) = build(settings, StubConnector::new(device.clone()), cancel.clone());
    let mut manager = manager.with_plan(plan);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
    });
    let report = tokio::time::timeout(Duration::from_secs(10), manager.run_conformance_test())
        .await
        .expect("cancellation must end the run")
        .unwrap();

    assert_eq!(report.verdict, Verdict::Aborted);
    assert_eq!(report.outcome, RunOutcome::Aborted);
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.result("first").unwrap().verdict, Verdict::Pass);
    let stuck = report.result("stuck").unwrap();
    assert_eq!(stuck.verdict, Verdict::Aborted);
    assert_eq!(stuck.error_kind, Some(ErrorKind::Cancelled));
    assert!(report.result("never").is_none());
    assert_eq!(sink.len(), 2);

    // Released as soon as the run aborted, never again
    assert_eq!(device.releases(), 1);
    manager.dispose();
    drop(manager);
    assert_eq!(device.releases(), 1);
}

// =============================================================================
// Error classification
// =============================================================================

#[tokio::test]
async fn test_unsupported_member_is_a_warning() {
    let device = Arc::new(StubDevice::filter_wheel().unsupported("Optional"));
    let plan = TestPlan::new(
        DeviceCategory::FilterWheel,
        vec![read_case("optional", "Optional"), read_case("later", "Name")],
    )
    .unwrap();
    let (manager, _) = build(
        settings(DeviceCategory::FilterWheel),
        StubConnector::new(device),
        CancellationToken::new(),
    );
    let mut manager = manager.with_plan(plan);
    let report = manager.run_conformance_test().await.unwrap();

    let optional = report.result("optional").unwrap();
    assert_eq!(optional.verdict, Verdict::Warning);
    assert_eq!(optional.error_kind, Some(ErrorKind::Unsupported));
    assert!(optional.message.contains("Optional"));
    assert_eq!(report.result("later").unwrap().verdict, Verdict::Pass);
    assert_eq!(report.verdict, Verdict::Warning);
}

#[tokio::test]
async fn test_call_timeout_fails_case_and_run_continues() {
    let device = Arc::new(StubDevice::filter_wheel().hangs("Stuck"));
    let plan = TestPlan::new(
        DeviceCategory::FilterWheel,
        vec![read_case("stuck", "Stuck"), read_case("next", "Name")],
    )
    .unwrap();
    let mut settings = settings(DeviceCategory::FilterWheel);
    settings.run.call_timeout_ms = 200;
    let (manager, _) = build(settings, StubConnector::new(device.clone()), CancellationToken::new());
    let mut manager = manager.with_plan(plan);

    let report = tokio::time::timeout(Duration::from_secs(10), manager.run_conformance_test())
        .await
        .expect("timeouts must not hang the run")
        .unwrap();

    let stuck = report.result("stuck").unwrap();
    assert_eq!(stuck.verdict, Verdict::Fail);
    assert_eq!(stuck.error_kind, Some(ErrorKind::Timeout));
    assert_eq!(report.result("next").unwrap().verdict, Verdict::Pass);
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(device.calls("Name"), 1);
}

#[tokio::test]
async fn test_case_timeout_fails_case() {
    let plan = TestPlan::new(
        DeviceCategory::FilterWheel,
        vec![
            TestCase::new("slow", "slow", Phase::Methods, |_ctx: CheckContext| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, CheckError>(CheckOutcome::pass("finally"))
            }),
            pass_case("after"),
        ],
    )
    .unwrap();
    let mut settings = settings(DeviceCategory::FilterWheel);
    settings.run.case_timeout_ms = 200;
    let (manager, _) = build(
        settings,
        StubConnector::new(Arc::new(StubDevice::filter_wheel())),
        CancellationToken::new(),
    );
    let mut manager = manager.with_plan(plan);
    let report = manager.run_conformance_test().await.unwrap();

    assert_eq!(report.result("slow").unwrap().error_kind, Some(ErrorKind::Timeout));
    assert_eq!(report.result("slow").unwrap().verdict, Verdict::Fail);
    assert_eq!(report.result("after").unwrap().verdict, Verdict::Pass);
}

// =============================================================================
// Fatal outcomes
// =============================================================================

#[tokio::test]
async fn test_connect_failure_is_a_single_fatal_entry() {
    let device = Arc::new(StubDevice::filter_wheel());
    let (mut manager, sink) = build(
        settings(DeviceCategory::FilterWheel),
        StubConnector::failing(device.clone()),
        CancellationToken::new(),
    );
    let report = manager.run_conformance_test().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Fatal);
    assert_eq!(report.verdict, Verdict::Fatal);
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].case_id, "connect");
    assert_eq!(report.results[0].phase, None);
    assert!(report.phases.is_empty());
    assert_eq!(sink.len(), 1);
    assert_eq!(manager.state(), RunState::Fatal);
    assert_eq!(device.calls("Names"), 0);
}

#[tokio::test]
async fn test_rejected_connect_is_fatal_and_releases() {
    let device = Arc::new(StubDevice::filter_wheel().unsupported("Connected"));
    let (mut manager, _) = build(
        settings(DeviceCategory::FilterWheel),
        StubConnector::new(device.clone()),
        CancellationToken::new(),
    );
    let report = manager.run_conformance_test().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Fatal);
    assert_eq!(report.results.len(), 1);
    assert_eq!(device.releases(), 1);
}

#[tokio::test]
async fn test_harness_error_is_fatal_and_still_finalizes() {
    let device = Arc::new(StubDevice::filter_wheel());
    let plan = TestPlan::new(
        DeviceCategory::FilterWheel,
        vec![
            pass_case("first"),
            TestCase::new("bug", "bug", Phase::Methods, |_ctx: CheckContext| async {
                Err::<CheckOutcome, _>(CheckError::Harness("case is miswritten".to_string()))
            }),
            pass_case("never"),
        ],
    )
    .unwrap();
    let (manager, _) = build(
        settings(DeviceCategory::FilterWheel),
        StubConnector::new(device.clone()),
        CancellationToken::new(),
    );
    let mut manager = manager.with_plan(plan);
    let report = manager.run_conformance_test().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Fatal);
    let bug = report.result("bug").unwrap();
    assert_eq!(bug.verdict, Verdict::Fatal);
    assert!(bug.message.contains("miswritten"));
    assert!(report.result("never").is_none());
    assert_eq!(device.value("Connected"), Some(DeviceValue::Bool(false)));
    assert_eq!(device.releases(), 1);
}

#[tokio::test]
async fn test_panicking_check_is_fatal() {
    let plan = TestPlan::new(
        DeviceCategory::FilterWheel,
        vec![TestCase::new("panics", "panics", Phase::Properties, |_ctx: CheckContext| async {
            let slots: Vec<i32> = Vec::new();
            Ok::<_, CheckError>(CheckOutcome::pass(slots[3].to_string()))
        })],
    )
    .unwrap();
    let (manager, _) = build(
        settings(DeviceCategory::FilterWheel),
        StubConnector::new(Arc::new(StubDevice::filter_wheel())),
        CancellationToken::new(),
    );
    let mut manager = manager.with_plan(plan);
    let report = manager.run_conformance_test().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Fatal);
    assert_eq!(report.result("panics").unwrap().verdict, Verdict::Fatal);
}

// =============================================================================
// Finalizing, reuse and streaming
// =============================================================================

#[tokio::test]
async fn test_focuser_is_halted_when_finalizing() {
    let device = Arc::new(
        StubDevice::new()
            .with("Connected", false)
            .with("Name", "Stub focuser"),
    );
    let plan = TestPlan::new(DeviceCategory::Focuser, vec![read_case("name", "Name")]).unwrap();
    let (manager, _) = build(
        settings(DeviceCategory::Focuser),
        StubConnector::new(device.clone()),
        CancellationToken::new(),
    );
    let mut manager = manager.with_plan(plan);
    let report = manager.run_conformance_test().await.unwrap();

    assert_eq!(report.verdict, Verdict::Pass);
    assert_eq!(device.calls("Halt"), 1);
    assert_eq!(device.value("Connected"), Some(DeviceValue::Bool(false)));
}

#[tokio::test]
async fn test_plan_for_another_category_is_rejected() {
    let plan = TestPlan::new(DeviceCategory::Focuser, vec![pass_case("a")]).unwrap();
    let (manager, _) = build(
        settings(DeviceCategory::FilterWheel),
        StubConnector::new(Arc::new(StubDevice::filter_wheel())),
        CancellationToken::new(),
    );
    let mut manager = manager.with_plan(plan);
    assert!(manager.run_conformance_test().await.is_err());
}

#[tokio::test]
async fn test_results_are_streamed_while_running() {
    // The run cannot end before "stuck" is cancelled, and that only happens once
    // the first result has been received.
    let device = Arc::new(StubDevice::filter_wheel().hangs("Stuck"));
    let plan = TestPlan::new(
        DeviceCategory::FilterWheel,
        vec![pass_case("first"), read_case("stuck", "Stuck")],
    )
    .unwrap();
    let mut settings = settings(DeviceCategory::FilterWheel);
    settings.run.call_timeout_ms = 60_000;
    settings.run.case_timeout_ms = 60_000;

    let (sink, mut rx) = ChannelSink::new();
    let cancel = CancellationToken::new();
    let mut manager = ConformanceTestManager::new(settings, Arc::new(sink), cancel.clone())
        .with_connector(StubConnector::new(device))
        .with_plan(plan);
    let mut states = manager.subscribe();

    let observe = async {
        let first = rx.recv().await.unwrap();
        let state_at_first = *states.borrow_and_update();
        cancel.cancel();
        (first, state_at_first)
    };
    let (report, (first, state_at_first)) = tokio::time::timeout(
        Duration::from_secs(10),
        async { tokio::join!(manager.run_conformance_test(), observe) },
    )
    .await
    .expect("the first result must arrive while the run is blocked");
    let report = report.unwrap();

    assert_eq!(first.case_id, "first");
    assert_eq!(first.verdict, Verdict::Pass);
    assert_eq!(state_at_first, RunState::Running(Phase::Properties));

    let mut rest = Vec::new();
    while let Ok(result) = rx.try_recv() {
        rest.push(result);
    }
    assert_eq!(report.results[0], first);
    assert_eq!(rest, report.results[1..].to_vec());
    assert_eq!(report.outcome, RunOutcome::Aborted);
    assert_eq!(*states.borrow_and_update(), RunState::Aborted);
}

// =============================================================================
// Misbehaving devices
// =============================================================================

/// Absolute focuser at rest that reports whatever limits the test gives it.
fn focuser(max_step: i32, max_increment: i32, position: i32) -> StubDevice {
    StubDevice::new()
        .with("Connected", false)
        .with("Description", "Stub focuser")
        .with("DriverInfo", "stub")
        .with("DriverVersion", "1.0")
        .with("InterfaceVersion", 3)
        .with("Name", "Stub focuser")
        .with("SupportedActions", DeviceValue::Array(vec![]))
        .with("Absolute", true)
        .with("MaxStep", max_step)
        .with("MaxIncrement", max_increment)
        .with("Position", position)
        .with("StepSize", 2.0)
        .with("TempCompAvailable", false)
        .with("TempComp", false)
        .with("Temperature", 10.0)
        .with("IsMoving", false)
}

#[tokio::test]
async fn test_extreme_focuser_limits_do_not_end_the_run() {
    let device = Arc::new(focuser(i32::MAX, i32::MAX, 10));
    let (mut manager, _) = build(
        settings(DeviceCategory::Focuser),
        StubConnector::new(device.clone()),
        CancellationToken::new(),
    );

    let report = manager.run_conformance_test().await.unwrap();
    let plan = plan_for(DeviceCategory::Focuser).unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed, "{}", report.to_markdown());
    assert_eq!(report.results.len(), plan.len());
    assert!(report.results.iter().all(|r| r.verdict != Verdict::Fatal));
    assert_eq!(report.result("max_increment").unwrap().verdict, Verdict::Pass);
    assert_ne!(report.result("halt").unwrap().verdict, Verdict::Fatal);
    assert_eq!(report.result("connect_cycle").unwrap().verdict, Verdict::Pass);

    // Both moves were commanded inside 0..=MaxStep
    let target = device.value("Move").and_then(|v| v.as_i64()).unwrap();
    assert!((0..=i64::from(i32::MAX)).contains(&target), "moved to {}", target);
}

#[tokio::test]
async fn test_unaddressable_filter_wheel_fails_names() {
    let slots = 32_768;
    let device = Arc::new(
        StubDevice::filter_wheel()
            .with("FocusOffsets", vec![0i32; slots])
            .with("Names", (0..slots).map(|i| format!("F{}", i)).collect::<Vec<_>>()),
    );
    let (mut manager, _) = build(
        settings(DeviceCategory::FilterWheel),
        StubConnector::new(device.clone()),
        CancellationToken::new(),
    );

    let report = manager.run_conformance_test().await.unwrap();
    let names = report.result("names").unwrap();
    assert_eq!(names.verdict, Verdict::Fail);
    assert_eq!(names.error_kind, Some(ErrorKind::InvalidResponse));
    assert_eq!(report.result("position").unwrap().verdict, Verdict::Skipped);
    assert_eq!(report.result("move_to_each_slot").unwrap().verdict, Verdict::Skipped);
    assert_eq!(device.calls("Position"), 0);
    assert_eq!(report.outcome, RunOutcome::Completed);
}
