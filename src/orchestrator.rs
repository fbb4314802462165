//! The conformance test manager.
//!
//! Owns the driver handle and facade for one run and walks the device through
//! its test plan:
//!
//! ```text
//! Idle -> Connecting -> Running(phase) -> Finalizing -> Completed
//!             |              |                            Aborted
//!             `--------------+--------------------------> Fatal
//! ```
//!
//! Cases run strictly one after another. The cancellation token is checked
//! before connecting, before each case, and raced against every in-flight case,
//! so a device stuck in a call cannot hold the run hostage. Each case is also
//! bounded by the configured case timeout.

use chrono::Utc;
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ConformSettings, RunSettings};
use crate::driver::{Connector, DriverHandle, TransportConnector};
use crate::error::{AppResult, CheckError, ConformError, ErrorKind};
use crate::facade::{DeviceFacade, FacadeFactory};
use crate::plans;
use crate::testing::{
    CheckContext, Phase, ResultSink, RunOutcome, RunReport, TestCase, TestPlan, TestResult,
    Verdict,
};

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Not started.
    Idle,
    /// Opening the handle and connecting.
    Connecting,
    /// Executing cases of a phase.
    Running(Phase),
    /// Bringing the device to rest and disconnecting.
    Finalizing,
    /// Every scheduled case ran.
    Completed,
    /// Stopped by cancellation.
    Aborted,
    /// Stopped by a connect failure or a harness error.
    Fatal,
}

impl RunState {
    /// True once the run can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Aborted | RunState::Fatal)
    }
}

impl From<RunOutcome> for RunState {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Completed => RunState::Completed,
            RunOutcome::Aborted => RunState::Aborted,
            RunOutcome::Fatal => RunState::Fatal,
        }
    }
}

/// Why the connecting step did not produce a facade.
enum ConnectFailure {
    Cancelled,
    Failed { kind: ErrorKind, message: String },
}

/// How the case loop ended.
enum LoopEnd {
    Finished,
    Cancelled,
    HarnessError,
}

/// Runs one conformance test against one device.
pub struct ConformanceTestManager {
    settings: Arc<ConformSettings>,
    sink: Arc<dyn ResultSink>,
    cancel: CancellationToken,
    connector: Arc<dyn Connector>,
    facades: FacadeFactory,
    plan: Option<TestPlan>,
    handle: Option<Arc<dyn DriverHandle>>,
    state: watch::Sender<RunState>,
    started: bool,
}

impl ConformanceTestManager {
    /// Settings are expected to have been validated by the caller.
    pub fn new(settings: ConformSettings, sink: Arc<dyn ResultSink>, cancel: CancellationToken) -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        Self {
            settings: Arc::new(settings),
            sink,
            cancel,
            connector: Arc::new(TransportConnector::default()),
            facades: FacadeFactory::standard(),
            plan: None,
            handle: None,
            state,
            started: false,
        }
    }

    /// Replace the connector used to acquire the driver handle.
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Replace the facade factory.
    pub fn with_facade_factory(mut self, facades: FacadeFactory) -> Self {
        self.facades = facades;
        self
    }

    /// Run this plan instead of the built-in plan for the configured category.
    pub fn with_plan(mut self, plan: TestPlan) -> Self {
        self.plan = Some(plan);
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Observe state transitions as they happen.
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: RunState) {
        debug!(?state, "Run state");
        self.state.send_replace(state);
    }

    fn record(&self, results: &mut Vec<TestResult>, result: TestResult) {
        self.sink.record(&result);
        results.push(result);
    }

    /// Execute the plan. May be called once per manager.
    pub async fn run_conformance_test(&mut self) -> AppResult<RunReport> {
        if self.started {
            return Err(ConformError::AlreadyRun);
        }
        self.started = true;

        let started_at = Utc::now();
        let device = &self.settings.device;
        let (category, transport) = (device.category, device.transport);
        let plan = match self.plan.take() {
            Some(plan) => plan,
            None => plans::plan_for(category)?,
        };
        if plan.category != category {
            return Err(ConformError::InvalidPlan(format!(
                "plan is for {} but the device is a {}",
                plan.category, category
            )));
        }

        let run = Arc::new(self.settings.run.clone());
        let scheduled: Vec<TestCase> = plan.scheduled(&run).into_iter().cloned().collect();
        info!(
            %category,
            %transport,
            device = %device.describe(),
            scheduled = scheduled.len(),
            "Starting conformance run"
        );

        let mut results = Vec::with_capacity(scheduled.len());
        let outcome = if self.cancel.is_cancelled() {
            self.record(&mut results, cancelled_before(scheduled.first(), "run cancelled before start"));
            RunOutcome::Aborted
        } else {
            self.set_state(RunState::Connecting);
            match self.connect().await {
                Ok(facade) => {
                    let end = self.execute(&facade, &scheduled, &run, &mut results).await;
                    self.set_state(RunState::Finalizing);
                    self.finalize(&facade, &run).await;
                    match end {
                        LoopEnd::Finished => RunOutcome::Completed,
                        LoopEnd::Cancelled => RunOutcome::Aborted,
                        LoopEnd::HarnessError => RunOutcome::Fatal,
                    }
                }
                Err(ConnectFailure::Cancelled) => {
                    self.record(
                        &mut results,
                        cancelled_before(scheduled.first(), "run cancelled while connecting"),
                    );
                    RunOutcome::Aborted
                }
                Err(ConnectFailure::Failed { kind, message }) => {
                    error!(%kind, "Connection failed: {}", message);
                    self.record(
                        &mut results,
                        TestResult::unscheduled("connect", "Connect to device", Verdict::Fatal, message)
                            .with_error_kind(kind),
                    );
                    RunOutcome::Fatal
                }
            }
        };

        let device = self
            .handle
            .as_ref()
            .map(|h| h.describe())
            .unwrap_or_else(|| self.settings.device.describe());
        if outcome != RunOutcome::Completed {
            self.release();
        }

        let report = RunReport::new(
            category,
            transport,
            device,
            started_at,
            outcome,
            scheduled.len(),
            results,
        );
        self.set_state(outcome.into());
        info!(
            outcome = outcome.as_str(),
            verdict = %report.verdict,
            results = report.results.len(),
            "Conformance run finished"
        );
        Ok(report)
    }

    /// Acquire the handle, build the facade and set `Connected`.
    async fn connect(&mut self) -> Result<DeviceFacade, ConnectFailure> {
        let cancel = self.cancel.clone();
        let settings = Arc::clone(&self.settings);
        let run = &settings.run;
        let connector = Arc::clone(&self.connector);

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConnectFailure::Cancelled),
            opened = tokio::time::timeout(run.connect_timeout(), connector.open(&settings)) => opened,
        };
        let handle = match opened {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                return Err(ConnectFailure::Failed {
                    kind: ErrorKind::TransportFailure,
                    message: format!("cannot open {}: {}", settings.device.describe(), e),
                })
            }
            Err(_) => {
                return Err(ConnectFailure::Failed {
                    kind: ErrorKind::Timeout,
                    message: format!(
                        "cannot open {} within {:?}",
                        settings.device.describe(),
                        run.connect_timeout()
                    ),
                })
            }
        };
        self.handle = Some(Arc::clone(&handle));

        let facade = self
            .facades
            .create(
                settings.device.category,
                settings.device.transport,
                handle,
                run.call_timeout(),
            )
            .map_err(|e| ConnectFailure::Failed {
                kind: ErrorKind::TransportFailure,
                message: e.to_string(),
            })?;

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConnectFailure::Cancelled),
            connected = tokio::time::timeout(
                run.connect_timeout(),
                facade.common().set_connected(true),
            ) => connected,
        };
        match connected {
            Ok(Ok(())) => {
                info!(device = %facade.common().describe(), "Connected");
                Ok(facade)
            }
            Ok(Err(e)) => Err(ConnectFailure::Failed {
                kind: e.kind,
                message: format!("setting Connected failed: {}", e),
            }),
            Err(_) => Err(ConnectFailure::Failed {
                kind: ErrorKind::Timeout,
                message: format!("setting Connected took longer than {:?}", run.connect_timeout()),
            }),
        }
    }

    async fn execute(
        &self,
        facade: &DeviceFacade,
        scheduled: &[TestCase],
        run: &Arc<RunSettings>,
        results: &mut Vec<TestResult>,
    ) -> LoopEnd {
        let mut verdicts: HashMap<String, Verdict> = HashMap::new();
        let mut phase = None;

        for case in scheduled {
            if self.cancel.is_cancelled() {
                self.record(results, cancelled(case, "run cancelled before this case started"));
                return LoopEnd::Cancelled;
            }
            if phase != Some(case.phase) {
                phase = Some(case.phase);
                info!(phase = %case.phase, "Entering phase");
                self.set_state(RunState::Running(case.phase));
            }

            let blocked = case.prerequisites.iter().find(|id| {
                matches!(verdicts.get(id.as_str()), Some(Verdict::Fail | Verdict::Skipped))
            });
            if let Some(prerequisite) = blocked {
                let result = TestResult::new(
                    case,
                    Verdict::Skipped,
                    format!("prerequisite '{}' did not pass", prerequisite),
                )
                .with_error_kind(ErrorKind::PrerequisiteNotMet);
                verdicts.insert(case.id.clone(), Verdict::Skipped);
                self.record(results, result);
                continue;
            }

            debug!(case = %case.id, "Running case");
            let ctx = CheckContext {
                facade: facade.clone(),
                run: Arc::clone(run),
            };
            let started = Instant::now();
            let check = AssertUnwindSafe(case.run(ctx)).catch_unwind();
            let finished = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                finished = tokio::time::timeout(run.case_timeout(), check) => Some(finished),
            };

            let result = match finished {
                None => {
                    warn!(case = %case.id, "Cancelled while the case was running");
                    self.record(
                        results,
                        cancelled(case, "run cancelled while this case was running")
                            .with_duration(started.elapsed()),
                    );
                    return LoopEnd::Cancelled;
                }
                Some(Err(_)) => TestResult::new(
                    case,
                    Verdict::Fail,
                    format!("case did not complete within {:?}", run.case_timeout()),
                )
                .with_error_kind(ErrorKind::Timeout),
                Some(Ok(Err(panic))) => {
                    let message = panic_message(panic.as_ref());
                    error!(case = %case.id, "Check panicked: {}", message);
                    self.record(
                        results,
                        TestResult::new(case, Verdict::Fatal, format!("check panicked: {}", message))
                            .with_duration(started.elapsed()),
                    );
                    return LoopEnd::HarnessError;
                }
                Some(Ok(Ok(Err(CheckError::Harness(message))))) => {
                    error!(case = %case.id, "Harness error: {}", message);
                    self.record(
                        results,
                        TestResult::new(case, Verdict::Fatal, message).with_duration(started.elapsed()),
                    );
                    return LoopEnd::HarnessError;
                }
                Some(Ok(Ok(Err(CheckError::Device(e))))) => {
                    TestResult::new(case, e.kind.verdict(), e.to_string()).with_error_kind(e.kind)
                }
                Some(Ok(Ok(Ok(outcome)))) => {
                    let verdict = outcome.verdict();
                    TestResult::new(case, verdict, outcome.into_message())
                }
            };

            let result = result.with_duration(started.elapsed());
            verdicts.insert(case.id.clone(), result.verdict);
            self.record(results, result);
        }
        LoopEnd::Finished
    }

    /// Leave the device at rest and disconnected. Failures are only logged.
    async fn finalize(&self, facade: &DeviceFacade, run: &RunSettings) {
        let bound = run.call_timeout();
        match tokio::time::timeout(bound, facade.make_safe()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Could not bring the device to a safe state: {}", e),
            Err(_) => warn!("Safe-state step took longer than {:?}", bound),
        }
        match tokio::time::timeout(bound, facade.common().set_connected(false)).await {
            Ok(Ok(())) => info!("Disconnected"),
            Ok(Err(e)) => warn!("Disconnect failed: {}", e),
            Err(_) => warn!("Disconnect took longer than {:?}", bound),
        }
    }

    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            info!(device = %handle.describe(), "Releasing driver handle");
            handle.release();
        }
    }

    /// Release the driver handle. Safe to call any number of times.
    pub fn dispose(&mut self) {
        self.release();
    }
}

impl Drop for ConformanceTestManager {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn cancelled(case: &TestCase, message: &str) -> TestResult {
    TestResult::new(case, Verdict::Aborted, message).with_error_kind(ErrorKind::Cancelled)
}

fn cancelled_before(first: Option<&TestCase>, message: &str) -> TestResult {
    match first {
        Some(case) => cancelled(case, message),
        None => TestResult::unscheduled("run", "Conformance run", Verdict::Aborted, message)
            .with_error_kind(ErrorKind::Cancelled),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
