//! Result sinks.
//!
//! The orchestrator pushes every [`TestResult`] into a sink the moment it is
//! produced, so a long run can be observed live.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::{TestResult, Verdict};

/// Receiver of streamed test results.
pub trait ResultSink: Send + Sync {
    fn record(&self, result: &TestResult);
}

/// Emits one leveled tracing event per result.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ResultSink for TracingSink {
    fn record(&self, result: &TestResult) {
        let phase = result.phase.map(|p| p.as_str()).unwrap_or("-");
        match result.verdict {
            Verdict::Pass => info!(
                case = %result.case_id,
                phase,
                verdict = %result.verdict,
                "{}",
                result.message
            ),
            Verdict::Warning | Verdict::Skipped => warn!(
                case = %result.case_id,
                phase,
                verdict = %result.verdict,
                "{}",
                result.message
            ),
            Verdict::Fail | Verdict::Aborted | Verdict::Fatal => error!(
                case = %result.case_id,
                phase,
                verdict = %result.verdict,
                "{}",
                result.message
            ),
        }
    }
}

/// Keeps every result in memory. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    results: Arc<Mutex<Vec<TestResult>>>,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every result so far.
    pub fn results(&self) -> Vec<TestResult> {
        self.results.lock().clone()
    }

    /// Number of results so far.
    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    /// True before the first result.
    pub fn is_empty(&self) -> bool {
        self.results.lock().is_empty()
    }
}

impl ResultSink for MemorySink {
    fn record(&self, result: &TestResult) {
        self.results.lock().push(result.clone());
    }
}

/// Forwards results to an unbounded channel, e.g. for a UI task.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<TestResult>,
}

impl ChannelSink {
    /// Sink and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TestResult>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ResultSink for ChannelSink {
    fn record(&self, result: &TestResult) {
        // A dropped receiver only means nobody is watching any more.
        let _ = self.tx.send(result.clone());
    }
}

/// Delivers each result to several sinks in order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ResultSink>>,
}

impl FanoutSink {
    /// Sink with no targets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a target.
    pub fn with(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl ResultSink for FanoutSink {
    fn record(&self, result: &TestResult) {
        for sink in &self.sinks {
            sink.record(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(verdict: Verdict) -> TestResult {
        TestResult::unscheduled("case", "Case", verdict, "message")
    }

    #[test]
    fn test_memory_sink_shares_buffer() {
        let sink = MemorySink::new();
        let clone = sink.clone();
        clone.record(&result(Verdict::Pass));
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_channel_sink_streams() {
        let (sink, mut rx) = ChannelSink::new();
        sink.record(&result(Verdict::Fail));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.verdict, Verdict::Fail);

        drop(rx);
        // Must not panic once the receiver is gone
        sink.record(&result(Verdict::Pass));
    }

    #[test]
    fn test_fanout_delivers_to_all() {
        let a = MemorySink::new();
        let b = MemorySink::new();
        let fanout = FanoutSink::new()
            .with(Arc::new(a.clone()))
            .with(Arc::new(b.clone()))
            .with(Arc::new(TracingSink));
        fanout.record(&result(Verdict::Warning));
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }
}
