//! Operation telemetry hook.
//!
//! Directory and protocol implementations report every public operation
//! through an [`OperationRecorder`]. The core ships only a no-op recorder;
//! the API crate plugs in a Prometheus-backed one.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sink for per-operation counters and timers.
pub trait OperationRecorder: Send + Sync {
    /// Record one completed operation.
    fn record(&self, component: &'static str, operation: &'static str, success: bool, duration: Duration);
}

/// Shared recorder handle.
pub type SharedRecorder = Arc<dyn OperationRecorder>;

/// Recorder that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

impl OperationRecorder for NoopRecorder {
    fn record(&self, _component: &'static str, _operation: &'static str, _success: bool, _duration: Duration) {}
}

impl NoopRecorder {
    pub fn shared() -> SharedRecorder {
        Arc::new(NoopRecorder)
    }
}

/// Measures one operation and reports it when finished.
#[must_use = "an OperationTimer records nothing until finished"]
pub struct OperationTimer<'a> {
    recorder: &'a dyn OperationRecorder,
    component: &'static str,
    operation: &'static str,
    started: Instant,
}

impl<'a> OperationTimer<'a> {
    pub fn start(
        recorder: &'a dyn OperationRecorder,
        component: &'static str,
        operation: &'static str,
    ) -> Self {
        Self {
            recorder,
            component,
            operation,
            started: Instant::now(),
        }
    }

    /// Record with an explicit outcome.
    pub fn finish(self, success: bool) {
        self.recorder
            .record(self.component, self.operation, success, self.started.elapsed());
    }

    /// Record the outcome of `result` and pass it through.
    pub fn observe<T, E>(self, result: Result<T, E>) -> Result<T, E> {
        self.finish(result.is_ok());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Captured(Mutex<Vec<(&'static str, &'static str, bool)>>);

    impl OperationRecorder for Captured {
        fn record(&self, component: &'static str, operation: &'static str, success: bool, _duration: Duration) {
            if let Ok(mut calls) = self.0.lock() {
                calls.push((component, operation, success));
            }
        }
    }

    #[test]
    fn test_timer_records_outcome() {
        let recorder = Captured::default();
        let ok: Result<u8, ()> = OperationTimer::start(&recorder, "directory", "register").observe(Ok(1));
        assert_eq!(ok, Ok(1));
        let err: Result<u8, ()> = OperationTimer::start(&recorder, "protocol", "call").observe(Err(()));
        assert!(err.is_err());

        let calls = recorder.0.lock().map(|c| c.clone()).unwrap_or_default();
        assert_eq!(
            calls,
            vec![("directory", "register", true), ("protocol", "call", false)]
        );
    }
}
