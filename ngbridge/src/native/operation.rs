//! Running one async engine operation with progress and cancellation.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::engine::{AsyncOp, NativeEngine};
use crate::callback::{CallbackKey, CallbackRegistry, ProgressCallback, SlotGuard};
use crate::error::{BridgeError, BridgeResult};
use crate::status::StatusCode;

/// Builder for one blocking engine call.
///
/// # Example
///
/// ```ignore
/// let token = CancellationToken::new();
/// let outcome = Operation::new(AsyncOp::copy("ngc://a", "ngc://b"))
///     .with_progress(progress)
///     .with_cancellation(token.clone())
///     .run(&engine, &registry);
/// if outcome.is_cancelled() { /* ... */ }
/// ```
pub struct Operation {
    op: AsyncOp,
    progress: Option<ProgressCallback>,
    cancel: Option<CancellationToken>,
}

impl Operation {
    pub fn new(op: AsyncOp) -> Self {
        Self {
            op,
            progress: None,
            cancel: None,
        }
    }

    /// Observe progress; returning `false` cancels the operation.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Cancel the operation from outside through `token`.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn op(&self) -> &AsyncOp {
        &self.op
    }

    /// Run the operation on the calling thread.
    ///
    /// The progress slot exists only for the duration of this call: it is
    /// released before `run` returns, whatever the outcome. Engines that keep
    /// reporting after returning reach an unknown key, which answers
    /// "continue".
    pub fn run(self, engine: &dyn NativeEngine, registry: &Arc<CallbackRegistry>) -> OperationOutcome {
        let name = self.op.name();
        let token = self.cancel.clone().unwrap_or_default();

        if token.is_cancelled() {
            info!(op = name, "Operation cancelled before start");
            return OperationOutcome {
                op: name,
                status: StatusCode::Canceled,
                result: 0,
                message: None,
            };
        }

        let last_status: Arc<Mutex<Option<StatusCode>>> = Arc::new(Mutex::new(None));
        let scope = self.register(registry, &token, &last_status);
        let key = scope
            .as_ref()
            .map(|(guard, _)| guard.key())
            .unwrap_or(CallbackKey::NONE);

        debug!(op = %self.op, %key, "Starting native operation");
        let result = engine.start_async_op(&self.op, key);
        let message = if result <= 0 { engine.last_error() } else { None };
        drop(scope);

        let reported = *last_status.lock();
        let status = if result > 0 {
            reported
                .filter(|status| status.is_success())
                .unwrap_or(StatusCode::Success)
        } else if token.is_cancelled() || reported == Some(StatusCode::Canceled) {
            StatusCode::Canceled
        } else {
            reported
                .filter(|status| status.is_failure())
                .unwrap_or_else(|| self.op.failure_status())
        };

        let outcome = OperationOutcome {
            op: name,
            status,
            result,
            message,
        };
        match status {
            StatusCode::Canceled => info!(op = name, "Operation cancelled"),
            s if s.is_failure() => warn!(
                op = name,
                %status,
                message = outcome.message.as_deref().unwrap_or(""),
                "Operation failed"
            ),
            _ => debug!(op = name, %status, result, "Operation finished"),
        }
        outcome
    }

    /// Register the progress observer, if anyone is listening.
    ///
    /// The returned closure must outlive the guard: the registry only holds
    /// a weak reference.
    fn register(
        &self,
        registry: &Arc<CallbackRegistry>,
        token: &CancellationToken,
        last_status: &Arc<Mutex<Option<StatusCode>>>,
    ) -> Option<(SlotGuard, ProgressCallback)> {
        if self.progress.is_none() && self.cancel.is_none() {
            return None;
        }

        let user = self.progress.clone();
        let seen = Arc::clone(last_status);
        let observer: ProgressCallback = Arc::new(move |status, fraction, message| {
            *seen.lock() = Some(status);
            match &user {
                Some(progress) => progress(status, fraction, message),
                None => true,
            }
        });
        let guard = registry.register_scoped_with_token(&observer, token.clone());
        Some((guard, observer))
    }
}

/// Result of [`Operation::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationOutcome {
    /// Operation name, as in [`AsyncOp::name`].
    pub op: &'static str,
    pub status: StatusCode,
    /// Raw engine return value.
    pub result: i32,
    /// Engine last-error message, read straight after a failed call.
    pub message: Option<String>,
}

impl OperationOutcome {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == StatusCode::Canceled
    }

    /// Turn a failed or cancelled outcome into an error.
    pub fn into_result(self) -> BridgeResult<i32> {
        match self.status {
            StatusCode::Canceled => Err(BridgeError::Cancelled(self.op.to_string())),
            status if status.is_failure() => Err(BridgeError::NativeCall {
                op: self.op.to_string(),
                status,
                message: self.message.unwrap_or_default(),
            }),
            _ => Ok(self.result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{LastError, ProgressBridge};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    /// Engine that replays a fixed list of progress reports from a worker
    /// thread and stops as soon as one is refused.
    struct ScriptedEngine {
        bridge: ProgressBridge,
        script: Vec<(StatusCode, f64)>,
        fail_with: Option<&'static str>,
        last_error: LastError,
        seen_key: Mutex<Option<CallbackKey>>,
    }

    impl ScriptedEngine {
        fn new(registry: &Arc<CallbackRegistry>, script: Vec<(StatusCode, f64)>) -> Self {
            Self {
                bridge: ProgressBridge::new(Arc::clone(registry)),
                script,
                fail_with: None,
                last_error: LastError::new(),
                seen_key: Mutex::new(None),
            }
        }
    }

    impl NativeEngine for ScriptedEngine {
        fn start_async_op(&self, _op: &AsyncOp, callback: CallbackKey) -> i32 {
            *self.seen_key.lock() = Some(callback);
            let bridge = self.bridge.clone();
            let script = self.script.clone();
            let completed = thread::spawn(move || {
                script.iter().all(|(status, fraction)| {
                    bridge.on_progress(status.wire(), *fraction, "", callback.get())
                })
            })
            .join()
            .unwrap();

            match (completed, self.fail_with) {
                (false, _) => 0,
                (true, Some(message)) => {
                    self.last_error.set(message);
                    -1
                }
                (true, None) => 1,
            }
        }

        fn last_error(&self) -> Option<String> {
            self.last_error.get()
        }
    }

    fn steps() -> Vec<(StatusCode, f64)> {
        vec![
            (StatusCode::InProcess, 0.25),
            (StatusCode::InProcess, 0.5),
            (StatusCode::InProcess, 0.75),
            (StatusCode::Finished, 1.0),
        ]
    }

    #[test]
    fn test_success_reports_progress() {
        let registry = Arc::new(CallbackRegistry::new());
        let engine = ScriptedEngine::new(&registry, steps());
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        let outcome = Operation::new(AsyncOp::copy("ngc://a", "ngc://b"))
            .with_progress(Arc::new(move |_, _, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            }))
            .run(&engine, &registry);

        assert!(outcome.is_success());
        assert_eq!(outcome.status, StatusCode::Finished);
        assert_eq!(ticks.load(Ordering::SeqCst), 4);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_false_from_closure_cancels_and_removes_slot() {
        let registry = Arc::new(CallbackRegistry::new());
        let engine = ScriptedEngine::new(&registry, steps());

        let outcome = Operation::new(AsyncOp::copy("ngc://a", "ngc://b"))
            .with_progress(Arc::new(|_, fraction, _| fraction < 0.5))
            .run(&engine, &registry);

        assert_eq!(outcome.status, StatusCode::Canceled);
        assert!(outcome.is_cancelled());
        let key = engine.seen_key.lock().unwrap();
        assert!(!key.is_none());
        assert!(!registry.contains(key));
        assert!(matches!(
            outcome.into_result(),
            Err(BridgeError::Cancelled(op)) if op == "copy"
        ));
    }

    #[test]
    fn test_external_token_cancels() {
        let registry = Arc::new(CallbackRegistry::new());
        let engine = ScriptedEngine::new(&registry, steps());
        let token = CancellationToken::new();
        let trigger = token.clone();

        let outcome = Operation::new(AsyncOp::backup("ngc://store", "/tmp/store.zip"))
            .with_progress(Arc::new(move |_, fraction, _| {
                if fraction >= 0.5 {
                    trigger.cancel();
                }
                true
            }))
            .with_cancellation(token)
            .run(&engine, &registry);

        assert!(outcome.is_cancelled());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_token_without_progress_still_gets_a_key() {
        let registry = Arc::new(CallbackRegistry::new());
        let engine = ScriptedEngine::new(&registry, steps());

        let outcome = Operation::new(AsyncOp::copy("a", "b"))
            .with_cancellation(CancellationToken::new())
            .run(&engine, &registry);

        assert!(outcome.is_success());
        assert!(!engine.seen_key.lock().unwrap().is_none());
    }

    #[test]
    fn test_no_progress_passes_key_zero() {
        let registry = Arc::new(CallbackRegistry::new());
        let engine = ScriptedEngine::new(&registry, steps());

        let outcome = Operation::new(AsyncOp::copy("a", "b")).run(&engine, &registry);

        assert!(outcome.is_success());
        assert_eq!(*engine.seen_key.lock(), Some(CallbackKey::NONE));
    }

    #[test]
    fn test_failure_reads_last_error() {
        let registry = Arc::new(CallbackRegistry::new());
        let mut engine = ScriptedEngine::new(&registry, vec![(StatusCode::InProcess, 0.5)]);
        engine.fail_with = Some("destination is read-only");

        let outcome = Operation::new(AsyncOp::copy("a", "b"))
            .with_progress(Arc::new(|_, _, _| true))
            .run(&engine, &registry);

        assert_eq!(outcome.status, StatusCode::CopyFailed);
        assert_eq!(outcome.message.as_deref(), Some("destination is read-only"));
        match outcome.into_result() {
            Err(BridgeError::NativeCall {
                op,
                status,
                message,
            }) => {
                assert_eq!(op, "copy");
                assert_eq!(status, StatusCode::CopyFailed);
                assert_eq!(message, "destination is read-only");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_failure_status_reported_by_engine_wins() {
        let registry = Arc::new(CallbackRegistry::new());
        let mut engine = ScriptedEngine::new(&registry, vec![(StatusCode::OpenFailed, 0.0)]);
        engine.fail_with = Some("cannot open source");

        let outcome = Operation::new(AsyncOp::copy("a", "b"))
            .with_progress(Arc::new(|_, _, _| true))
            .run(&engine, &registry);

        assert_eq!(outcome.status, StatusCode::OpenFailed);
    }

    #[test]
    fn test_cancelled_before_start_skips_engine() {
        let registry = Arc::new(CallbackRegistry::new());
        let engine = ScriptedEngine::new(&registry, steps());
        let token = CancellationToken::new();
        token.cancel();

        let outcome = Operation::new(AsyncOp::copy("a", "b"))
            .with_cancellation(token)
            .run(&engine, &registry);

        assert!(outcome.is_cancelled());
        assert!(engine.seen_key.lock().is_none());
    }
}
