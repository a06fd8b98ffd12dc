//! In-process stand-ins for the native engine.
//!
//! They call back through [`ProgressBridge`] from their own threads exactly
//! like the real engine, so everything above the boundary runs unchanged.
//! Used by the CLI and by tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use super::engine::{AsyncOp, Handle, LastError, NativeEngine};
use super::entry::ProgressBridge;
use crate::bridge::FeatureSource;
use crate::callback::{CallbackKey, CallbackRegistry};
use crate::draw::{DrawState, MapRenderer};
use crate::envelope::Envelope;
use crate::status::StatusCode;

/// Default number of progress steps per operation.
pub const DEFAULT_STEPS: usize = 10;

/// Engine that runs every async operation as a fixed number of progress
/// steps on a worker thread.
pub struct SimulatedEngine {
    bridge: ProgressBridge,
    steps: usize,
    step_delay: Duration,
    fail_at: Option<(usize, StatusCode)>,
    last_error: LastError,
    started: AtomicUsize,
}

impl SimulatedEngine {
    pub fn new(registry: Arc<CallbackRegistry>) -> Self {
        Self {
            bridge: ProgressBridge::new(registry),
            steps: DEFAULT_STEPS,
            step_delay: Duration::ZERO,
            fail_at: None,
            last_error: LastError::new(),
            started: AtomicUsize::new(0),
        }
    }

    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps.max(1);
        self
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Fail with `status` when reaching step `step` (1-based).
    pub fn failing_at(mut self, step: usize, status: StatusCode) -> Self {
        self.fail_at = Some((step, status));
        self
    }

    /// Number of operations started so far.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::Relaxed)
    }
}

impl NativeEngine for SimulatedEngine {
    fn start_async_op(&self, op: &AsyncOp, callback: CallbackKey) -> i32 {
        self.started.fetch_add(1, Ordering::Relaxed);
        let bridge = self.bridge.clone();
        let steps = self.steps;
        let delay = self.step_delay;
        let fail_at = self.fail_at;
        let name = op.name();
        let key = callback.get();

        let worker = thread::Builder::new()
            .name(format!("engine-{}", name))
            .spawn(move || -> Result<(), (StatusCode, String)> {
                for step in 1..=steps {
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    if let Some((at, status)) = fail_at {
                        if at == step {
                            let message = format!("{} failed at step {}", name, step);
                            bridge.on_progress(status.wire(), 0.0, &message, key);
                            return Err((status, message));
                        }
                    }
                    let fraction = step as f64 / steps as f64;
                    let status = if step == steps {
                        StatusCode::Finished
                    } else {
                        StatusCode::InProcess
                    };
                    if !bridge.on_progress(status.wire(), fraction, "", key) {
                        trace!(op = name, step, "Stop requested by progress callback");
                        bridge.on_progress(StatusCode::Canceled.wire(), fraction, "", key);
                        return Err((StatusCode::Canceled, format!("{} cancelled", name)));
                    }
                }
                Ok(())
            });

        let outcome = match worker {
            Ok(handle) => handle.join().unwrap_or_else(|_| {
                Err((StatusCode::UnexpectedError, "engine worker panicked".to_string()))
            }),
            Err(e) => Err((StatusCode::UnexpectedError, e.to_string())),
        };

        match outcome {
            Ok(()) => {
                debug!(op = name, "Simulated operation finished");
                1
            }
            Err((status, message)) => {
                debug!(op = name, %status, "Simulated operation stopped");
                self.last_error.set(message);
                0
            }
        }
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.get()
    }
}

/// Renderer that records draws and reports a few progress steps per draw.
pub struct SimulatedRenderer {
    bridge: ProgressBridge,
    steps: usize,
    step_delay: Duration,
    draws: Mutex<Vec<(Handle, DrawState)>>,
    invalidations: Mutex<Vec<(Handle, Envelope)>>,
}

impl SimulatedRenderer {
    pub fn new(registry: Arc<CallbackRegistry>) -> Self {
        Self {
            bridge: ProgressBridge::new(registry),
            steps: 3,
            step_delay: Duration::ZERO,
            draws: Mutex::new(Vec::new()),
            invalidations: Mutex::new(Vec::new()),
        }
    }

    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps.max(1);
        self
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Every draw started, in order.
    pub fn draws(&self) -> Vec<(Handle, DrawState)> {
        self.draws.lock().clone()
    }

    /// Draw states started for one map.
    pub fn draws_for(&self, map: Handle) -> Vec<DrawState> {
        self.draws
            .lock()
            .iter()
            .filter(|(handle, _)| *handle == map)
            .map(|(_, state)| *state)
            .collect()
    }

    pub fn invalidations(&self) -> Vec<(Handle, Envelope)> {
        self.invalidations.lock().clone()
    }
}

impl MapRenderer for SimulatedRenderer {
    fn draw(&self, map: Handle, state: DrawState, callback: CallbackKey) -> bool {
        if !map.is_valid() {
            return false;
        }
        self.draws.lock().push((map, state));

        let key = callback.get();
        for step in 1..=self.steps {
            if !self.step_delay.is_zero() {
                thread::sleep(self.step_delay);
            }
            let fraction = step as f64 / self.steps as f64;
            if !self
                .bridge
                .on_progress(StatusCode::InProcess.wire(), fraction, "", key)
            {
                self.bridge
                    .on_progress(StatusCode::Canceled.wire(), fraction, "", key);
                return true;
            }
        }
        self.bridge
            .on_progress(StatusCode::Finished.wire(), 1.0, "", key);
        true
    }

    fn invalidate(&self, map: Handle, envelope: &Envelope) {
        self.invalidations.lock().push((map, *envelope));
    }
}

/// Feature envelopes held in memory, keyed by source path and feature id.
#[derive(Debug, Default)]
pub struct InMemoryFeatures {
    envelopes: RwLock<HashMap<(String, i64), Envelope>>,
}

impl InMemoryFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, source: impl Into<String>, feature_id: i64, envelope: Envelope) {
        self.envelopes
            .write()
            .insert((source.into(), feature_id), envelope);
    }

    pub fn remove(&self, source: &str, feature_id: i64) -> Option<Envelope> {
        self.envelopes
            .write()
            .remove(&(source.to_string(), feature_id))
    }
}

impl FeatureSource for InMemoryFeatures {
    fn feature_envelope(&self, source: &str, feature_id: i64) -> Option<Envelope> {
        self.envelopes
            .read()
            .get(&(source.to_string(), feature_id))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::ProgressCallback;

    #[test]
    fn test_engine_reports_every_step() {
        let registry = Arc::new(CallbackRegistry::new());
        let engine = SimulatedEngine::new(Arc::clone(&registry)).with_steps(4);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cb: ProgressCallback = Arc::new(move |status, fraction, _| {
            sink.lock().push((status, fraction));
            true
        });
        let key = registry.register(&cb);

        assert_eq!(engine.start_async_op(&AsyncOp::copy("a", "b"), key), 1);
        let seen = seen.lock();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[3], (StatusCode::Finished, 1.0));
        assert_eq!(engine.started(), 1);
    }

    #[test]
    fn test_engine_failure_sets_last_error() {
        let registry = Arc::new(CallbackRegistry::new());
        let engine = SimulatedEngine::new(registry).failing_at(2, StatusCode::CopyFailed);

        assert_eq!(
            engine.start_async_op(&AsyncOp::copy("a", "b"), CallbackKey::NONE),
            0
        );
        assert_eq!(
            engine.last_error().as_deref(),
            Some("copy failed at step 2")
        );
    }

    #[test]
    fn test_renderer_reports_cancel_after_refusal() {
        let registry = Arc::new(CallbackRegistry::new());
        let renderer = SimulatedRenderer::new(Arc::clone(&registry)).with_steps(5);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cb: ProgressCallback = Arc::new(move |status, _, _| {
            sink.lock().push(status);
            false
        });
        let key = registry.register(&cb);

        assert!(renderer.draw(Handle::new(1), DrawState::Normal, key));
        assert_eq!(
            seen.lock().as_slice(),
            &[StatusCode::InProcess, StatusCode::Canceled]
        );
        assert_eq!(renderer.draws_for(Handle::new(1)), vec![DrawState::Normal]);
    }

    #[test]
    fn test_renderer_refuses_invalid_handle() {
        let renderer = SimulatedRenderer::new(Arc::new(CallbackRegistry::new()));
        assert!(!renderer.draw(Handle::INVALID, DrawState::Normal, CallbackKey::NONE));
        assert!(renderer.draws().is_empty());
    }

    #[test]
    fn test_in_memory_features() {
        let features = InMemoryFeatures::new();
        let envelope = Envelope::new(1.0, 2.0, 3.0, 4.0);
        features.insert("ngc://store/roads", 5, envelope);

        assert_eq!(features.feature_envelope("ngc://store/roads", 5), Some(envelope));
        assert_eq!(features.feature_envelope("ngc://store/roads", 6), None);
        assert_eq!(features.remove("ngc://store/roads", 5), Some(envelope));
        assert_eq!(features.feature_envelope("ngc://store/roads", 5), None);
    }
}
