//! Functions the native engine calls into.
//!
//! These are the only places where control arrives from engine threads.
//! Neither lets a panic escape: unwinding across the boundary is undefined
//! behaviour on the engine side.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::error;

use crate::callback::{CallbackKey, CallbackRegistry};
use crate::notify::{panic_message, DispatchReport, NotificationDispatcher};
use crate::status::{ChangeCode, StatusCode};

/// Progress entry point: `(status, fraction, message, key) -> continue`.
#[derive(Debug, Clone)]
pub struct ProgressBridge {
    registry: Arc<CallbackRegistry>,
}

impl ProgressBridge {
    pub fn new(registry: Arc<CallbackRegistry>) -> Self {
        Self { registry }
    }

    /// Route one progress report to the closure registered under `key`.
    ///
    /// Returns `true` for key 0, unknown keys and panicking closures.
    pub fn on_progress(&self, status: i32, fraction: f64, message: &str, key: i32) -> bool {
        let key = CallbackKey::from_raw(key);
        if key.is_none() {
            return true;
        }
        let status = StatusCode::from_wire(status);
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };

        catch_unwind(AssertUnwindSafe(|| {
            self.registry.invoke(key, status, fraction, message)
        }))
        .unwrap_or_else(|payload| {
            error!(
                %key,
                %status,
                panic = %panic_message(payload.as_ref()),
                "Progress callback panicked, continuing"
            );
            true
        })
    }

    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.registry
    }
}

/// Change-notification entry point: `(uri, code)`.
#[derive(Debug, Clone)]
pub struct NotifyBridge {
    dispatcher: Arc<NotificationDispatcher>,
}

impl NotifyBridge {
    pub fn new(dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn on_notify(&self, uri: &str, code: i32) -> DispatchReport {
        let code = ChangeCode::from_wire(code);
        catch_unwind(AssertUnwindSafe(|| self.dispatcher.dispatch(uri, code))).unwrap_or_else(
            |payload| {
                error!(
                    uri,
                    code = code.bits(),
                    panic = %panic_message(payload.as_ref()),
                    "Notification dispatch panicked"
                );
                DispatchReport::default()
            },
        )
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }
}
