//! Ownership wrappers around registry slots.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::registry::{CallbackKey, CallbackRegistry, ProgressCallback};

/// A slot registered for the duration of one outer call.
///
/// Dropping the guard releases the slot, so the key stops resolving as soon
/// as the call that registered it returns, whether it succeeded, failed or
/// was cancelled.
#[must_use = "dropping the guard unregisters the callback immediately"]
pub struct SlotGuard {
    registry: Arc<CallbackRegistry>,
    key: CallbackKey,
    token: CancellationToken,
}

impl SlotGuard {
    pub(super) fn new(
        registry: Arc<CallbackRegistry>,
        key: CallbackKey,
        token: CancellationToken,
    ) -> Self {
        Self {
            registry,
            key,
            token,
        }
    }

    /// Key to pass to the engine.
    pub fn key(&self) -> CallbackKey {
        self.key
    }

    /// Token cancelled when the closure answers `false`.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.registry.release(self.key);
    }
}

impl std::fmt::Debug for SlotGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotGuard")
            .field("key", &self.key)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

#[derive(Clone)]
struct Installed {
    key: CallbackKey,
    callback: ProgressCallback,
    token: CancellationToken,
}

/// The persistent progress slot used by a map view's renderer.
///
/// Unlike scoped slots it outlives single draw calls. It is replaced when a
/// different closure is installed or when the current one was cancelled,
/// removed explicitly after a terminal draw status, and removed for good
/// when the owning view detaches (or the slot is dropped).
pub struct DrawingSlot {
    registry: Arc<CallbackRegistry>,
    installed: Mutex<Option<Installed>>,
}

impl DrawingSlot {
    pub fn new(registry: Arc<CallbackRegistry>) -> Self {
        Self {
            registry,
            installed: Mutex::new(None),
        }
    }

    /// Make `callback` the drawing callback and return its key.
    ///
    /// Re-installing the same live, uncancelled closure keeps its key.
    /// Anything else replaces the previous entry with a fresh one.
    pub fn install(&self, callback: &ProgressCallback) -> CallbackKey {
        let mut installed = self.installed.lock();

        if let Some(current) = installed.as_ref() {
            let reusable = Arc::ptr_eq(&current.callback, callback)
                && !current.token.is_cancelled()
                && self.registry.contains(current.key);
            if reusable {
                return current.key;
            }
            self.registry.unregister(current.key);
            debug!(key = %current.key, "Drawing callback replaced");
        }

        let key = self.registry.register(callback);
        let token = self.registry.token(key).unwrap_or_default();
        *installed = Some(Installed {
            key,
            callback: Arc::clone(callback),
            token,
        });
        key
    }

    /// Remove the drawing callback from the registry.
    pub fn remove(&self) -> Option<CallbackKey> {
        let removed = self.installed.lock().take()?;
        self.registry.unregister(removed.key);
        Some(removed.key)
    }

    /// Ask the in-flight draw to stop at its next progress report.
    ///
    /// The slot stays registered so the renderer's next report is answered
    /// with `false` rather than the "unknown key, continue" default.
    pub fn cancel(&self) -> bool {
        match self.installed.lock().as_ref() {
            Some(current) => {
                current.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Key currently installed, if any.
    pub fn key(&self) -> Option<CallbackKey> {
        self.installed.lock().as_ref().map(|i| i.key)
    }

    pub fn is_installed(&self) -> bool {
        self.installed.lock().is_some()
    }
}

impl Drop for DrawingSlot {
    fn drop(&mut self) {
        self.remove();
    }
}
