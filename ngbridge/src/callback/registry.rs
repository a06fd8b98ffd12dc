//! The callback key table.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::slot::SlotGuard;
use crate::status::StatusCode;

/// Progress closure signature: `(status, fraction, message) -> continue`.
///
/// `fraction` is in `0.0..=1.0`. Returning `false` asks the native operation
/// to stop at its next checkpoint.
pub type ProgressFn = dyn Fn(StatusCode, f64, &str) -> bool + Send + Sync;

/// Shared progress closure, as registered with the [`CallbackRegistry`].
pub type ProgressCallback = Arc<ProgressFn>;

/// Opaque integer passed to the native engine in place of a closure.
///
/// `0` is reserved and means "no callback".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackKey(i32);

impl CallbackKey {
    /// Key passed to the engine when the caller has no progress closure.
    pub const NONE: CallbackKey = CallbackKey(0);

    /// Wrap a raw key received from the engine.
    pub fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    /// The raw integer sent to the engine.
    pub fn get(self) -> i32 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for CallbackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cb#{}", self.0)
    }
}

/// Identity of a closure, used to make re-registration idempotent.
fn identity(callback: &ProgressCallback) -> usize {
    Arc::as_ptr(callback) as *const () as usize
}

struct Slot {
    callback: Weak<ProgressFn>,
    identity: usize,
    token: CancellationToken,
    /// Outstanding scoped registrations sharing this key.
    holders: usize,
}

struct SlotTable {
    slots: HashMap<CallbackKey, Slot>,
    by_identity: HashMap<usize, CallbackKey>,
    next_key: i32,
}

impl SlotTable {
    fn allocate_key(&mut self) -> CallbackKey {
        loop {
            let raw = self.next_key;
            self.next_key = if raw == i32::MAX { 1 } else { raw + 1 };
            let key = CallbackKey(raw);
            if !self.slots.contains_key(&key) {
                return key;
            }
        }
    }

    fn remove(&mut self, key: CallbackKey) -> Option<Slot> {
        let slot = self.slots.remove(&key)?;
        if self.by_identity.get(&slot.identity) == Some(&key) {
            self.by_identity.remove(&slot.identity);
        }
        Some(slot)
    }

    /// Live key for this closure, dropping the entry if its closure is gone.
    fn live_key(&mut self, callback: &ProgressCallback) -> Option<CallbackKey> {
        let key = *self.by_identity.get(&identity(callback))?;
        let alive = self
            .slots
            .get(&key)
            .map(|slot| slot.callback.strong_count() > 0)
            .unwrap_or(false);
        if alive {
            Some(key)
        } else {
            self.remove(key);
            None
        }
    }
}

/// Thread-safe map from [`CallbackKey`] to progress closure.
///
/// One registry is shared by everything that talks to one engine instance.
/// All methods may be called from any thread; closures are always invoked
/// after the internal lock has been released, so a closure may register or
/// unregister keys (including its own) while running.
pub struct CallbackRegistry {
    table: RwLock<SlotTable>,
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("live", &self.len())
            .finish()
    }
}

impl CallbackRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            table: RwLock::new(SlotTable {
                slots: HashMap::new(),
                by_identity: HashMap::new(),
                next_key: 1,
            }),
        }
    }

    /// Register a closure and return the key to hand to the engine.
    ///
    /// Registering a closure that is already live returns its existing key.
    /// The registry keeps only a weak reference; the caller owns the closure.
    pub fn register(&self, callback: &ProgressCallback) -> CallbackKey {
        self.register_inner(callback, None).0
    }

    /// Register a closure for the duration of one call.
    ///
    /// The returned guard releases the slot when dropped, whatever the
    /// outcome of the call. Nested scopes on the same closure share the key;
    /// the slot goes away when the last guard is dropped.
    pub fn register_scoped(self: &Arc<Self>, callback: &ProgressCallback) -> SlotGuard {
        let (key, token) = self.register_inner(callback, None);
        SlotGuard::new(Arc::clone(self), key, token)
    }

    /// Like [`register_scoped`](Self::register_scoped), cancelling through a
    /// caller-provided token.
    ///
    /// If the closure is already live under another token, that token is kept.
    pub fn register_scoped_with_token(
        self: &Arc<Self>,
        callback: &ProgressCallback,
        token: CancellationToken,
    ) -> SlotGuard {
        let (key, token) = self.register_inner(callback, Some(token));
        SlotGuard::new(Arc::clone(self), key, token)
    }

    fn register_inner(
        &self,
        callback: &ProgressCallback,
        token: Option<CancellationToken>,
    ) -> (CallbackKey, CancellationToken) {
        let mut table = self.table.write();

        if let Some(key) = table.live_key(callback) {
            if let Some(slot) = table.slots.get_mut(&key) {
                slot.holders += 1;
                trace!(%key, holders = slot.holders, "Progress callback re-registered");
                return (key, slot.token.clone());
            }
        }

        let key = table.allocate_key();
        let token = token.unwrap_or_default();
        let id = identity(callback);
        table.slots.insert(
            key,
            Slot {
                callback: Arc::downgrade(callback),
                identity: id,
                token: token.clone(),
                holders: 1,
            },
        );
        table.by_identity.insert(id, key);
        trace!(%key, "Progress callback registered");
        (key, token)
    }

    /// Route a progress report from the engine to the registered closure.
    ///
    /// Returns `true` ("keep going") when the key is unknown or its closure
    /// has been dropped; a lookup miss is never a cancellation request. Once
    /// the slot's token is cancelled this returns `false`, while still
    /// letting the closure observe the report.
    pub fn invoke(&self, key: CallbackKey, status: StatusCode, fraction: f64, message: &str) -> bool {
        let (callback, token) = {
            let table = self.table.read();
            match table.slots.get(&key) {
                Some(slot) => (slot.callback.upgrade(), slot.token.clone()),
                None => {
                    trace!(%key, %status, "Progress for unregistered key, continuing");
                    return true;
                }
            }
        };

        let Some(callback) = callback else {
            trace!(%key, "Progress closure dropped, continuing");
            self.table.write().remove(key);
            return true;
        };

        let keep_going = callback(status, fraction, message);
        if !keep_going && !token.is_cancelled() {
            debug!(%key, %status, "Progress callback requested cancellation");
            token.cancel();
        }
        keep_going && !token.is_cancelled()
    }

    /// Remove a slot. Returns false if it was not registered.
    pub fn unregister(&self, key: CallbackKey) -> bool {
        let removed = self.table.write().remove(key).is_some();
        if removed {
            trace!(%key, "Progress callback unregistered");
        }
        removed
    }

    /// Drop one scoped holder; the slot is removed with its last holder.
    pub(crate) fn release(&self, key: CallbackKey) {
        let mut table = self.table.write();
        let last = match table.slots.get_mut(&key) {
            Some(slot) => {
                slot.holders = slot.holders.saturating_sub(1);
                slot.holders == 0
            }
            None => false,
        };
        if last {
            table.remove(key);
            trace!(%key, "Scoped progress callback released");
        }
    }

    /// Cancellation token of a live slot.
    pub fn token(&self, key: CallbackKey) -> Option<CancellationToken> {
        self.table.read().slots.get(&key).map(|slot| slot.token.clone())
    }

    /// Cancel a live slot. Returns false if the key is not registered.
    pub fn cancel(&self, key: CallbackKey) -> bool {
        match self.token(key) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Returns true if the key is registered.
    pub fn contains(&self, key: CallbackKey) -> bool {
        self.table.read().slots.contains_key(&key)
    }

    /// Number of registered slots.
    pub fn len(&self) -> usize {
        self.table.read().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
