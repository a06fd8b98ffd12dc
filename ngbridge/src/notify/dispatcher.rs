//! Listener table and event fan-out.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, error, trace};

use crate::status::ChangeCode;

/// Listener signature: `(uri, code)`.
pub type NotifyFn = dyn Fn(&str, ChangeCode) + Send + Sync;

/// Shared listener closure.
pub type NotifyCallback = Arc<NotifyFn>;

/// Veto test: a listener with `mask` receives `code` iff they share no bits.
pub fn delivers(mask: ChangeCode, code: ChangeCode) -> bool {
    !mask.intersects(code)
}

fn identity(callback: &NotifyCallback) -> usize {
    Arc::as_ptr(callback) as *const () as usize
}

#[derive(Clone)]
struct Entry {
    listener: Weak<NotifyFn>,
    identity: usize,
    mask: ChangeCode,
}

impl Entry {
    fn is_stale(&self) -> bool {
        self.listener.strong_count() == 0
    }
}

/// What happened to one dispatched event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Listeners that were called and returned normally.
    pub delivered: usize,
    /// Listeners skipped because their mask intersects the code.
    pub vetoed: usize,
    /// Listeners that panicked.
    pub failed: usize,
    /// Entries whose listener had been dropped; pruned by this dispatch.
    pub stale: usize,
}

/// Registration-ordered table of notification listeners.
///
/// Holds weak references only: a listener stays registered while its owner
/// keeps the [`NotifyCallback`] alive, or until it is removed. Use
/// [`subscribe`](Self::subscribe) for a guard that does both.
#[derive(Default)]
pub struct NotificationDispatcher {
    entries: RwLock<Vec<Entry>>,
}

impl fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener with its veto mask.
    ///
    /// Returns false (and changes nothing) if the same listener is already
    /// registered with the same mask.
    pub fn add_listener(&self, mask: ChangeCode, callback: &NotifyCallback) -> bool {
        let id = identity(callback);
        let mut entries = self.entries.write();
        entries.retain(|entry| !entry.is_stale());

        if entries
            .iter()
            .any(|entry| entry.identity == id && entry.mask == mask)
        {
            trace!(mask = mask.bits(), "Duplicate listener rejected");
            return false;
        }

        entries.push(Entry {
            listener: Arc::downgrade(callback),
            identity: id,
            mask,
        });
        debug!(
            mask = mask.bits(),
            listeners = entries.len(),
            "Notification listener added"
        );
        true
    }

    /// Remove the first entry for this listener. Returns false if absent.
    pub fn remove_listener(&self, callback: &NotifyCallback) -> bool {
        let id = identity(callback);
        let mut entries = self.entries.write();
        match entries.iter().position(|entry| entry.identity == id) {
            Some(index) => {
                entries.remove(index);
                debug!(listeners = entries.len(), "Notification listener removed");
                true
            }
            None => false,
        }
    }

    /// Register `callback` and keep it alive until the guard is dropped.
    pub fn subscribe(self: &Arc<Self>, mask: ChangeCode, callback: NotifyCallback) -> ListenerGuard {
        self.add_listener(mask, &callback);
        ListenerGuard {
            dispatcher: Arc::downgrade(self),
            callback,
            mask,
        }
    }

    fn remove_entry(&self, callback: &NotifyCallback, mask: ChangeCode) {
        let id = identity(callback);
        let mut entries = self.entries.write();
        if let Some(index) = entries
            .iter()
            .position(|entry| entry.identity == id && entry.mask == mask)
        {
            entries.remove(index);
        }
    }

    /// Deliver one native event to every listener whose mask allows it.
    ///
    /// Runs on the caller's thread. Listeners are called outside the table
    /// lock, so they may add or remove listeners; such changes apply from the
    /// next event on. A panicking listener is logged and skipped.
    pub fn dispatch(&self, uri: &str, code: ChangeCode) -> DispatchReport {
        let snapshot: Vec<Entry> = self.entries.read().clone();
        let mut report = DispatchReport::default();

        for entry in &snapshot {
            if !delivers(entry.mask, code) {
                report.vetoed += 1;
                continue;
            }
            let Some(listener) = entry.listener.upgrade() else {
                report.stale += 1;
                continue;
            };

            match panic::catch_unwind(AssertUnwindSafe(|| listener(uri, code))) {
                Ok(()) => report.delivered += 1,
                Err(payload) => {
                    report.failed += 1;
                    error!(
                        uri,
                        code = code.bits(),
                        panic = %panic_message(payload.as_ref()),
                        "Notification listener panicked"
                    );
                }
            }
        }

        if report.stale > 0 {
            self.entries.write().retain(|entry| !entry.is_stale());
        }

        trace!(
            uri,
            code = code.bits(),
            delivered = report.delivered,
            vetoed = report.vetoed,
            "Notification dispatched"
        );
        report
    }

    /// Number of registered entries, including ones whose listener was dropped
    /// but not yet pruned.
    pub fn listener_count(&self) -> usize {
        self.entries.read().len()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Keeps a listener alive and registered; unregisters on drop.
#[must_use = "dropping the guard unregisters the listener"]
pub struct ListenerGuard {
    dispatcher: Weak<NotificationDispatcher>,
    callback: NotifyCallback,
    mask: ChangeCode,
}

impl ListenerGuard {
    pub fn mask(&self) -> ChangeCode {
        self.mask
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.upgrade() {
            dispatcher.remove_entry(&self.callback, self.mask);
        }
    }
}

impl fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerGuard")
            .field("mask", &self.mask)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Log = Arc<Mutex<Vec<(String, ChangeCode)>>>;

    fn recording_listener() -> (NotifyCallback, Log) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = Arc::clone(&log);
        let callback: NotifyCallback = Arc::new(move |uri: &str, code: ChangeCode| {
            log_clone.lock().push((uri.to_string(), code));
        });
        (callback, log)
    }

    #[test]
    fn test_veto_semantics_end_to_end() {
        let dispatcher = NotificationDispatcher::new();
        let (listener, log) = recording_listener();
        dispatcher.add_listener(
            ChangeCode::CREATE_FEATURE | ChangeCode::CHANGE_FEATURE,
            &listener,
        );

        dispatcher.dispatch("ngc://store#5", ChangeCode::CREATE_FEATURE);
        assert!(log.lock().is_empty());

        dispatcher.dispatch("ngc://store#5", ChangeCode::DELETE_FEATURE);
        let log = log.lock();
        assert_eq!(log.len(), 1);
        assert_eq!(
            log[0],
            ("ngc://store#5".to_string(), ChangeCode::DELETE_FEATURE)
        );
    }

    #[test]
    fn test_empty_mask_receives_everything() {
        let dispatcher = NotificationDispatcher::new();
        let (listener, log) = recording_listener();
        dispatcher.add_listener(ChangeCode::empty(), &listener);

        dispatcher.dispatch("a", ChangeCode::CREATE_FEATURE);
        dispatcher.dispatch("b", ChangeCode::TOKEN_EXPIRED);
        dispatcher.dispatch("c", ChangeCode::empty());
        assert_eq!(log.lock().len(), 3);
    }

    #[test]
    fn test_duplicate_pair_rejected() {
        let dispatcher = NotificationDispatcher::new();
        let (listener, log) = recording_listener();

        assert!(dispatcher.add_listener(ChangeCode::TOKEN_EXPIRED, &listener));
        assert!(!dispatcher.add_listener(ChangeCode::TOKEN_EXPIRED, &listener));
        assert_eq!(dispatcher.listener_count(), 1);

        dispatcher.dispatch("ngc://store", ChangeCode::CHANGE_FEATURE);
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn test_same_listener_different_masks_both_kept() {
        let dispatcher = NotificationDispatcher::new();
        let (listener, log) = recording_listener();

        assert!(dispatcher.add_listener(ChangeCode::TOKEN_EXPIRED, &listener));
        assert!(dispatcher.add_listener(ChangeCode::TOKEN_CHANGED, &listener));

        dispatcher.dispatch("x", ChangeCode::CREATE_FEATURE);
        assert_eq!(log.lock().len(), 2);
    }

    #[test]
    fn test_registration_order() {
        let dispatcher = NotificationDispatcher::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let listeners: Vec<NotifyCallback> = (0..5)
            .map(|i| {
                let order = Arc::clone(&order);
                Arc::new(move |_: &str, _: ChangeCode| order.lock().push(i)) as NotifyCallback
            })
            .collect();
        for listener in &listeners {
            dispatcher.add_listener(ChangeCode::empty(), listener);
        }

        dispatcher.dispatch("x", ChangeCode::CHANGE_MAP);
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_remove_listener() {
        let dispatcher = NotificationDispatcher::new();
        let (listener, log) = recording_listener();
        dispatcher.add_listener(ChangeCode::empty(), &listener);

        assert!(dispatcher.remove_listener(&listener));
        assert!(!dispatcher.remove_listener(&listener));

        dispatcher.dispatch("x", ChangeCode::CREATE_FEATURE);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let dispatcher = NotificationDispatcher::new();
        let boom: NotifyCallback = Arc::new(|_: &str, _: ChangeCode| panic!("listener bug"));
        let (listener, log) = recording_listener();
        dispatcher.add_listener(ChangeCode::empty(), &boom);
        dispatcher.add_listener(ChangeCode::empty(), &listener);

        let report = dispatcher.dispatch("x", ChangeCode::DELETE_FEATURE);
        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn test_dropped_listener_is_pruned() {
        let dispatcher = NotificationDispatcher::new();
        let (listener, _) = recording_listener();
        dispatcher.add_listener(ChangeCode::empty(), &listener);
        drop(listener);

        let report = dispatcher.dispatch("x", ChangeCode::CREATE_FEATURE);
        assert_eq!(report.stale, 1);
        assert_eq!(report.delivered, 0);
        assert_eq!(dispatcher.listener_count(), 0);
    }

    #[test]
    fn test_subscribe_guard_unregisters_on_drop() {
        let dispatcher = Arc::new(NotificationDispatcher::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let guard = dispatcher.subscribe(
            ChangeCode::TOKEN_EVENTS,
            Arc::new(move |_: &str, _: ChangeCode| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(guard.mask(), ChangeCode::TOKEN_EVENTS);

        dispatcher.dispatch("x", ChangeCode::CREATE_FEATURE);
        drop(guard);
        dispatcher.dispatch("x", ChangeCode::CREATE_FEATURE);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.listener_count(), 0);
    }

    #[test]
    fn test_listener_may_register_during_dispatch() {
        let dispatcher = Arc::new(NotificationDispatcher::new());
        let (late, late_log) = recording_listener();

        let dispatcher_clone = Arc::clone(&dispatcher);
        let late_clone = Arc::clone(&late);
        let registrar: NotifyCallback = Arc::new(move |_: &str, _: ChangeCode| {
            dispatcher_clone.add_listener(ChangeCode::empty(), &late_clone);
        });
        dispatcher.add_listener(ChangeCode::empty(), &registrar);

        dispatcher.dispatch("first", ChangeCode::CREATE_FEATURE);
        assert!(late_log.lock().is_empty());

        dispatcher.dispatch("second", ChangeCode::CREATE_FEATURE);
        assert_eq!(late_log.lock().len(), 1);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_delivery_iff_mask_and_code_disjoint(mask in any::<u32>(), code in any::<u32>()) {
                let dispatcher = NotificationDispatcher::new();
                let (listener, log) = recording_listener();
                dispatcher.add_listener(ChangeCode::from_bits_retain(mask), &listener);

                let report = dispatcher.dispatch("ngc://p", ChangeCode::from_bits_retain(code));

                let expected = mask & code == 0;
                prop_assert_eq!(log.lock().len() == 1, expected);
                prop_assert_eq!(report.delivered == 1, expected);
                prop_assert_eq!(report.vetoed == 1, !expected);
            }

            #[test]
            fn test_delivers_matches_bit_test(mask in 0u32..(1 << 20), code in 0u32..(1 << 20)) {
                prop_assert_eq!(
                    delivers(ChangeCode::from_bits_retain(mask), ChangeCode::from_bits_retain(code)),
                    mask & code == 0
                );
            }
        }
    }
}
