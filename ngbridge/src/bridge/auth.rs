//! Authentication failure notifications.
//!
//! The engine reports expired or changed access tokens on the same
//! `(uri, code)` stream as data changes. This is the consumer for those:
//! everything else is left to the [`super::InvalidationBridge`].

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, info, trace};

use crate::notify::{panic_message, ListenerGuard, NotificationDispatcher, NotifyCallback};
use crate::status::ChangeCode;

/// A token event for one service URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    pub url: String,
    pub code: ChangeCode,
}

impl AuthFailure {
    pub fn is_expired(&self) -> bool {
        self.code.contains(ChangeCode::TOKEN_EXPIRED)
    }

    pub fn is_changed(&self) -> bool {
        self.code.contains(ChangeCode::TOKEN_CHANGED)
    }
}

/// Callback for [`AuthFailure`]s, usually a "sign in again" prompt.
pub type AuthHandler = Arc<dyn Fn(&AuthFailure) + Send + Sync>;

/// Forwards token events to its handlers, in registration order.
#[derive(Default)]
pub struct AuthFailureNotifier {
    handlers: RwLock<Vec<AuthHandler>>,
}

impl AuthFailureNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler(&self, handler: AuthHandler) {
        self.handlers.write().push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Handle one change event. Returns false if it is not a token event.
    pub fn handle(&self, uri: &str, code: ChangeCode) -> bool {
        if !code.is_token_event() {
            trace!(uri, code = code.bits(), "Not an authentication event");
            return false;
        }

        let failure = AuthFailure {
            url: uri.to_string(),
            code: code & ChangeCode::TOKEN_EVENTS,
        };
        info!(
            url = uri,
            expired = failure.is_expired(),
            changed = failure.is_changed(),
            "Authentication failure"
        );

        let handlers = self.handlers.read().clone();
        for handler in handlers {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(&failure))) {
                error!(
                    url = uri,
                    panic = %panic_message(payload.as_ref()),
                    "Authentication failure handler panicked"
                );
            }
        }
        true
    }

    /// Register with `dispatcher`, vetoing every non-token code.
    pub fn attach_to(self: &Arc<Self>, dispatcher: &Arc<NotificationDispatcher>) -> ListenerGuard {
        let notifier = Arc::clone(self);
        let listener: NotifyCallback = Arc::new(move |uri: &str, code: ChangeCode| {
            notifier.handle(uri, code);
        });
        dispatcher.subscribe(ChangeCode::all().difference(ChangeCode::TOKEN_EVENTS), listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recording(notifier: &AuthFailureNotifier) -> Arc<Mutex<Vec<AuthFailure>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        notifier.add_handler(Arc::new(move |failure: &AuthFailure| {
            sink.lock().push(failure.clone());
        }));
        seen
    }

    #[test]
    fn test_token_events_reach_handlers() {
        let notifier = AuthFailureNotifier::new();
        let seen = recording(&notifier);

        assert!(notifier.handle("https://tiles.example.com", ChangeCode::TOKEN_EXPIRED));
        assert!(!notifier.handle("ngc://store#1", ChangeCode::CREATE_FEATURE));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].url, "https://tiles.example.com");
        assert!(seen[0].is_expired());
        assert!(!seen[0].is_changed());
    }

    #[test]
    fn test_panicking_handler_does_not_stop_others() {
        let notifier = AuthFailureNotifier::new();
        notifier.add_handler(Arc::new(|_: &AuthFailure| panic!("no ui")));
        let seen = recording(&notifier);

        notifier.handle("https://x", ChangeCode::TOKEN_CHANGED);
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(notifier.handler_count(), 2);
    }

    #[test]
    fn test_attached_notifier_only_hears_token_events() {
        let notifier = Arc::new(AuthFailureNotifier::new());
        let seen = recording(&notifier);
        let dispatcher = Arc::new(NotificationDispatcher::new());
        let guard = notifier.attach_to(&dispatcher);

        assert_eq!(dispatcher.dispatch("ngc://store#5", ChangeCode::CREATE_FEATURE).vetoed, 1);
        assert_eq!(dispatcher.dispatch("https://x", ChangeCode::TOKEN_EXPIRED).delivered, 1);
        assert_eq!(seen.lock().len(), 1);

        drop(guard);
        assert_eq!(dispatcher.listener_count(), 0);
    }
}
