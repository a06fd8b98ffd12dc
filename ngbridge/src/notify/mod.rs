//! Native change notifications fanned out to in-process listeners.
//!
//! The engine reports every change as a single `(uri, code)` call on whatever
//! thread made the change. The [`NotificationDispatcher`] delivers it,
//! synchronously and in registration order, to each listener whose mask
//! allows it.
//!
//! # Veto masks
//!
//! A listener's mask names the codes it does **not** want: the event is
//! delivered iff `mask & code == 0`. A listener registered with
//! `CREATE_FEATURE | CHANGE_FEATURE` hears about deletions but not about
//! creations or changes, and a listener with an empty mask hears everything.
//!
//! ```
//! use ngbridge::notify::delivers;
//! use ngbridge::ChangeCode;
//!
//! let mask = ChangeCode::CREATE_FEATURE | ChangeCode::CHANGE_FEATURE;
//! assert!(!delivers(mask, ChangeCode::CREATE_FEATURE));
//! assert!(delivers(mask, ChangeCode::DELETE_FEATURE));
//! ```

mod dispatcher;

pub(crate) use dispatcher::panic_message;
pub use dispatcher::{
    delivers, DispatchReport, ListenerGuard, NotificationDispatcher, NotifyCallback, NotifyFn,
};
