//! Integer-keyed progress callbacks for calls across the native boundary.
//!
//! The native engine cannot hold a managed closure, only an integer. The
//! [`CallbackRegistry`] hands out that integer ([`CallbackKey`]) and maps it
//! back to the closure when the engine calls in from one of its worker
//! threads.
//!
//! # Lifetimes
//!
//! ```text
//! Operation::run ──► register_scoped ──► SlotGuard ──(drop)──► release
//!                                          │
//! native worker ──► ProgressBridge ──► invoke(key, ...) ──► closure
//!                                          │
//! MapView ─────────► DrawingSlot ──(install / remove / detach)
//! ```
//!
//! The registry only holds weak references: whoever registers a closure keeps
//! it alive. A key whose closure is gone behaves exactly like a missing key.
//!
//! # Cancellation
//!
//! Each slot carries a [`CancellationToken`](tokio_util::sync::CancellationToken).
//! A closure returning `false` cancels it, and from then on every invocation
//! on that key answers `false` to the engine. Cancellation is cooperative:
//! the engine notices at its next progress checkpoint.

mod registry;
mod slot;

pub use registry::{CallbackKey, CallbackRegistry, ProgressCallback, ProgressFn};
pub use slot::{DrawingSlot, SlotGuard};
