//! The boundary with the native engine.
//!
//! ```text
//!   application                      │  native engine
//!                                    │
//!   Operation::run ── key ──────────►│ start_async_op(op, key)
//!        │                           │        │ worker thread
//!   CallbackRegistry ◄── invoke ── ProgressBridge::on_progress(status, f, msg, key)
//!                                    │
//!   NotificationDispatcher ◄──── NotifyBridge::on_notify(uri, code)
//!                                    │
//!   MapView render thread ──────────►│ MapRenderer::draw(handle, state, key)
//! ```
//!
//! Values cross as plain integers and strings. Status and change codes are
//! decoded on this side, and failures come back as return values plus the
//! engine's last-error string, never as panics.

mod engine;
mod entry;
mod operation;
pub mod simulated;

pub use engine::{AsyncOp, Handle, LastError, NativeEngine};
pub use entry::{NotifyBridge, ProgressBridge};
pub use operation::{Operation, OperationOutcome};
pub use simulated::{InMemoryFeatures, SimulatedEngine, SimulatedRenderer};
