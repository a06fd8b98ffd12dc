//! ngbridge - callback, notification and draw scheduling for a native GIS engine
//!
//! This library is the managed side of the boundary with a native geospatial
//! engine. The engine itself (datastores, rendering, transforms) is opaque and
//! reached through integer handles; what lives here is the machinery that makes
//! calls across that boundary safe from any thread:
//!
//! - [`callback`]: integer-keyed progress callbacks with cooperative cancellation
//! - [`notify`]: native change events fanned out to in-process listeners
//! - [`draw`]: per map view debounced draw scheduling and the render thread
//! - [`bridge`]: change events translated into map view invalidations
//! - [`native`]: the engine boundary (traits, entry points, simulated engine)
//!
//! # Example
//!
//! ```ignore
//! use ngbridge::callback::CallbackRegistry;
//! use ngbridge::native::{AsyncOp, Operation};
//!
//! let registry = Arc::new(CallbackRegistry::new());
//! let outcome = Operation::new(AsyncOp::copy("ngc://a", "ngc://b"))
//!     .with_progress(Arc::new(|status, fraction, _msg| {
//!         println!("{status} {:.0}%", fraction * 100.0);
//!         true
//!     }))
//!     .run(&engine, &registry);
//! ```

pub mod bridge;
pub mod callback;
pub mod config;
pub mod draw;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod native;
pub mod notify;
pub mod status;

pub use envelope::Envelope;
pub use error::{BridgeError, BridgeResult};
pub use status::{ChangeCode, StatusCode};

/// Version of the ngbridge library and CLI.
///
/// This is synchronized across all components in the workspace.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
