//! Consumers of the native change stream.
//!
//! Both consumers sit on the same [`NotificationDispatcher`](crate::notify::NotificationDispatcher)
//! and split the stream with veto masks:
//!
//! ```text
//!                          ┌──────────────────────────┐
//!                     ┌───►│ InvalidationBridge       │──► MapViews: invalidate,
//! NotifyBridge ──►    │    │ veto: TOKEN_*            │    schedule(Preserved | Refill)
//! Dispatcher ─────────┤    └──────────────────────────┘
//!                     │    ┌──────────────────────────┐
//!                     └───►│ AuthFailureNotifier      │──► AuthHandler(s)
//!                          │ veto: everything else    │
//!                          └──────────────────────────┘
//! ```
//!
//! Each consumer also checks relevance itself, so either works when
//! registered with an empty mask.

mod auth;
mod invalidation;
mod uri;

pub use auth::{AuthFailure, AuthFailureNotifier, AuthHandler};
pub use invalidation::{FeatureSource, Invalidation, InvalidationBridge, DEFAULT_SCRATCH_PATH};
pub use uri::{is_under, ChangeUri};
