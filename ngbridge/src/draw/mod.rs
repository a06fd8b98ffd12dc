//! Debounced draw scheduling for map views.
//!
//! Invalidations can arrive far faster than a map can be rendered: every
//! feature edit, every layer change and every pan produces one. Each
//! [`MapView`] folds them into at most one pending draw and hands that to a
//! dedicated render thread once things go quiet.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            MapView                               │
//! │                                                                  │
//! │  schedule(S) ──► DrawCommand ──► ┌─────────────┐                 │
//! │  (any thread)    (unbounded)     │ Timer task  │ coalesce, wait  │
//! │                                  │ (tokio)     │ for fire_at     │
//! │                                  └──────┬──────┘                 │
//! │                                         │ RenderMsg              │
//! │                                         ▼                        │
//! │                                  ┌─────────────┐                 │
//! │                                  │Render thread│ install slot,   │
//! │                                  │ (std)       │ MapRenderer::draw│
//! │                                  └──────┬──────┘                 │
//! │                                         │ progress(key)          │
//! │  native renderer ──► ProgressBridge ──► DrawingSlot ──► Idle     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing is shared between the timer and the producers except the
//! channel, so there is no "cancel the old timer, start a new one" race:
//! the timer task simply moves its deadline.
//!
//! # Coalescing
//!
//! A second `schedule` before the timer fires moves the deadline to
//! `now + debounce` and merges the states with [`DrawState::coalesce`]:
//! the pending state never gets cheaper, and `Preserved` never replaces a
//! pending `Normal`, `Refill` or `Redraw`.

mod metrics;
mod scheduler;
mod state;
mod view;
mod views;

use std::fmt;
use std::time::Duration;

pub use metrics::{DrawMetrics, DrawMetricsSnapshot};
pub use state::{DrawState, ScheduledDraw};
pub use view::{DrawListener, DrawStatus, MapRenderer, MapView, MapViewOptions};
pub use views::MapViews;

/// Default quiet period before a scheduled draw fires.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(350);

/// Identifier of an attached map view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MapViewId(u32);

impl MapViewId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for MapViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "map#{}", self.0)
    }
}
