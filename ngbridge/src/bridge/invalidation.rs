//! Change events to map view redraws.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::uri::{is_under, ChangeUri};
use crate::draw::{DrawState, MapView, MapViews};
use crate::envelope::Envelope;
use crate::notify::{ListenerGuard, NotificationDispatcher, NotifyCallback};
use crate::status::ChangeCode;

/// Default scratch (temporary edit) catalog path.
pub const DEFAULT_SCRATCH_PATH: &str = "ngc://tmp";

/// Geometry lookup in the engine's datastores.
pub trait FeatureSource: Send + Sync {
    /// Envelope of feature `feature_id` in `source`, if it exists.
    fn feature_envelope(&self, source: &str, feature_id: i64) -> Option<Envelope>;
}

/// What the bridge did with one event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Invalidation {
    /// Not map content: token events and scratch URIs.
    Ignored,
    /// A created feature was invalidated and a cache-only repaint scheduled.
    Repaint { envelope: Envelope, views: usize },
    /// Every view was scheduled for a refill.
    Refill { views: usize },
}

/// Translates datasource change events into invalidations on every attached
/// map view.
///
/// A single created feature costs a repaint of its envelope; everything
/// else, including creations whose geometry cannot be resolved, refills.
pub struct InvalidationBridge {
    views: Arc<MapViews>,
    features: Arc<dyn FeatureSource>,
    scratch_path: String,
}

impl InvalidationBridge {
    pub fn new(views: Arc<MapViews>, features: Arc<dyn FeatureSource>) -> Self {
        Self {
            views,
            features,
            scratch_path: DEFAULT_SCRATCH_PATH.to_string(),
        }
    }

    /// Events under this path are ignored.
    pub fn with_scratch_path(mut self, path: impl Into<String>) -> Self {
        self.scratch_path = path.into();
        self
    }

    pub fn scratch_path(&self) -> &str {
        &self.scratch_path
    }

    /// Handle one change event.
    pub fn handle(&self, uri: &str, code: ChangeCode) -> Invalidation {
        if code.is_token_event() {
            trace!(uri, code = code.bits(), "Token event, not map content");
            return Invalidation::Ignored;
        }
        if is_under(uri, &self.scratch_path) {
            trace!(uri, "Scratch source change ignored");
            return Invalidation::Ignored;
        }

        if code == ChangeCode::CREATE_FEATURE {
            if let Some(envelope) = self.created_envelope(uri) {
                let views = self.repaint(&envelope);
                debug!(uri, %envelope, views, "Created feature repainted");
                return Invalidation::Repaint { envelope, views };
            }
            debug!(uri, "Created feature not resolvable, refilling");
        }

        let views = self.refill();
        debug!(uri, code = code.bits(), views, "Views scheduled for refill");
        Invalidation::Refill { views }
    }

    fn created_envelope(&self, uri: &str) -> Option<Envelope> {
        let parsed = ChangeUri::parse(uri);
        let feature_id = parsed.feature_id?;
        self.features
            .feature_envelope(parsed.source, feature_id)
            .filter(Envelope::is_valid)
    }

    fn repaint(&self, envelope: &Envelope) -> usize {
        let mut scheduled = 0;
        for view in self.views.views() {
            if view.shows_scratch() {
                continue;
            }
            view.invalidate(envelope);
            if schedule(&view, DrawState::Preserved) {
                scheduled += 1;
            }
        }
        scheduled
    }

    fn refill(&self) -> usize {
        self.views
            .views()
            .iter()
            .filter(|view| schedule(view, DrawState::Refill))
            .count()
    }

    /// Register with `dispatcher`, vetoing authentication events.
    pub fn attach_to(self: &Arc<Self>, dispatcher: &Arc<NotificationDispatcher>) -> ListenerGuard {
        let bridge = Arc::clone(self);
        let listener: NotifyCallback = Arc::new(move |uri: &str, code: ChangeCode| {
            bridge.handle(uri, code);
        });
        dispatcher.subscribe(ChangeCode::TOKEN_EVENTS, listener)
    }
}

fn schedule(view: &MapView, state: DrawState) -> bool {
    match view.schedule(state) {
        Ok(()) => true,
        Err(e) => {
            warn!(view = %view.id(), %state, error = %e, "Could not schedule draw");
            false
        }
    }
}
