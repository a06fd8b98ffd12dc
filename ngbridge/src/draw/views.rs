//! The set of attached map views.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::info;

use super::state::DrawState;
use super::view::{MapRenderer, MapView, MapViewOptions};
use super::MapViewId;
use crate::callback::CallbackRegistry;
use crate::envelope::Envelope;
use crate::error::{BridgeError, BridgeResult};

/// All map views rendered through one native renderer.
///
/// Views are looked up by [`MapViewId`]; the notification bridge walks the
/// whole set when a datasource changes.
pub struct MapViews {
    views: DashMap<MapViewId, Arc<MapView>>,
    registry: Arc<CallbackRegistry>,
    renderer: Arc<dyn MapRenderer>,
    runtime: tokio::runtime::Handle,
    next_id: AtomicU32,
}

impl MapViews {
    /// Create an empty set whose timers run on `runtime`.
    pub fn new(
        registry: Arc<CallbackRegistry>,
        renderer: Arc<dyn MapRenderer>,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        Self {
            views: DashMap::new(),
            registry,
            renderer,
            runtime,
            next_id: AtomicU32::new(1),
        }
    }

    /// Attach a new view and start its scheduler.
    pub fn attach(&self, options: MapViewOptions) -> BridgeResult<Arc<MapView>> {
        let id = MapViewId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let view = Arc::new(MapView::spawn(
            id,
            options,
            Arc::clone(&self.registry),
            Arc::clone(&self.renderer),
            &self.runtime,
        )?);
        self.views.insert(id, Arc::clone(&view));
        info!(view = %id, handle = %options.handle, "Map view attached");
        Ok(view)
    }

    /// Detach a view, cancelling anything it has pending or in flight.
    pub fn detach(&self, id: MapViewId) -> BridgeResult<()> {
        let (_, view) = self
            .views
            .remove(&id)
            .ok_or(BridgeError::UnknownMapView(id))?;
        view.detach();
        info!(view = %id, "Map view detached");
        Ok(())
    }

    pub fn get(&self, id: MapViewId) -> Option<Arc<MapView>> {
        self.views.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Schedule a draw on one view; `None` uses the view's own debounce.
    pub fn schedule_draw(
        &self,
        id: MapViewId,
        state: DrawState,
        debounce: Option<Duration>,
    ) -> BridgeResult<()> {
        let view = self.get(id).ok_or(BridgeError::UnknownMapView(id))?;
        match debounce {
            Some(debounce) => view.schedule_with(state, debounce),
            None => view.schedule(state),
        }
    }

    pub fn invalidate(&self, id: MapViewId, envelope: &Envelope) -> BridgeResult<()> {
        let view = self.get(id).ok_or(BridgeError::UnknownMapView(id))?;
        view.invalidate(envelope);
        Ok(())
    }

    /// Snapshot of the attached views, ordered by id.
    pub fn views(&self) -> Vec<Arc<MapView>> {
        let mut views: Vec<_> = self
            .views
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        views.sort_by_key(|view| view.id());
        views
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Registry the drawing callbacks are installed in.
    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.registry
    }
}

impl Drop for MapViews {
    fn drop(&mut self) {
        for entry in self.views.iter() {
            entry.value().detach();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{Handle, SimulatedRenderer};

    fn views() -> MapViews {
        let registry = Arc::new(CallbackRegistry::new());
        MapViews::new(
            Arc::clone(&registry),
            Arc::new(SimulatedRenderer::new(registry)),
            tokio::runtime::Handle::current(),
        )
    }

    #[tokio::test]
    async fn test_attach_assigns_increasing_ids() {
        let views = views();
        let a = views.attach(MapViewOptions::new(Handle::new(10))).unwrap();
        let b = views.attach(MapViewOptions::new(Handle::new(11))).unwrap();

        assert!(a.id() < b.id());
        assert_eq!(views.len(), 2);
        let ids: Vec<_> = views.views().iter().map(|v| v.id()).collect();
        assert_eq!(ids, vec![a.id(), b.id()]);
    }

    #[tokio::test]
    async fn test_detach_unknown_view() {
        let views = views();
        let err = views.detach(MapViewId::new(42)).unwrap_err();
        assert!(matches!(err, BridgeError::UnknownMapView(id) if id.get() == 42));
    }

    #[tokio::test]
    async fn test_detached_view_rejects_schedule() {
        let views = views();
        let view = views.attach(MapViewOptions::new(Handle::new(1))).unwrap();
        let id = view.id();

        views.detach(id).unwrap();
        assert!(view.is_detached());
        assert!(views.get(id).is_none());
        assert!(matches!(
            view.schedule(DrawState::Normal),
            Err(BridgeError::SchedulerStopped(_))
        ));
        assert!(matches!(
            views.schedule_draw(id, DrawState::Normal, None),
            Err(BridgeError::UnknownMapView(_))
        ));
    }

    #[tokio::test]
    async fn test_invalidate_forwards_to_renderer() {
        let registry = Arc::new(CallbackRegistry::new());
        let renderer = Arc::new(SimulatedRenderer::new(Arc::clone(&registry)));
        let views = MapViews::new(
            registry,
            Arc::clone(&renderer) as Arc<dyn MapRenderer>,
            tokio::runtime::Handle::current(),
        );
        let view = views.attach(MapViewOptions::new(Handle::new(5))).unwrap();

        let envelope = Envelope::new(0.0, 0.0, 10.0, 10.0);
        views.invalidate(view.id(), &envelope).unwrap();

        assert_eq!(renderer.invalidations(), vec![(Handle::new(5), envelope)]);
    }
}
