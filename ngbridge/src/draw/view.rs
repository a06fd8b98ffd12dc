//! A single map view: scheduling front end, render thread and drawing slot.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::metrics::{DrawMetrics, DrawMetricsSnapshot};
use super::scheduler::{run_timer, DrawCommand, RenderMsg};
use super::state::DrawState;
use super::{MapViewId, DEFAULT_DEBOUNCE};
use crate::callback::{CallbackKey, CallbackRegistry, DrawingSlot, ProgressCallback};
use crate::envelope::Envelope;
use crate::error::{BridgeError, BridgeResult};
use crate::native::Handle;
use crate::status::StatusCode;

/// The native renderer behind every map view.
///
/// Called from the view's render thread only.
pub trait MapRenderer: Send + Sync + 'static {
    /// Start drawing `map`.
    ///
    /// Progress goes back through [`crate::native::ProgressBridge`] with
    /// `callback`; the draw is over when a terminal status is reported.
    /// Returns false if the draw could not be started at all.
    fn draw(&self, map: Handle, state: DrawState, callback: CallbackKey) -> bool;

    /// Mark a region of `map` dirty so the next draw re-renders it.
    fn invalidate(&self, map: Handle, envelope: &Envelope);
}

/// Observer for a view's draw progress, usually the UI surface.
///
/// Called on whatever thread the native renderer reports from.
pub trait DrawListener: Send + Sync {
    fn on_draw_progress(&self, _view: MapViewId, _status: StatusCode, _fraction: f64, _message: &str) {}

    fn on_draw_complete(&self, _view: MapViewId, _state: DrawState, _status: StatusCode) {}
}

/// Settings for one map view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapViewOptions {
    /// Native map handle the view renders.
    pub handle: Handle,
    /// Debounce used by [`MapView::schedule`].
    pub debounce: Duration,
    /// The view renders the scratch (temporary edit) source; change-driven
    /// repaints skip it.
    pub shows_scratch: bool,
}

impl MapViewOptions {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            debounce: DEFAULT_DEBOUNCE,
            shows_scratch: false,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn showing_scratch(mut self) -> Self {
        self.shows_scratch = true;
        self
    }
}

/// Where a view is in its draw cycle.
///
/// A draw moves from `pending` to `queued` when its timer fires and from
/// `queued` to `rendering` when the render thread takes it; each move
/// happens under one lock, so a draw is always visible in exactly one stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawStatus {
    /// State of the debounced draw waiting for its timer.
    pub pending: Option<DrawState>,
    /// State handed to the render thread but not started yet.
    pub queued: Option<DrawState>,
    /// State of the draw the renderer is working on.
    pub rendering: Option<DrawState>,
}

impl DrawStatus {
    pub fn is_idle(&self) -> bool {
        self.pending.is_none() && self.queued.is_none() && self.rendering.is_none()
    }
}

/// State shared by the view, its timer task, its render thread and its
/// drawing callback.
pub(crate) struct ViewShared {
    id: MapViewId,
    handle: Handle,
    status: Mutex<DrawStatus>,
    /// Bumped by every cancel; draws requested before it are dropped.
    generation: AtomicU64,
    metrics: DrawMetrics,
    slot: DrawingSlot,
    listener: RwLock<Option<Arc<dyn DrawListener>>>,
}

impl ViewShared {
    pub(crate) fn id(&self) -> MapViewId {
        self.id
    }

    pub(crate) fn metrics(&self) -> &DrawMetrics {
        &self.metrics
    }

    pub(crate) fn set_pending(&self, state: Option<DrawState>) {
        self.status.lock().pending = state;
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Move a fired draw from `pending` to `queued` and send it to the
    /// render thread. Draws from before the last cancel are dropped.
    ///
    /// Returns false once the render thread is gone.
    pub(crate) fn hand_over(
        &self,
        state: DrawState,
        generation: u64,
        render_tx: &mpsc::UnboundedSender<RenderMsg>,
    ) -> bool {
        let mut status = self.status.lock();
        status.pending = None;
        if generation != self.generation() {
            debug!(view = %self.id, %state, "Cancelled draw dropped at fire time");
            return true;
        }
        status.queued = Some(match status.queued {
            Some(queued) => queued.coalesce(state),
            None => state,
        });
        self.metrics.draw_fired();
        render_tx.send(RenderMsg::Draw { state, generation }).is_ok()
    }

    /// Forget every draw not yet started and invalidate those in flight
    /// through the channels.
    fn cancel_queued(&self) {
        let mut status = self.status.lock();
        self.generation.fetch_add(1, Ordering::SeqCst);
        status.pending = None;
        status.queued = None;
    }

    /// Take everything the render thread has been sent so far, merged into
    /// one draw, and mark it as rendering.
    ///
    /// Returns `None` when nothing current is left to draw, or `Err(())`
    /// when a stop was received.
    fn take_queued(
        &self,
        first: (DrawState, u64),
        requests: &mut mpsc::UnboundedReceiver<RenderMsg>,
    ) -> Result<Option<(DrawState, u64)>, ()> {
        let mut status = self.status.lock();
        let current = self.generation();
        let mut merged = Some(first).filter(|(_, generation)| *generation == current);
        let mut stopped = false;

        while let Ok(message) = requests.try_recv() {
            match message {
                RenderMsg::Draw { state, generation } if generation == current => {
                    merged = Some(match merged {
                        Some((held, _)) => {
                            self.metrics.draw_coalesced();
                            (held.coalesce(state), generation)
                        }
                        None => (state, generation),
                    });
                }
                RenderMsg::Draw { state, .. } => {
                    debug!(view = %self.id, %state, "Cancelled draw dropped before rendering");
                }
                RenderMsg::Stop => {
                    stopped = true;
                    break;
                }
            }
        }

        status.queued = None;
        if stopped {
            return Err(());
        }
        let merged = merged.filter(|(state, _)| state.renders());
        status.rendering = merged.map(|(state, _)| state);
        Ok(merged)
    }

    fn on_draw_progress(&self, status: StatusCode, fraction: f64, message: &str) -> bool {
        let listener = self.listener.read().clone();
        if let Some(listener) = &listener {
            listener.on_draw_progress(self.id, status, fraction, message);
        }

        if status.is_terminal() {
            let state = self.status.lock().rendering.take();
            self.slot.remove();
            debug!(view = %self.id, %status, "Draw complete");

            if let Some(listener) = &listener {
                listener.on_draw_complete(self.id, state.unwrap_or(DrawState::Nothing), status);
            }

            // Counted last: a changed counter means this draw has left `rendering`.
            match status {
                StatusCode::Canceled => self.metrics.draw_cancelled(),
                s if s.is_failure() => {
                    warn!(view = %self.id, %status, message, "Draw failed");
                    self.metrics.draw_failed();
                }
                _ => self.metrics.draw_rendered(),
            }
        }
        true
    }

    fn render(
        &self,
        renderer: &dyn MapRenderer,
        callback: &ProgressCallback,
        state: DrawState,
        generation: u64,
    ) {
        let key = self.slot.install(callback);
        // A cancel that ran before the slot existed could not reach its token.
        if generation != self.generation() {
            debug!(view = %self.id, %state, "Draw cancelled before it started");
            self.status.lock().rendering = None;
            self.slot.remove();
            self.metrics.draw_cancelled();
            return;
        }
        debug!(view = %self.id, %state, %key, "Drawing");

        if !renderer.draw(self.handle, state, key) {
            warn!(view = %self.id, %state, "Renderer refused to start draw");
            self.status.lock().rendering = None;
            self.metrics.draw_failed();
            self.slot.remove();
        }
    }
}

fn drawing_callback(shared: Weak<ViewShared>) -> ProgressCallback {
    Arc::new(move |status, fraction, message| match shared.upgrade() {
        Some(shared) => shared.on_draw_progress(status, fraction, message),
        None => false,
    })
}

/// Drains render requests, merging any that queued up during a draw.
fn run_renderer(
    shared: Arc<ViewShared>,
    renderer: Arc<dyn MapRenderer>,
    callback: ProgressCallback,
    mut requests: mpsc::UnboundedReceiver<RenderMsg>,
) {
    debug!(view = %shared.id, "Render thread started");

    while let Some(message) = requests.blocking_recv() {
        let first = match message {
            RenderMsg::Draw { state, generation } => (state, generation),
            RenderMsg::Stop => break,
        };
        match shared.take_queued(first, &mut requests) {
            Ok(Some((state, generation))) => {
                shared.render(renderer.as_ref(), &callback, state, generation)
            }
            Ok(None) => {}
            Err(()) => break,
        }
    }

    {
        let mut status = shared.status.lock();
        status.queued = None;
        status.rendering = None;
    }
    shared.slot.remove();
    debug!(view = %shared.id, "Render thread stopped");
}

/// One attached map view.
///
/// Created through [`super::MapViews::attach`]. `schedule` and `invalidate`
/// may be called from any thread. Dropping the view detaches it.
pub struct MapView {
    shared: Arc<ViewShared>,
    options: MapViewOptions,
    renderer: Arc<dyn MapRenderer>,
    commands: mpsc::UnboundedSender<DrawCommand>,
    render_tx: mpsc::UnboundedSender<RenderMsg>,
    detached: AtomicBool,
}

impl MapView {
    /// Start the view's timer task on `runtime` and its render thread.
    pub(crate) fn spawn(
        id: MapViewId,
        options: MapViewOptions,
        registry: Arc<CallbackRegistry>,
        renderer: Arc<dyn MapRenderer>,
        runtime: &tokio::runtime::Handle,
    ) -> BridgeResult<Self> {
        let shared = Arc::new(ViewShared {
            id,
            handle: options.handle,
            status: Mutex::new(DrawStatus::default()),
            generation: AtomicU64::new(0),
            metrics: DrawMetrics::new(),
            slot: DrawingSlot::new(registry),
            listener: RwLock::new(None),
        });

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (render_tx, render_rx) = mpsc::unbounded_channel();

        let callback = drawing_callback(Arc::downgrade(&shared));
        let thread_shared = Arc::clone(&shared);
        let thread_renderer = Arc::clone(&renderer);
        thread::Builder::new()
            .name(format!("ngbridge-render-{}", id.get()))
            .spawn(move || run_renderer(thread_shared, thread_renderer, callback, render_rx))?;

        runtime.spawn(run_timer(Arc::clone(&shared), command_rx, render_tx.clone()));

        Ok(Self {
            shared,
            options,
            renderer,
            commands: command_tx,
            render_tx,
            detached: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> MapViewId {
        self.shared.id
    }

    pub fn handle(&self) -> Handle {
        self.options.handle
    }

    pub fn options(&self) -> &MapViewOptions {
        &self.options
    }

    pub fn shows_scratch(&self) -> bool {
        self.options.shows_scratch
    }

    /// Schedule a draw with the view's default debounce.
    pub fn schedule(&self, state: DrawState) -> BridgeResult<()> {
        self.schedule_with(state, self.options.debounce)
    }

    /// Schedule a draw that fires after `debounce` of quiet.
    pub fn schedule_with(&self, state: DrawState, debounce: Duration) -> BridgeResult<()> {
        if self.is_detached() {
            return Err(BridgeError::SchedulerStopped(self.id()));
        }
        let generation = self.shared.generation();
        self.commands
            .send(DrawCommand::Schedule {
                state,
                debounce,
                generation,
            })
            .map_err(|_| BridgeError::SchedulerStopped(self.id()))?;
        self.shared.metrics.draw_requested();
        Ok(())
    }

    /// Mark a region dirty in the native map.
    ///
    /// Does not schedule a draw by itself.
    pub fn invalidate(&self, envelope: &Envelope) {
        debug!(view = %self.id(), %envelope, "Invalidating region");
        self.renderer.invalidate(self.options.handle, envelope);
    }

    /// Drop every draw not yet started and ask an in-flight draw to stop.
    ///
    /// Cooperative: the renderer stops at its next progress report, which
    /// is answered with `false`. Draws fired earlier but still waiting for
    /// the render thread never start.
    pub fn cancel_draw(&self) {
        self.shared.cancel_queued();
        let _ = self.commands.send(DrawCommand::Cancel);
        if self.shared.slot.cancel() {
            debug!(view = %self.id(), "In-flight draw asked to stop");
        }
    }

    /// Stop the timer and render thread and cancel any in-flight draw.
    ///
    /// The drawing slot is removed once the render thread has returned from
    /// its current draw. Idempotent.
    pub fn detach(&self) {
        if self.detached.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.cancel_queued();
        let _ = self.commands.send(DrawCommand::Shutdown);
        self.shared.slot.cancel();
        let _ = self.render_tx.send(RenderMsg::Stop);
        debug!(view = %self.id(), "Map view detached");
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> DrawStatus {
        *self.shared.status.lock()
    }

    pub fn metrics(&self) -> DrawMetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Key of the installed drawing callback, while a draw is in flight.
    pub fn draw_key(&self) -> Option<CallbackKey> {
        self.shared.slot.key()
    }

    pub fn set_draw_listener(&self, listener: Option<Arc<dyn DrawListener>>) {
        *self.shared.listener.write() = listener;
    }
}

impl Drop for MapView {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for MapView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapView")
            .field("id", &self.id())
            .field("options", &self.options)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
