//! The debounce timer task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

use super::state::{DrawState, ScheduledDraw};
use super::view::ViewShared;

/// Sent by producers to a view's timer task.
///
/// `generation` is the view's cancel generation when the request was made;
/// draws from an older generation are dropped instead of rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DrawCommand {
    Schedule {
        state: DrawState,
        debounce: Duration,
        generation: u64,
    },
    Cancel,
    Shutdown,
}

/// Sent by the timer task to the render thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RenderMsg {
    Draw { state: DrawState, generation: u64 },
    Stop,
}

/// Owns the pending draw of one view until it fires.
///
/// Exits on [`DrawCommand::Shutdown`] or when every command sender is gone,
/// telling the render thread to stop on the way out.
pub(crate) async fn run_timer(
    shared: Arc<ViewShared>,
    mut commands: mpsc::UnboundedReceiver<DrawCommand>,
    render_tx: mpsc::UnboundedSender<RenderMsg>,
) {
    let view = shared.id();
    debug!(%view, "Draw timer started");

    let mut pending: Option<ScheduledDraw> = None;
    let mut generation = 0;

    loop {
        let deadline = pending.map(|draw| draw.fire_at);
        // Placeholder deadline for the disabled branch; never awaited.
        let sleep = sleep_until(deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600)));

        tokio::select! {
            biased;

            command = commands.recv() => match command {
                Some(DrawCommand::Schedule { state, debounce, generation: requested_in }) => {
                    let now = Instant::now();
                    generation = generation.max(requested_in);
                    match pending.as_mut() {
                        Some(draw) => {
                            let before = draw.state;
                            draw.coalesce(state, now, debounce);
                            shared.metrics().draw_coalesced();
                            trace!(%view, %before, requested = %state, merged = %draw.state, "Draw coalesced");
                        }
                        None => {
                            pending = Some(ScheduledDraw::new(view, state, now, debounce));
                            trace!(%view, %state, debounce_ms = debounce.as_millis() as u64, "Draw scheduled");
                        }
                    }
                    shared.set_pending(pending.map(|draw| draw.state));
                }
                Some(DrawCommand::Cancel) => {
                    if let Some(draw) = pending.take() {
                        debug!(%view, state = %draw.state, "Pending draw cancelled");
                    }
                    shared.set_pending(None);
                }
                Some(DrawCommand::Shutdown) | None => break,
            },

            _ = sleep, if deadline.is_some() => {
                if let Some(draw) = pending.take() {
                    debug!(%view, state = %draw.state, "Draw timer fired");
                    if !shared.hand_over(draw.state, generation, &render_tx) {
                        break;
                    }
                }
            }
        }
    }

    shared.set_pending(None);
    let _ = render_tx.send(RenderMsg::Stop);
    debug!(%view, "Draw timer stopped");
}
