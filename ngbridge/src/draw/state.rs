//! Draw states and the coalescing rule.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use super::MapViewId;

/// Why the next draw happens, and how much cached data it throws away.
///
/// The policy attached to each state is fixed; callers pick a state, not a
/// cache behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawState {
    /// Regular draw: render what is missing from the tile cache.
    Normal,
    /// Drop the tile cache and render everything again.
    Redraw,
    /// Mark every cached tile dirty, keeping it on screen until replaced.
    Refill,
    /// Repaint from cache only; no tile or feature data is recomputed.
    Preserved,
    /// Do nothing.
    Nothing,
}

impl DrawState {
    /// Rank used when two requests coalesce: higher wins.
    pub fn cost(self) -> u8 {
        match self {
            DrawState::Nothing => 0,
            DrawState::Preserved => 1,
            DrawState::Normal => 2,
            DrawState::Refill => 3,
            DrawState::Redraw => 4,
        }
    }

    /// Merge a new request into the pending one.
    ///
    /// The pending state is never downgraded. `Preserved` arriving over a
    /// pending `Normal`, `Refill` or `Redraw` keeps the pending state.
    pub fn coalesce(self, incoming: DrawState) -> DrawState {
        match (self, incoming) {
            (DrawState::Normal | DrawState::Refill | DrawState::Redraw, DrawState::Preserved) => {
                self
            }
            _ if incoming.cost() > self.cost() => incoming,
            _ => self,
        }
    }

    /// Returns true if the draw recomputes tile or feature data.
    pub fn recomputes_data(self) -> bool {
        matches!(
            self,
            DrawState::Normal | DrawState::Refill | DrawState::Redraw
        )
    }

    /// Returns true if the draw drops the tile cache entirely.
    pub fn drops_cache(self) -> bool {
        self == DrawState::Redraw
    }

    /// Returns true if cached tiles are kept but marked dirty.
    pub fn marks_cache_dirty(self) -> bool {
        self == DrawState::Refill
    }

    /// Returns true if the renderer has anything to do.
    pub fn renders(self) -> bool {
        self != DrawState::Nothing
    }

    /// Integer passed to the native renderer.
    pub fn wire(self) -> i32 {
        match self {
            DrawState::Normal => 0,
            DrawState::Redraw => 1,
            DrawState::Refill => 2,
            DrawState::Preserved => 3,
            DrawState::Nothing => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DrawState::Normal => "normal",
            DrawState::Redraw => "redraw",
            DrawState::Refill => "refill",
            DrawState::Preserved => "preserved",
            DrawState::Nothing => "nothing",
        }
    }
}

impl fmt::Display for DrawState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DrawState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "normal" => Ok(DrawState::Normal),
            "redraw" => Ok(DrawState::Redraw),
            "refill" => Ok(DrawState::Refill),
            "preserved" => Ok(DrawState::Preserved),
            "nothing" => Ok(DrawState::Nothing),
            other => Err(format!("unknown draw state '{}'", other)),
        }
    }
}

/// A pending, debounced draw for one map view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledDraw {
    pub map_view: MapViewId,
    pub state: DrawState,
    pub fire_at: Instant,
}

impl ScheduledDraw {
    pub fn new(map_view: MapViewId, state: DrawState, now: Instant, debounce: Duration) -> Self {
        Self {
            map_view,
            state,
            fire_at: now + debounce,
        }
    }

    /// Fold a later request into this one: the later fire time always wins,
    /// the state follows [`DrawState::coalesce`].
    pub fn coalesce(&mut self, state: DrawState, now: Instant, debounce: Duration) {
        self.state = self.state.coalesce(state);
        self.fire_at = now + debounce;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [DrawState; 5] = [
        DrawState::Normal,
        DrawState::Redraw,
        DrawState::Refill,
        DrawState::Preserved,
        DrawState::Nothing,
    ];

    #[test]
    fn test_preserved_never_overrides_work() {
        assert_eq!(DrawState::Normal.coalesce(DrawState::Preserved), DrawState::Normal);
        assert_eq!(DrawState::Refill.coalesce(DrawState::Preserved), DrawState::Refill);
        assert_eq!(DrawState::Redraw.coalesce(DrawState::Preserved), DrawState::Redraw);
    }

    #[test]
    fn test_upgrades() {
        assert_eq!(DrawState::Preserved.coalesce(DrawState::Redraw), DrawState::Redraw);
        assert_eq!(DrawState::Normal.coalesce(DrawState::Refill), DrawState::Refill);
        assert_eq!(DrawState::Refill.coalesce(DrawState::Redraw), DrawState::Redraw);
        assert_eq!(DrawState::Nothing.coalesce(DrawState::Preserved), DrawState::Preserved);
    }

    #[test]
    fn test_never_downgrades() {
        for pending in ALL {
            for incoming in ALL {
                let merged = pending.coalesce(incoming);
                assert!(merged.cost() >= pending.cost(), "{pending} + {incoming} -> {merged}");
                assert!(merged.cost() >= incoming.cost() || incoming == DrawState::Preserved);
            }
        }
    }

    #[test]
    fn test_policy_constants() {
        assert!(!DrawState::Preserved.recomputes_data());
        assert!(!DrawState::Nothing.recomputes_data());
        assert!(DrawState::Refill.marks_cache_dirty());
        assert!(!DrawState::Refill.drops_cache());
        assert!(DrawState::Redraw.drops_cache());
        assert!(!DrawState::Nothing.renders());
    }

    #[test]
    fn test_from_str() {
        assert_eq!("Refill".parse::<DrawState>(), Ok(DrawState::Refill));
        assert!("bogus".parse::<DrawState>().is_err());
    }

    #[test]
    fn test_scheduled_draw_coalesce_refreshes_fire_time() {
        let start = Instant::now();
        let debounce = Duration::from_millis(350);
        let mut draw = ScheduledDraw::new(MapViewId::new(1), DrawState::Normal, start, debounce);

        let later = start + Duration::from_millis(100);
        draw.coalesce(DrawState::Preserved, later, debounce);

        assert_eq!(draw.state, DrawState::Normal);
        assert_eq!(draw.fire_at, later + debounce);
    }
}
