//! Wall clock that follows tokio's time.

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use tabsync_core::clock::{after, elapsed};
use tabsync_core::Clock;

/// Wall-clock time anchored once and advanced by [`tokio::time::Instant`].
///
/// Under a paused test runtime it moves only when tokio's clock does, so
/// leases and deadlines stay consistent with `sleep`. Clones share the
/// same anchor.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    anchor_wall: DateTime<Utc>,
    anchor: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            anchor_wall: Utc::now(),
            anchor: Instant::now(),
        }
    }

    /// The tokio instant at which `at` falls due.
    pub fn instant_at(&self, at: DateTime<Utc>) -> Instant {
        self.anchor + elapsed(self.anchor_wall, at)
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        after(self.anchor_wall, self.anchor.elapsed())
    }
}
