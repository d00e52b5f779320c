//! Visual sync arithmetic.

use std::time::Duration;

use tokio::time::Instant;

/// Earliest instant a visible mutation may fire after a finalize event.
pub fn visible_at(finalized_at: Instant, delay: Duration) -> Instant {
    finalized_at + delay
}

/// `max(0, finalized_at + delay - now)`.
pub fn remaining(finalized_at: Instant, delay: Duration, now: Instant) -> Duration {
    visible_at(finalized_at, delay).saturating_duration_since(now)
}
