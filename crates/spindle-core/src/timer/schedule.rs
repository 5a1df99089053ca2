use std::time::Duration;

/// Sleep before the next tick.
///
/// Non-precise timers always sleep the full interval, so the period drifts by
/// the callback duration. Precise timers subtract the time the callback took,
/// clamped at zero: a callback slower than the interval is followed by an
/// immediate tick, never by a burst of catch-up ticks.
pub(crate) fn next_sleep(interval: Duration, spent: Duration, precise: bool) -> Duration {
    if precise {
        interval.saturating_sub(spent)
    } else {
        interval
    }
}
