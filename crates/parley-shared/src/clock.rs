//! Hybrid logical clock.
//!
//! Chats order their events with a per-chat counter that follows wall time
//! while wall time moves forward and falls back to `last + 1` whenever the
//! wall clock stalls, jumps backwards or is outrun by a burst of events.

use std::sync::atomic::{AtomicU64, Ordering};

/// Millisecond wall-clock source. Injected everywhere the engine needs the
/// current time so tests and replays can pin it.
pub trait TimeSource: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// Settable clock for deterministic runs.
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    now: AtomicU64,
}

impl ManualTimeSource {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Issue the next clock value for a chat whose last issued value is `last`.
///
/// `last` is updated to the returned value before returning, so repeated
/// calls are strictly increasing.
pub fn next_clock(last: &mut u64, wall_time: u64) -> u64 {
    let clock = if *last == 0 || *last < wall_time {
        wall_time
    } else {
        last.saturating_add(1)
    };
    *last = clock;
    clock
}

/// Merge rule for notification `updated_at`: a proposed value that would not
/// move the stored value forward is replaced by `stored + 1`.
pub fn bump_clock(stored: u64, proposed: u64) -> u64 {
    if proposed <= stored {
        stored.saturating_add(1)
    } else {
        proposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_wall_time_when_ahead() {
        let mut last = 0;
        assert_eq!(next_clock(&mut last, 1_000), 1_000);
        assert_eq!(next_clock(&mut last, 2_000), 2_000);
        assert_eq!(last, 2_000);
    }

    #[test]
    fn increments_when_wall_time_lags() {
        let mut last = 100;
        assert_eq!(next_clock(&mut last, 50), 101);
        assert_eq!(next_clock(&mut last, 101), 102);
        assert_eq!(next_clock(&mut last, 0), 103);
    }

    #[test]
    fn strictly_increasing_under_backward_jumps() {
        let mut last = 0;
        let mut previous = 0;
        for wall in [500, 400, 400, 900, 10, 901, 901, 0] {
            let clock = next_clock(&mut last, wall);
            assert!(clock > previous, "{clock} <= {previous}");
            previous = clock;
        }
    }

    #[test]
    fn bump_never_regresses() {
        assert_eq!(bump_clock(5, 5), 6);
        assert_eq!(bump_clock(5, 3), 6);
        assert_eq!(bump_clock(5, 9), 9);
        assert_eq!(bump_clock(0, 0), 1);
    }

    #[test]
    fn saturates_at_the_top_of_the_range() {
        let mut last = u64::MAX;
        assert_eq!(next_clock(&mut last, 5), u64::MAX);
        assert_eq!(last, u64::MAX);
        assert_eq!(bump_clock(u64::MAX, 7), u64::MAX);
    }

    #[test]
    fn manual_time_source_is_settable() {
        let time = ManualTimeSource::new(10);
        time.advance(5);
        assert_eq!(time.now_ms(), 15);
        time.set(3);
        assert_eq!(time.now_ms(), 3);
    }
}
