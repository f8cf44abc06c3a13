//! Platform tick arithmetic and the range sample freshness gate.
//!
//! The flight controller counts time in scheduler ticks held in an unsigned 32-bit counter that wraps
//! around. All age comparisons are done with wrapping subtraction so a sample taken just before the
//! counter rolls over is still classified correctly just after it.

/// Scheduler tick counter
pub type Tick = u32;

/// Default scheduler rate (ticks per second)
pub const DEFAULT_TICK_RATE_HZ: u32 = 1000;

/// Default maximum age of a range sample before it is considered stale (milliseconds)
pub const DEFAULT_MAX_SAMPLE_AGE_MS: u32 = 50;

/// Convert a duration in milliseconds to scheduler ticks, rounding down.
///
/// # Example
///
/// ```
/// use altfuse::ticks::ms_to_ticks;
/// assert_eq!(ms_to_ticks(50, 1000), 50);
/// assert_eq!(ms_to_ticks(50, 100), 5);
/// ```
pub fn ms_to_ticks(ms: u32, tick_rate_hz: u32) -> Tick {
    ((ms as u64 * tick_rate_hz as u64) / 1000) as Tick
}

/// Default maximum sample age expressed in ticks at [DEFAULT_TICK_RATE_HZ]
pub fn default_max_sample_age() -> Tick {
    ms_to_ticks(DEFAULT_MAX_SAMPLE_AGE_MS, DEFAULT_TICK_RATE_HZ)
}

/// Returns `true` if a sample acquired at `sample_tick` is at most `max_age_ticks` old at `current_tick`.
///
/// A sample stamped in the "future" (ahead of `current_tick`) wraps to a very large age and is stale.
pub fn is_fresh(sample_tick: Tick, current_tick: Tick, max_age_ticks: Tick) -> bool {
    current_tick.wrapping_sub(sample_tick) <= max_age_ticks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ms_to_ticks() {
        assert_eq!(ms_to_ticks(0, 1000), 0);
        assert_eq!(ms_to_ticks(50, 1000), 50);
        assert_eq!(ms_to_ticks(50, 500), 25);
        assert_eq!(ms_to_ticks(1, 100), 0);
        assert_eq!(default_max_sample_age(), 50);
    }
    #[test]
    fn test_is_fresh_within_window() {
        assert!(is_fresh(100, 100, 50));
        assert!(is_fresh(100, 150, 50));
        assert!(!is_fresh(100, 151, 50));
    }
    #[test]
    fn test_is_fresh_across_wraparound() {
        let sample = u32::MAX - 10;
        assert!(is_fresh(sample, 20, 50));
        assert!(is_fresh(sample, 39, 50));
        assert!(!is_fresh(sample, 40, 50));
    }
    #[test]
    fn test_future_sample_is_stale() {
        assert!(!is_fresh(200, 100, 50));
    }
}
