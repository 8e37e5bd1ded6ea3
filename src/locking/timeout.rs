//! Lock attempt timeout/jitter schedule (SPEC_FULL.md §4.2), grounded on
//! `lib/mcpu.py`'s `LockAttemptTimeoutStrategy._CalculateLockAttemptTimeouts`.

use rand::Rng;

const INITIAL_TIMEOUT: f64 = 1.0;
const MAX_TIMEOUT: f64 = 10.0;
const TOTAL_TIMEOUT: f64 = 150.0;
const GROWTH_FACTOR: f64 = 1.05;
const GROWTH_EXPONENT: f64 = 1.25;
const JITTER_FRACTION: f64 = 0.05;

/// Builds the retry schedule: each attempt's duration grows as
/// `(prev * GROWTH_FACTOR) ** GROWTH_EXPONENT`, capped at `MAX_TIMEOUT`,
/// until the cumulative sum reaches `TOTAL_TIMEOUT`. The final attempt
/// has no timeout (a plain blocking acquire), matching "after which a
/// blocking acquire is performed".
pub fn calculate_attempt_timeouts() -> Vec<Option<f64>> {
    let mut schedule = Vec::new();
    let mut current = INITIAL_TIMEOUT;
    let mut total = 0.0;

    while total < TOTAL_TIMEOUT {
        schedule.push(Some(current));
        total += current;
        current = (current * GROWTH_FACTOR).powf(GROWTH_EXPONENT).min(MAX_TIMEOUT);
    }
    schedule.push(None);
    schedule
}

/// Applies +/-5% jitter to a timeout value; `None` (the final blocking
/// attempt) passes through unchanged.
pub fn jittered(timeout: Option<f64>) -> Option<f64> {
    timeout.map(|t| {
        let delta = t * JITTER_FRACTION;
        let jitter = rand::rng().random_range(-delta..=delta);
        (t + jitter).max(0.0)
    })
}

/// Clamp a caller-supplied deadline (seconds) against the schedule: the
/// caller's own deadline always wins when it's tighter.
pub fn bounded_by_deadline(timeout: Option<f64>, deadline: Option<f64>) -> Option<f64> {
    match (timeout, deadline) {
        (Some(t), Some(d)) => Some(t.min(d)),
        (None, Some(d)) => Some(d),
        (t, None) => t,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_accumulates_past_total_and_ends_blocking() {
        let schedule = calculate_attempt_timeouts();
        assert_eq!(*schedule.last().unwrap(), None);
        let sum: f64 = schedule.iter().flatten().sum();
        assert!(sum >= TOTAL_TIMEOUT);
        for t in schedule.iter().flatten() {
            assert!(*t <= MAX_TIMEOUT + 1e-9);
        }
    }

    #[test]
    fn jitter_stays_within_five_percent() {
        for _ in 0..100 {
            let j = jittered(Some(10.0)).unwrap();
            assert!((9.5..=10.5).contains(&j));
        }
        assert_eq!(jittered(None), None);
    }
}
