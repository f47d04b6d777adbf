//! Wall-clock cooldown arithmetic shared by the scheduler and the build pipeline.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Time left before `cooldown` has elapsed since `last`, or `None` when the
/// action is eligible.
///
/// A missing `last` (never attempted) is always eligible. A `last` in the
/// future counts as zero elapsed time.
pub fn remaining(
    last: Option<DateTime<Utc>>,
    cooldown: Duration,
    now: DateTime<Utc>,
) -> Option<Duration> {
    let last = last?;
    let elapsed = now
        .signed_duration_since(last)
        .to_std()
        .unwrap_or(Duration::ZERO);
    if elapsed < cooldown {
        Some(cooldown - elapsed)
    } else {
        None
    }
}

pub fn has_elapsed(last: Option<DateTime<Utc>>, cooldown: Duration, now: DateTime<Utc>) -> bool {
    remaining(last, cooldown, now).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn at(base: DateTime<Utc>, millis: i64) -> DateTime<Utc> {
        base + TimeDelta::milliseconds(millis)
    }

    #[test]
    fn never_attempted_is_eligible() {
        assert!(has_elapsed(None, Duration::from_secs(30), Utc::now()));
    }

    /// Verifies the 30 s boundary: 29.9 s blocked, 30.1 s eligible.
    #[test]
    fn boundary_values() {
        let last = Utc::now();
        let cooldown = Duration::from_secs(30);
        assert!(!has_elapsed(Some(last), cooldown, at(last, 29_900)));
        assert!(has_elapsed(Some(last), cooldown, at(last, 30_100)));
        assert!(has_elapsed(Some(last), cooldown, at(last, 30_000)));
        assert_eq!(
            remaining(Some(last), cooldown, at(last, 29_900)),
            Some(Duration::from_millis(100))
        );
    }

    #[test]
    fn future_timestamp_blocks_for_full_cooldown() {
        let now = Utc::now();
        let cooldown = Duration::from_secs(5);
        assert_eq!(remaining(Some(at(now, 1_000)), cooldown, now), Some(cooldown));
    }

    #[test]
    fn zero_cooldown_never_blocks() {
        let now = Utc::now();
        assert!(has_elapsed(Some(now), Duration::ZERO, now));
    }
}
