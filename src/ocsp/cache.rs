//! RFC 5019 cache directives.

use chrono::prelude::*;

/// `max-age` is however long the response has left to live, clamped by the
/// operator ceiling. A stale response (nextUpdate in the past) caches for
/// zero seconds.
pub fn cache_control(
    now: DateTime<Utc>,
    next_update: DateTime<Utc>,
    max_age: Option<u64>,
) -> String {
    let diff = (next_update - now).num_seconds().max(0) as u64;
    let ma = match max_age {
        Some(ceiling) => diff.min(ceiling),
        None => diff,
    };
    format!("max-age={},public,no-transform,must-revalidate", ma)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn max_age_is_time_to_next_update() {
        assert_eq!(
            cache_control(at(0), at(1), None),
            "max-age=3600,public,no-transform,must-revalidate"
        );
    }

    #[test]
    fn operator_ceiling_clamps() {
        assert_eq!(
            cache_control(at(0), at(2), Some(600)),
            "max-age=600,public,no-transform,must-revalidate"
        );
        // a ceiling above the remaining lifetime has no effect
        assert_eq!(
            cache_control(at(0), at(1), Some(7200)),
            "max-age=3600,public,no-transform,must-revalidate"
        );
    }

    #[test]
    fn stale_responses_cache_for_zero_seconds() {
        assert_eq!(
            cache_control(at(2), at(1), None),
            "max-age=0,public,no-transform,must-revalidate"
        );
        assert_eq!(
            cache_control(at(2), at(1), Some(600)),
            "max-age=0,public,no-transform,must-revalidate"
        );
    }
}
