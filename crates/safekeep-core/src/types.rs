//! Common type aliases

use chrono::{DateTime, Utc};

/// Timestamp type stored in every `TIMESTAMPTZ` column.
pub type DBDateTime = DateTime<Utc>;

/// Whole seconds elapsed between two instants, never negative.
pub fn elapsed_secs(started_at: DBDateTime, finished_at: DBDateTime) -> i64 {
    (finished_at - started_at).num_seconds().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_elapsed_secs() {
        let start = Utc::now();
        assert_eq!(elapsed_secs(start, start + Duration::seconds(42)), 42);
    }

    #[test]
    fn test_elapsed_secs_clock_skew_is_zero() {
        let start = Utc::now();
        assert_eq!(elapsed_secs(start, start - Duration::seconds(5)), 0);
    }
}
