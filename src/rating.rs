//! Aggregate story rating.
//!
//! Each user rates a story at most once; re-rating replaces the previous
//! value. The story row carries the running total and count so listings
//! never have to scan the ratings table.

use serde::Serialize;

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

/// Reject values outside `MIN_RATING..=MAX_RATING`.
pub fn validate(value: i32) -> Result<i32, String> {
    if (MIN_RATING..=MAX_RATING).contains(&value) {
        Ok(value)
    } else {
        Err(format!(
            "Rating must be between {} and {}",
            MIN_RATING, MAX_RATING
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingAggregate {
    pub total: i64,
    pub count: i32,
    pub average: f64,
}

impl RatingAggregate {
    pub fn new(total: i64, count: i32) -> Self {
        Self {
            total,
            count,
            average: average(total, count),
        }
    }

    /// Fold in a user's rating. `previous` is that user's earlier rating of
    /// the same story, which is replaced rather than counted again.
    pub fn apply(self, previous: Option<i32>, value: i32) -> Self {
        match previous {
            Some(old) => Self::new(self.total - i64::from(old) + i64::from(value), self.count),
            None => Self::new(self.total + i64::from(value), self.count + 1),
        }
    }
}

fn average(total: i64, count: i32) -> f64 {
    if count <= 0 {
        0.0
    } else {
        total as f64 / f64::from(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_bounds() {
        assert_eq!(validate(1), Ok(1));
        assert_eq!(validate(5), Ok(5));
        assert!(validate(0).is_err());
        assert!(validate(6).is_err());
    }

    #[test]
    fn test_empty_aggregate_averages_zero() {
        let agg = RatingAggregate::new(0, 0);
        assert_eq!(agg.average, 0.0);
    }

    #[test]
    fn test_new_ratings_accumulate() {
        let agg = RatingAggregate::new(0, 0).apply(None, 4).apply(None, 5);
        assert_eq!(agg.total, 9);
        assert_eq!(agg.count, 2);
        assert_eq!(agg.average, 4.5);
    }

    #[test]
    fn test_rerating_replaces_previous_value() {
        let agg = RatingAggregate::new(0, 0).apply(None, 2).apply(None, 4);
        let agg = agg.apply(Some(2), 5);
        assert_eq!(agg.count, 2);
        assert_eq!(agg.total, 9);
        assert_eq!(agg.average, 4.5);
    }

    #[test]
    fn test_average_always_total_over_count() {
        let mut agg = RatingAggregate::new(0, 0);
        let mut previous: [Option<i32>; 3] = [None; 3];
        for (user, value) in [(0, 3), (1, 1), (0, 5), (2, 4), (1, 2)] {
            agg = agg.apply(previous[user], value);
            previous[user] = Some(value);
            assert_eq!(agg.average, agg.total as f64 / agg.count as f64);
        }
        assert_eq!(agg.count, 3);
        assert_eq!(agg.total, 11);
    }
}
