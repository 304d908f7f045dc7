//! Rating aggregation and statistics.
//!
//! This module turns category ratings into overall scores and computes
//! per-institution averages from the full set of reviews.

use crate::models::{AggregateRating, Category, CategoryRatings, Rating, Review};

/// Round to one decimal place, halves away from zero.
pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Arithmetic mean rounded to one decimal. `None` for an empty input.
pub fn rounded_mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0_f64, 0_usize), |(sum, count), v| (sum + v, count + 1));

    if count == 0 {
        None
    } else {
        Some(round_to_tenth(sum / count as f64))
    }
}

/// Overall score of one review: mean of its category ratings.
pub fn overall_score(ratings: &[Rating]) -> Option<f64> {
    rounded_mean(ratings.iter().map(|r| f64::from(r.value())))
}

impl CategoryRatings {
    /// Overall score over the ratings that are present.
    pub fn overall(&self) -> Option<f64> {
        overall_score(&self.present())
    }
}

/// Overall score a review contributes to the institution average.
///
/// The stored score wins; rows without one fall back to their categories.
fn review_overall(review: &Review) -> Option<f64> {
    review.overall.or_else(|| review.ratings.overall())
}

/// Average of one category across reviews.
///
/// Reviews missing this category are left out rather than counted as zero.
pub fn category_average(reviews: &[Review], category: Category) -> Option<f64> {
    rounded_mean(
        reviews
            .iter()
            .filter_map(|r| r.ratings.get(category))
            .map(|r| f64::from(r.value())),
    )
}

/// Compute the read-time aggregate for a set of reviews.
pub fn aggregate(reviews: &[Review]) -> AggregateRating {
    AggregateRating {
        recreation_center: category_average(reviews, Category::RecreationCenter),
        dining_hall: category_average(reviews, Category::DiningHall),
        main_area: category_average(reviews, Category::MainArea),
        overall: rounded_mean(reviews.iter().filter_map(review_overall)),
        review_count: reviews.len(),
    }
}

/// Count of each star value (index 0 is one star) for a category.
pub fn rating_distribution(reviews: &[Review], category: Category) -> [usize; 5] {
    let mut counts = [0usize; 5];

    for rating in reviews.iter().filter_map(|r| r.ratings.get(category)) {
        counts[usize::from(rating.value() - Rating::MIN)] += 1;
    }

    counts
}

/// Number of filled stars to draw for an average (nearest whole star).
pub fn filled_stars(average: f64) -> usize {
    average.round().clamp(0.0, f64::from(Rating::MAX)) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn rating(v: i64) -> Rating {
        Rating::new(v).unwrap()
    }

    fn create_test_review(rec: Option<i64>, dining: Option<i64>, main: Option<i64>) -> Review {
        let ratings = CategoryRatings {
            recreation_center: rec.map(rating),
            dining_hall: dining.map(rating),
            main_area: main.map(rating),
        };
        Review {
            id: Uuid::new_v4(),
            institution_id: 1,
            author_id: Uuid::new_v4(),
            author_name: None,
            comment: "Ramps everywhere".to_string(),
            overall: ratings.overall(),
            ratings,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_overall_matches_rounded_mean_for_every_triple() {
        for a in 1..=5 {
            for b in 1..=5 {
                for c in 1..=5 {
                    let expected = ((a + b + c) as f64 / 3.0 * 10.0).round() / 10.0;
                    let overall = overall_score(&[rating(a), rating(b), rating(c)]);
                    assert_eq!(overall, Some(expected), "ratings {a},{b},{c}");
                }
            }
        }
    }

    #[test]
    fn test_overall_examples() {
        assert_eq!(overall_score(&[rating(5), rating(5), rating(5)]), Some(5.0));
        assert_eq!(overall_score(&[rating(4), rating(2), rating(4)]), Some(3.3));
        assert_eq!(overall_score(&[rating(4), rating(2), rating(3)]), Some(3.0));
        assert_eq!(overall_score(&[rating(5), rating(5), rating(4)]), Some(4.7));
        assert_eq!(overall_score(&[]), None);
    }

    #[test]
    fn test_aggregate_of_nothing_is_unavailable() {
        let aggregate = aggregate(&[]);
        assert_eq!(aggregate.overall, None);
        assert_eq!(aggregate.recreation_center, None);
        assert_eq!(aggregate.dining_hall, None);
        assert_eq!(aggregate.main_area, None);
        assert_eq!(aggregate.review_count, 0);
        assert!(!aggregate.is_available());
    }

    #[test]
    fn test_identical_values_average_exactly() {
        for v in 1..=5 {
            let reviews: Vec<Review> = (0..7)
                .map(|_| create_test_review(Some(v), Some(v), Some(v)))
                .collect();
            let aggregate = aggregate(&reviews);
            assert_eq!(aggregate.recreation_center, Some(v as f64));
            assert_eq!(aggregate.dining_hall, Some(v as f64));
            assert_eq!(aggregate.main_area, Some(v as f64));
            assert_eq!(aggregate.overall, Some(v as f64));
        }
    }

    #[test]
    fn test_identical_fractional_overall_stays_exact() {
        let reviews: Vec<Review> = (0..3)
            .map(|_| create_test_review(Some(4), Some(2), Some(2)))
            .collect();
        assert_eq!(reviews[0].overall, Some(2.7));
        assert_eq!(aggregate(&reviews).overall, Some(2.7));
    }

    #[test]
    fn test_recreation_average_scenario() {
        let reviews = vec![
            create_test_review(Some(4), Some(2), Some(3)),
            create_test_review(Some(2), Some(2), Some(4)),
        ];
        assert_eq!(
            category_average(&reviews, Category::RecreationCenter),
            Some(3.0)
        );
    }

    #[test]
    fn test_missing_category_is_excluded_not_zero() {
        let reviews = vec![
            create_test_review(Some(4), None, Some(3)),
            create_test_review(Some(2), Some(5), Some(3)),
        ];
        let aggregate = aggregate(&reviews);
        assert_eq!(aggregate.dining_hall, Some(5.0));
        assert_eq!(aggregate.recreation_center, Some(3.0));
        assert_eq!(aggregate.review_count, 2);
    }

    #[test]
    fn test_overall_falls_back_to_categories() {
        let mut stored = create_test_review(Some(5), Some(5), Some(5));
        stored.overall = Some(4.0);
        let mut legacy = create_test_review(Some(2), Some(2), Some(2));
        legacy.overall = None;
        let mut empty = create_test_review(None, None, None);
        empty.overall = None;

        let aggregate = aggregate(&[stored, legacy, empty]);
        assert_eq!(aggregate.overall, Some(3.0));
        assert_eq!(aggregate.review_count, 3);
    }

    #[test]
    fn test_rating_distribution() {
        let reviews = vec![
            create_test_review(Some(4), None, None),
            create_test_review(Some(4), None, None),
            create_test_review(Some(1), None, None),
        ];
        assert_eq!(
            rating_distribution(&reviews, Category::RecreationCenter),
            [1, 0, 0, 2, 0]
        );
        assert_eq!(rating_distribution(&reviews, Category::DiningHall), [0; 5]);
    }

    #[test]
    fn test_filled_stars() {
        assert_eq!(filled_stars(2.9), 3);
        assert_eq!(filled_stars(2.4), 2);
        assert_eq!(filled_stars(5.0), 5);
    }
}
