//! Priority scoring engine
//!
//! Combines a task's category ratings, the category weights of its owner
//! scope, and its due date into a single ranking score:
//!
//! - `base = Σ rating(c) * weight(c)` over the categories in scope, or 0
//!   when the scope carries no weight at all
//! - an urgency bonus from `URGENCY_TIERS` is added when the task has a
//!   due date and a positive base score
//! - the result is rounded to one decimal place
//!
//! Everything here is pure: the same inputs, including `now`, always
//! produce the same score.

use super::ratings::PriorityRatings;
use crate::config::URGENCY_TIERS;
use crate::database::Category;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// How a score was put together
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub weighted_sum: u32,
    pub total_weight: u32,
    pub base: f64,
    pub days_until_due: Option<i64>,
    pub bonus: f64,
    pub score: f64,
}

/// Whole days from `now` until the start (00:00 UTC) of `due_date`,
/// rounded up. Zero or negative means due today or overdue.
pub fn days_until_due(due_date: NaiveDate, now: DateTime<Utc>) -> i64 {
    let due = due_date.and_time(chrono::NaiveTime::MIN).and_utc();
    let seconds = (due - now).num_seconds() as f64;
    (seconds / SECONDS_PER_DAY).ceil() as i64
}

/// Bonus points for a task due in `days` days
pub fn urgency_bonus(days: i64) -> f64 {
    URGENCY_TIERS
        .iter()
        .find(|(max_days, _)| days <= *max_days)
        .map(|(_, bonus)| *bonus)
        .unwrap_or(0.0)
}

pub fn score_breakdown(
    ratings: &PriorityRatings,
    categories: &[Category],
    due_date: Option<NaiveDate>,
    now: DateTime<Utc>,
) -> ScoreBreakdown {
    let (weighted_sum, total_weight) = categories.iter().fold((0u32, 0u32), |(sum, total), c| {
        let rating = u32::from(ratings.get(&c.id).value());
        (
            sum.saturating_add(rating.saturating_mul(c.weight)),
            total.saturating_add(c.weight),
        )
    });

    let base = if total_weight > 0 {
        f64::from(weighted_sum)
    } else {
        0.0
    };

    let days = due_date.map(|date| days_until_due(date, now));

    // Undifferentiated tasks get no urgency boost
    let bonus = match days {
        Some(days) if base > 0.0 => urgency_bonus(days),
        _ => 0.0,
    };

    ScoreBreakdown {
        weighted_sum,
        total_weight,
        base,
        days_until_due: days,
        bonus,
        score: round_to_tenth(base + bonus),
    }
}

/// Compute the priority score of a task
pub fn compute_score(
    ratings: &PriorityRatings,
    categories: &[Category],
    due_date: Option<NaiveDate>,
    now: DateTime<Utc>,
) -> f64 {
    score_breakdown(ratings, categories, due_date, now).score
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::defaults::default_categories;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 30, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn impact_only() -> Vec<Category> {
        vec![Category::builder("impact", "Impact", 25).build()]
    }

    #[test]
    fn test_single_category_without_due_date() {
        let ratings = PriorityRatings::from_pairs([("impact", 4)]).unwrap();
        let score = compute_score(&ratings, &impact_only(), None, now());
        assert_eq!(score, 100.0);
    }

    #[test]
    fn test_due_tomorrow_gets_top_bonus() {
        let ratings = PriorityRatings::from_pairs([("impact", 4)]).unwrap();
        let score = compute_score(&ratings, &impact_only(), Some(date(2025, 3, 11)), now());
        assert_eq!(score, 120.0);
    }

    #[test]
    fn test_urgency_tiers() {
        assert_eq!(urgency_bonus(-10), 20.0);
        assert_eq!(urgency_bonus(0), 20.0);
        assert_eq!(urgency_bonus(1), 20.0);
        assert_eq!(urgency_bonus(2), 15.0);
        assert_eq!(urgency_bonus(3), 15.0);
        assert_eq!(urgency_bonus(7), 10.0);
        assert_eq!(urgency_bonus(14), 5.0);
        assert_eq!(urgency_bonus(15), 0.0);
    }

    #[test]
    fn test_days_until_due_rounds_up() {
        // 14.5 hours until 2025-03-11T00:00Z
        assert_eq!(days_until_due(date(2025, 3, 11), now()), 1);
        // 2 days 14.5 hours
        assert_eq!(days_until_due(date(2025, 3, 13), now()), 3);
        // Today's midnight already passed
        assert_eq!(days_until_due(date(2025, 3, 10), now()), 0);
        assert_eq!(days_until_due(date(2025, 3, 1), now()), -9);

        let midnight = Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap();
        assert_eq!(days_until_due(date(2025, 3, 11), midnight), 1);
    }

    #[test]
    fn test_overdue_task_gets_maximum_bonus() {
        let ratings = PriorityRatings::from_pairs([("impact", 1)]).unwrap();
        let score = compute_score(&ratings, &impact_only(), Some(date(2024, 1, 1)), now());
        assert_eq!(score, 45.0);
    }

    #[test]
    fn test_no_categories_scores_zero_even_when_due() {
        let ratings = PriorityRatings::new();
        assert_eq!(compute_score(&ratings, &[], Some(date(2025, 3, 10)), now()), 0.0);
        assert_eq!(compute_score(&ratings, &[], None, now()), 0.0);
    }

    #[test]
    fn test_empty_ratings_score_zero() {
        let score = compute_score(
            &PriorityRatings::new(),
            &default_categories(now()),
            None,
            now(),
        );
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_zero_weight_scope_ignores_ratings() {
        let cats = vec![Category::builder("impact", "Impact", 0).build()];
        let ratings = PriorityRatings::from_pairs([("impact", 5)]).unwrap();
        let breakdown = score_breakdown(&ratings, &cats, Some(date(2025, 3, 11)), now());

        assert_eq!(breakdown.total_weight, 0);
        assert_eq!(breakdown.base, 0.0);
        assert_eq!(breakdown.bonus, 0.0);
        assert_eq!(breakdown.score, 0.0);
    }

    #[test]
    fn test_ratings_outside_scope_are_ignored() {
        let ratings = PriorityRatings::from_pairs([("impact", 2), ("someone-elses", 5)]).unwrap();
        let score = compute_score(&ratings, &impact_only(), None, now());
        assert_eq!(score, 50.0);
    }

    #[test]
    fn test_full_default_scope() {
        let ratings = PriorityRatings::from_pairs([
            ("impact", 5),
            ("urgency", 4),
            ("effort", 2),
            ("risk", 1),
        ])
        .unwrap();

        let breakdown = score_breakdown(
            &ratings,
            &default_categories(now()),
            Some(date(2025, 3, 16)),
            now(),
        );

        // 125 + 80 + 30 + 5
        assert_eq!(breakdown.weighted_sum, 240);
        assert_eq!(breakdown.total_weight, 100);
        assert_eq!(breakdown.days_until_due, Some(6));
        assert_eq!(breakdown.bonus, 10.0);
        assert_eq!(breakdown.score, 250.0);
    }

    #[test]
    fn test_score_is_deterministic() {
        let cats = default_categories(now());
        let ratings = PriorityRatings::from_pairs([("impact", 3), ("learning", 5)]).unwrap();
        let due = Some(date(2025, 3, 20));

        let first = compute_score(&ratings, &cats, due, now());
        for _ in 0..10 {
            assert_eq!(compute_score(&ratings, &cats, due, now()), first);
        }
    }
}
