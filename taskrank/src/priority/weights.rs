//! Category weight invariant
//!
//! The categories visible in one owner scope must weigh at most
//! `MAX_TOTAL_WEIGHT` percent in total.

use crate::config::MAX_TOTAL_WEIGHT;
use crate::database::Category;
use crate::error::{AppError, Result};
use serde::Serialize;

/// Result of checking a set of categories against the weight limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeightCheck {
    pub total_weight: u32,
    pub ok: bool,
}

pub fn total_weight<'a, I>(categories: I) -> u32
where
    I: IntoIterator<Item = &'a Category>,
{
    categories
        .into_iter()
        .fold(0u32, |acc, c| acc.saturating_add(c.weight))
}

/// Read-only check used both before writes and by health reports.
pub fn validate_total<'a, I>(categories: I) -> WeightCheck
where
    I: IntoIterator<Item = &'a Category>,
{
    let total_weight = total_weight(categories);
    WeightCheck {
        total_weight,
        ok: total_weight <= MAX_TOTAL_WEIGHT,
    }
}

/// Check that adding `attempted` to a scope currently at `current` stays
/// within the limit. Returns the resulting total.
pub fn check_prospective(current: u32, attempted: u32) -> Result<u32> {
    let would_be = current.saturating_add(attempted);
    if would_be > MAX_TOTAL_WEIGHT {
        return Err(AppError::WeightExceeded {
            current,
            attempted,
            would_be,
        });
    }
    Ok(would_be)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Category;

    fn category(id: &str, weight: u32) -> Category {
        Category::builder(id, id, weight).build()
    }

    #[test]
    fn test_validate_total_at_limit() {
        let cats = vec![category("a", 60), category("b", 40)];
        assert_eq!(
            validate_total(&cats),
            WeightCheck {
                total_weight: 100,
                ok: true
            }
        );
    }

    #[test]
    fn test_validate_total_over_limit_is_reported_not_clamped() {
        let cats = vec![category("a", 70), category("b", 40)];
        let check = validate_total(&cats);
        assert_eq!(check.total_weight, 110);
        assert!(!check.ok);
    }

    #[test]
    fn test_check_prospective_rejects_overflow() {
        assert_eq!(check_prospective(80, 20).unwrap(), 100);

        match check_prospective(80, 30) {
            Err(AppError::WeightExceeded {
                current,
                attempted,
                would_be,
            }) => {
                assert_eq!((current, attempted, would_be), (80, 30, 110));
            }
            other => panic!("expected WeightExceeded, got {:?}", other),
        }
    }
}
