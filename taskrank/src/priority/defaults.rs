//! Canonical default categories
//!
//! Seeded explicitly at startup (`CategoryService::initialize_defaults`)
//! and by `reset_defaults`. The weights sum to exactly 100.

use crate::database::Category;
use chrono::{DateTime, Utc};

/// One row of the default seed table
#[derive(Debug, Clone, Copy)]
pub struct DefaultCategory {
    pub id: &'static str,
    pub display_name: &'static str,
    pub weight: u32,
    pub color: &'static str,
}

pub const DEFAULT_CATEGORIES: [DefaultCategory; 7] = [
    DefaultCategory {
        id: "impact",
        display_name: "Impact",
        weight: 25,
        color: "#FF6B6B",
    },
    DefaultCategory {
        id: "urgency",
        display_name: "Urgency",
        weight: 20,
        color: "#4ECDC4",
    },
    DefaultCategory {
        id: "effort",
        display_name: "Effort Required",
        weight: 15,
        color: "#45B7D1",
    },
    DefaultCategory {
        id: "alignment",
        display_name: "Goal Alignment",
        weight: 15,
        color: "#96CEB4",
    },
    DefaultCategory {
        id: "learning",
        display_name: "Learning Value",
        weight: 10,
        color: "#FFEAA7",
    },
    DefaultCategory {
        id: "enjoyment",
        display_name: "Enjoyment",
        weight: 10,
        color: "#DDA0DD",
    },
    DefaultCategory {
        id: "risk",
        display_name: "Risk Level",
        weight: 5,
        color: "#FFB6C1",
    },
];

/// Build the default categories, stamped with `now`
pub fn default_categories(now: DateTime<Utc>) -> Vec<Category> {
    DEFAULT_CATEGORIES
        .iter()
        .map(|d| {
            Category::builder(d.id, d.display_name, d.weight)
                .color(d.color)
                .default_category()
                .at(now)
                .build()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::validation::{validate_category_id, validate_color};
    use crate::priority::weights::validate_total;

    #[test]
    fn test_default_weights_sum_to_limit() {
        let cats = default_categories(Utc::now());
        let check = validate_total(&cats);

        assert_eq!(cats.len(), 7);
        assert_eq!(check.total_weight, 100);
        assert!(check.ok);
    }

    #[test]
    fn test_defaults_are_global_and_valid() {
        for cat in default_categories(Utc::now()) {
            assert!(cat.is_default);
            assert!(cat.owner_id.is_none());
            validate_category_id(&cat.id).unwrap();
            validate_color(&cat.color).unwrap();
        }
    }
}
