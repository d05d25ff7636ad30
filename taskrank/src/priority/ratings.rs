//! Task ratings
//!
//! A rating is a 0..=5 integer a task receives for one category. The
//! bounds are enforced when a `Rating` is constructed, so nothing
//! downstream ever sees an out-of-range value.

use super::validation::validate_category_id;
use crate::config::MAX_RATING;
use crate::error::{AppError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single category rating in `0..=MAX_RATING`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Rating(u8);

impl Rating {
    pub const ZERO: Rating = Rating(0);

    /// Validate and wrap a raw rating value. Out-of-range values are
    /// rejected, never clamped.
    pub fn new(value: i64) -> Result<Self> {
        if (0..=i64::from(MAX_RATING)).contains(&value) {
            Ok(Rating(value as u8))
        } else {
            Err(AppError::Validation(format!(
                "Rating must be between 0 and {}, got {}",
                MAX_RATING, value
            )))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = AppError;

    fn try_from(value: i64) -> Result<Self> {
        Rating::new(value)
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for Rating {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = i64::deserialize(deserializer)?;
        Rating::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Ratings of one task, keyed by category id.
///
/// Keys need not cover every category; a missing key reads as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, Rating>", into = "BTreeMap<String, Rating>")]
pub struct PriorityRatings(BTreeMap<String, Rating>);

impl PriorityRatings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw `(category id, value)` pairs, validating every entry.
    pub fn from_pairs<I, K>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, i64)>,
        K: Into<String>,
    {
        let mut ratings = Self::new();
        for (category_id, value) in pairs {
            ratings.set(category_id, Rating::new(value)?)?;
        }
        Ok(ratings)
    }

    /// Rating for a category, zero when unrated
    pub fn get(&self, category_id: &str) -> Rating {
        self.0.get(category_id).copied().unwrap_or(Rating::ZERO)
    }

    pub fn contains(&self, category_id: &str) -> bool {
        self.0.contains_key(category_id)
    }

    pub fn set(&mut self, category_id: impl Into<String>, rating: Rating) -> Result<()> {
        let category_id = category_id.into();
        validate_category_id(&category_id)?;
        self.0.insert(category_id, rating);
        Ok(())
    }

    pub fn remove(&mut self, category_id: &str) -> Option<Rating> {
        self.0.remove(category_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Rating)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<BTreeMap<String, Rating>> for PriorityRatings {
    type Error = AppError;

    fn try_from(map: BTreeMap<String, Rating>) -> Result<Self> {
        for key in map.keys() {
            validate_category_id(key)?;
        }
        Ok(PriorityRatings(map))
    }
}

impl From<PriorityRatings> for BTreeMap<String, Rating> {
    fn from(ratings: PriorityRatings) -> Self {
        ratings.0
    }
}
