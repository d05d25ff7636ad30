//! Field validation for categories and tasks
//!
//! Every validator returns `AppError::Validation` before any mutation
//! happens. Text validators return the normalized (trimmed) value.

use crate::config::{
    MAX_CATEGORY_ID_LENGTH, MAX_CATEGORY_NAME_LENGTH, MAX_CATEGORY_WEIGHT, MAX_LINK_LENGTH,
    MAX_TASK_TITLE_LENGTH, MIN_DUE_DATE,
};
use crate::database::RepeatInterval;
use crate::error::{AppError, Result};
use chrono::NaiveDate;

/// Category ids are `[A-Za-z0-9_-]{1,50}`
pub fn validate_category_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > MAX_CATEGORY_ID_LENGTH {
        return Err(AppError::Validation(format!(
            "Category id must be 1-{} characters, got {}",
            MAX_CATEGORY_ID_LENGTH,
            id.len()
        )));
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(AppError::Validation(format!(
            "Category id may only contain letters, digits, '_' and '-': {:?}",
            id
        )));
    }

    Ok(())
}

pub fn validate_display_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    let len = trimmed.chars().count();
    if len == 0 || len > MAX_CATEGORY_NAME_LENGTH {
        return Err(AppError::Validation(format!(
            "Display name must be 1-{} characters",
            MAX_CATEGORY_NAME_LENGTH
        )));
    }
    Ok(trimmed.to_string())
}

pub fn validate_weight(weight: u32) -> Result<()> {
    if weight > MAX_CATEGORY_WEIGHT {
        return Err(AppError::Validation(format!(
            "Weight must be between 0 and {}, got {}",
            MAX_CATEGORY_WEIGHT, weight
        )));
    }
    Ok(())
}

/// Colors are `#RGB` or `#RRGGBB`
pub fn validate_color(color: &str) -> Result<()> {
    let valid = match color.strip_prefix('#') {
        Some(hex) => (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    };

    if !valid {
        return Err(AppError::Validation(format!(
            "Color must be #RGB or #RRGGBB, got {:?}",
            color
        )));
    }
    Ok(())
}

pub fn validate_title(title: &str) -> Result<String> {
    let trimmed = title.trim();
    let len = trimmed.chars().count();
    if len == 0 {
        return Err(AppError::Validation("Title is required".to_string()));
    }
    if len > MAX_TASK_TITLE_LENGTH {
        return Err(AppError::Validation(format!(
            "Title must be at most {} characters",
            MAX_TASK_TITLE_LENGTH
        )));
    }
    Ok(trimmed.to_string())
}

/// Optional free text: blank becomes `None`, overlong is rejected.
pub fn validate_optional_text(
    field: &str,
    value: Option<String>,
    max_len: usize,
) -> Result<Option<String>> {
    let Some(value) = value else {
        return Ok(None);
    };

    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > max_len {
        return Err(AppError::Validation(format!(
            "{} must be at most {} characters",
            field, max_len
        )));
    }
    Ok(Some(trimmed.to_string()))
}

pub fn min_due_date() -> NaiveDate {
    let (y, m, d) = MIN_DUE_DATE;
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN)
}

pub fn validate_due_date(due_date: Option<NaiveDate>) -> Result<Option<NaiveDate>> {
    match due_date {
        Some(date) if date < min_due_date() => Err(AppError::Validation(format!(
            "Due date must be on or after {}, got {}",
            min_due_date(),
            date
        ))),
        other => Ok(other),
    }
}

/// Links must be absolute http(s) URLs
pub fn validate_link(link: Option<String>) -> Result<Option<String>> {
    let Some(link) = validate_optional_text("Link", link, MAX_LINK_LENGTH)? else {
        return Ok(None);
    };

    let rest = link
        .strip_prefix("https://")
        .or_else(|| link.strip_prefix("http://"));

    match rest {
        Some(host) if !host.is_empty() && !host.contains(char::is_whitespace) => Ok(Some(link)),
        _ => Err(AppError::Validation(format!(
            "Link must be an http(s) URL, got {:?}",
            link
        ))),
    }
}

/// A repeating task needs an interval; a non-repeating task never keeps one.
pub fn validate_repeat(
    is_repeating: bool,
    interval: Option<RepeatInterval>,
) -> Result<Option<RepeatInterval>> {
    match (is_repeating, interval) {
        (true, None) => Err(AppError::Validation(
            "Repeating tasks need a repeat interval".to_string(),
        )),
        (true, Some(interval)) => Ok(Some(interval)),
        (false, _) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_id_pattern() {
        assert!(validate_category_id("impact").is_ok());
        assert!(validate_category_id("deep-work_2").is_ok());
        assert!(validate_category_id("").is_err());
        assert!(validate_category_id("has space").is_err());
        assert!(validate_category_id("ünïcode").is_err());
        assert!(validate_category_id(&"a".repeat(50)).is_ok());
        assert!(validate_category_id(&"a".repeat(51)).is_err());
    }

    #[test]
    fn test_color_formats() {
        assert!(validate_color("#FFF").is_ok());
        assert!(validate_color("#ff6b6b").is_ok());
        assert!(validate_color("FF6B6B").is_err());
        assert!(validate_color("#FF6B6").is_err());
        assert!(validate_color("#GGGGGG").is_err());
    }

    #[test]
    fn test_weight_range() {
        assert!(validate_weight(0).is_ok());
        assert!(validate_weight(100).is_ok());
        assert!(validate_weight(101).is_err());
    }

    #[test]
    fn test_title_is_trimmed_and_bounded() {
        assert_eq!(validate_title("  Ship it  ").unwrap(), "Ship it");
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"x".repeat(201)).is_err());
    }

    #[test]
    fn test_due_date_minimum() {
        let early = NaiveDate::from_ymd_opt(1999, 12, 31);
        assert!(validate_due_date(early).is_err());
        assert_eq!(validate_due_date(None).unwrap(), None);
        assert_eq!(validate_due_date(Some(min_due_date())).unwrap(), Some(min_due_date()));
    }

    #[test]
    fn test_link_scheme() {
        assert!(validate_link(Some("https://example.com/x".into())).unwrap().is_some());
        assert_eq!(validate_link(Some("  ".into())).unwrap(), None);
        assert!(validate_link(Some("ftp://example.com".into())).is_err());
        assert!(validate_link(Some("https://".into())).is_err());
    }

    #[test]
    fn test_repeat_interval_rules() {
        assert!(validate_repeat(true, None).is_err());
        assert_eq!(
            validate_repeat(true, Some(RepeatInterval::Weekly)).unwrap(),
            Some(RepeatInterval::Weekly)
        );
        assert_eq!(validate_repeat(false, Some(RepeatInterval::Daily)).unwrap(), None);
    }
}
