//! Input validation shared by the maintenance operations.
//!
//! Validation failures are raised before any I/O and are never retried,
//! which keeps them distinct from transient storage failures.

use chrono::{DateTime, Duration, Months, NaiveDate, Utc};

use crate::config::MAX_RETENTION_DAYS;

/// Invalid input to a maintenance operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Backup date {date} is more than 24 hours in the future")]
    DateInFuture { date: NaiveDate },

    #[error("Backup date {date} is more than 10 years in the past")]
    DateTooOld { date: NaiveDate },

    #[error("Retention of {days} days is out of range (0-{max})", max = MAX_RETENTION_DAYS)]
    RetentionOutOfRange { days: i64 },

    #[error("Day count {days} is out of range (1-{max})", max = MAX_RETENTION_DAYS)]
    DayCountOutOfRange { days: u32 },

    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("Missing configuration: {0}")]
    MissingConfig(String),
}

/// Parse a `YYYY-MM-DD` string into a calendar date.
pub fn parse_backup_date(input: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(input.to_string()))
}

/// Check that a backup date (taken as midnight UTC) is at most 24 hours
/// ahead of `now` and at most ten years behind it.
pub fn validate_backup_date(date: NaiveDate, now: DateTime<Utc>) -> Result<(), ValidationError> {
    let start = date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    let Some(start) = start else {
        return Err(ValidationError::InvalidDate(date.to_string()));
    };

    if start - now > Duration::hours(24) {
        return Err(ValidationError::DateInFuture { date });
    }

    let earliest = now
        .date_naive()
        .checked_sub_months(Months::new(120))
        .unwrap_or(NaiveDate::MIN);
    if date < earliest {
        return Err(ValidationError::DateTooOld { date });
    }

    Ok(())
}

/// Retention periods must lie in `[0, 3650]` days.
pub fn validate_retention_days(days: i64) -> Result<u32, ValidationError> {
    if !(0..=i64::from(MAX_RETENTION_DAYS)).contains(&days) {
        return Err(ValidationError::RetentionOutOfRange { days });
    }
    Ok(days as u32)
}

/// Day counts for multi-day operations must lie in `[1, 3650]`.
pub fn validate_day_count(days: u32) -> Result<u32, ValidationError> {
    if days == 0 || days > MAX_RETENTION_DAYS {
        return Err(ValidationError::DayCountOutOfRange { days });
    }
    Ok(days)
}
