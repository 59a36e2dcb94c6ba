use std::fmt;

use chrono::{DateTime, Utc};
use croner::Cron;

use crate::validation::ValidationError;

/// A parsed cron expression, evaluated in UTC.
///
/// Accepts standard 5-field expressions and 6-field expressions with a
/// leading seconds field.
pub struct CronSchedule {
    expression: String,
    cron: Cron,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidCron {
            expression: expression.to_string(),
            reason,
        };

        let fields = expression.split_whitespace().count();
        if !(5..=6).contains(&fields) {
            return Err(invalid(format!("expected 5 or 6 fields, found {}", fields)));
        }

        let cron = Cron::new(expression)
            .with_seconds_optional()
            .parse()
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            expression: expression.to_string(),
            cron,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The first fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.cron.find_next_occurrence(&after, false).ok()
    }
}

impl fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CronSchedule").field(&self.expression).finish()
    }
}
