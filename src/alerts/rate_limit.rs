//! Per-type alert rate limiting.
//!
//! An alert type is suppressed while it is in cooldown (fired less than
//! `cooldown` ago) or when it has already fired `max_per_hour` times in the
//! trailing 60 minutes. History older than 24 hours is pruned on every write.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// Firing history of one alert type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertRecord {
    pub last_fired_at: DateTime<Utc>,
    pub history: Vec<DateTime<Utc>>,
}

impl AlertRecord {
    fn fired_since(&self, since: DateTime<Utc>) -> usize {
        self.history.iter().filter(|t| **t > since).count()
    }
}

/// Rate limit state of one alert type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RateLimitInfo {
    pub alerts_last_hour: usize,
    /// Seconds since the last alert of this type, if it ever fired.
    pub last_alert_ago_secs: Option<i64>,
    pub in_cooldown: bool,
    pub cooldown_remaining_secs: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertTypeStats {
    pub last_alert: DateTime<Utc>,
    pub alerts_last_hour: usize,
    pub total_alerts: usize,
    pub rate_limited: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertStats {
    pub total_alert_types: usize,
    pub rate_limiting_active: bool,
    pub max_alerts_per_hour: u32,
    pub cooldown_minutes: u32,
    pub per_type: BTreeMap<String, AlertTypeStats>,
}

pub struct RateLimiter {
    max_per_hour: u32,
    cooldown_minutes: u32,
    records: Mutex<HashMap<String, AlertRecord>>,
}

impl RateLimiter {
    pub fn new(max_per_hour: u32, cooldown_minutes: u32) -> Self {
        Self {
            max_per_hour,
            cooldown_minutes,
            records: Mutex::new(HashMap::new()),
        }
    }

    fn cooldown(&self) -> Duration {
        Duration::minutes(i64::from(self.cooldown_minutes))
    }

    fn is_limited(&self, record: &AlertRecord, now: DateTime<Utc>) -> bool {
        if now - record.last_fired_at < self.cooldown() {
            return true;
        }
        record.fired_since(now - Duration::hours(1)) >= self.max_per_hour as usize
    }

    /// Admit and record an alert, or return why it is suppressed.
    ///
    /// The check and the record happen under one lock, so concurrent callers
    /// cannot both slip past the limit.
    pub fn try_acquire(&self, alert_type: &str, now: DateTime<Utc>) -> Result<(), RateLimitInfo> {
        let mut records = self.records.lock();
        if let Some(record) = records.get(alert_type)
            && self.is_limited(record, now)
        {
            return Err(self.info_for(Some(record), now));
        }

        let record = records
            .entry(alert_type.to_string())
            .or_insert_with(|| AlertRecord {
                last_fired_at: now,
                history: Vec::new(),
            });
        record.last_fired_at = now;
        record.history.push(now);
        let day_ago = now - Duration::hours(24);
        record.history.retain(|t| *t > day_ago);
        Ok(())
    }

    pub fn info(&self, alert_type: &str, now: DateTime<Utc>) -> RateLimitInfo {
        let records = self.records.lock();
        self.info_for(records.get(alert_type), now)
    }

    fn info_for(&self, record: Option<&AlertRecord>, now: DateTime<Utc>) -> RateLimitInfo {
        let Some(record) = record else {
            return RateLimitInfo::default();
        };
        let since_last = now - record.last_fired_at;
        let remaining = (self.cooldown() - since_last).max(Duration::zero());
        RateLimitInfo {
            alerts_last_hour: record.fired_since(now - Duration::hours(1)),
            last_alert_ago_secs: Some(since_last.num_seconds()),
            in_cooldown: since_last < self.cooldown(),
            cooldown_remaining_secs: remaining.num_seconds(),
        }
    }

    pub fn stats(&self, now: DateTime<Utc>) -> AlertStats {
        let records = self.records.lock();
        let per_type = records
            .iter()
            .map(|(alert_type, record)| {
                (
                    alert_type.clone(),
                    AlertTypeStats {
                        last_alert: record.last_fired_at,
                        alerts_last_hour: record.fired_since(now - Duration::hours(1)),
                        total_alerts: record.history.len(),
                        rate_limited: self.is_limited(record, now),
                    },
                )
            })
            .collect();

        AlertStats {
            total_alert_types: records.len(),
            rate_limiting_active: self.max_per_hour < 100,
            max_alerts_per_hour: self.max_per_hour,
            cooldown_minutes: self.cooldown_minutes,
            per_type,
        }
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}
