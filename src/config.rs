//! Business-tunable analytics settings stored in `app_config`.

use std::str::FromStr;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::metrics::segment::SegmentThresholds;

pub const HIGH_SPEND: &str = "segment.high_spend";
pub const FREQUENT_VISITS: &str = "segment.frequent_visits";
pub const REGULAR_FREQUENCY_DAYS: &str = "segment.regular_frequency_days";
pub const AT_RISK_DAYS: &str = "segment.at_risk_days";
pub const LOST_DAYS: &str = "segment.lost_days";
pub const LOYAL_FREQUENCY_FACTOR: &str = "segment.loyal_frequency_factor";
pub const PROMISING_MAX_VISITS: &str = "segment.promising_max_visits";
pub const PERFORMANCE_DAYS: &str = "window.performance_days";
pub const RETENTION_DAYS: &str = "window.retention_days";
pub const TREND_DAYS: &str = "window.trend_days";
pub const TOP_SERVICES_LIMIT: &str = "report.top_services_limit";
pub const LAPSED_DAYS: &str = "report.lapsed_days";

/// Upper bound for any configured window, roughly a century.
pub const MAX_WINDOW_DAYS: u32 = 36_500;

/// Every key `AnalyticsConfig` understands, in listing order.
pub const KNOWN_KEYS: [&str; 12] = [
    HIGH_SPEND,
    FREQUENT_VISITS,
    REGULAR_FREQUENCY_DAYS,
    AT_RISK_DAYS,
    LOST_DAYS,
    LOYAL_FREQUENCY_FACTOR,
    PROMISING_MAX_VISITS,
    PERFORMANCE_DAYS,
    RETENTION_DAYS,
    TREND_DAYS,
    TOP_SERVICES_LIMIT,
    LAPSED_DAYS,
];

/// Segment thresholds plus the default windows and limits used by reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsConfig {
    pub thresholds: SegmentThresholds,
    pub performance_window_days: u32,
    pub retention_window_days: u32,
    pub trend_days: u32,
    pub top_services_limit: usize,
    pub lapsed_days: u32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            thresholds: SegmentThresholds::default(),
            performance_window_days: 30,
            retention_window_days: 90,
            trend_days: 30,
            top_services_limit: 5,
            lapsed_days: 30,
        }
    }
}

impl AnalyticsConfig {
    /// Build from stored `(key, value)` rows on top of the defaults. Keys
    /// this crate does not recognise are skipped with a warning; a
    /// recognised key with a bad value is an error.
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self> {
        let mut config = Self::default();
        for (key, value) in pairs {
            if !config.apply(key, value)? {
                log::warn!("ignoring unknown config key '{key}'");
            }
        }
        config.thresholds.validate()?;
        Ok(config)
    }

    /// Check a value before it is written with `config set`. Unknown keys
    /// pass, since `app_config` is a free-form store.
    pub fn validate_entry(key: &str, value: &str) -> Result<()> {
        let mut probe = Self::default();
        if probe.apply(key, value)? {
            probe.thresholds.validate()?;
        }
        Ok(())
    }

    /// Effective value for every known key.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        let t = &self.thresholds;
        vec![
            (HIGH_SPEND, t.high_spend.to_string()),
            (FREQUENT_VISITS, t.frequent_visits.to_string()),
            (REGULAR_FREQUENCY_DAYS, t.regular_frequency_days.to_string()),
            (AT_RISK_DAYS, t.at_risk_days.to_string()),
            (LOST_DAYS, t.lost_days.to_string()),
            (LOYAL_FREQUENCY_FACTOR, t.loyal_frequency_factor.to_string()),
            (PROMISING_MAX_VISITS, t.promising_max_visits.to_string()),
            (PERFORMANCE_DAYS, self.performance_window_days.to_string()),
            (RETENTION_DAYS, self.retention_window_days.to_string()),
            (TREND_DAYS, self.trend_days.to_string()),
            (TOP_SERVICES_LIMIT, self.top_services_limit.to_string()),
            (LAPSED_DAYS, self.lapsed_days.to_string()),
        ]
    }

    /// Returns `false` when the key is not one of ours.
    fn apply(&mut self, key: &str, value: &str) -> Result<bool> {
        let t = &mut self.thresholds;
        match key {
            HIGH_SPEND => t.high_spend = parse(key, value)?,
            FREQUENT_VISITS => t.frequent_visits = parse(key, value)?,
            REGULAR_FREQUENCY_DAYS => t.regular_frequency_days = parse(key, value)?,
            AT_RISK_DAYS => t.at_risk_days = parse(key, value)?,
            LOST_DAYS => t.lost_days = parse(key, value)?,
            LOYAL_FREQUENCY_FACTOR => t.loyal_frequency_factor = parse(key, value)?,
            PROMISING_MAX_VISITS => t.promising_max_visits = parse(key, value)?,
            PERFORMANCE_DAYS => self.performance_window_days = parse_days(key, value)?,
            RETENTION_DAYS => self.retention_window_days = parse_days(key, value)?,
            TREND_DAYS => self.trend_days = parse_days(key, value)?,
            TOP_SERVICES_LIMIT => {
                self.top_services_limit = parse_positive::<u32>(key, value)? as usize
            }
            LAPSED_DAYS => self.lapsed_days = parse_days(key, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid value '{value}' for {key}")))
}

fn parse_positive<T: FromStr + PartialEq + Default>(key: &str, value: &str) -> Result<T> {
    let parsed: T = parse(key, value)?;
    if parsed == T::default() {
        return Err(Error::Config(format!("{key} must be greater than zero")));
    }
    Ok(parsed)
}

fn parse_days(key: &str, value: &str) -> Result<u32> {
    let days: u32 = parse_positive(key, value)?;
    if days > MAX_WINDOW_DAYS {
        return Err(Error::Config(format!(
            "{key} must be at most {MAX_WINDOW_DAYS} days"
        )));
    }
    Ok(days)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_when_empty() {
        let config = AnalyticsConfig::from_pairs(&[]).unwrap();
        assert_eq!(config, AnalyticsConfig::default());
        assert_eq!(config.thresholds.high_spend, 300.0);
        assert_eq!(config.thresholds.lost_days, 60);
        assert_eq!(config.retention_window_days, 90);
    }

    #[test]
    fn test_overrides_applied() {
        let config = AnalyticsConfig::from_pairs(&pairs(&[
            (HIGH_SPEND, "500"),
            (AT_RISK_DAYS, "40"),
            (TOP_SERVICES_LIMIT, "3"),
        ]))
        .unwrap();
        assert_eq!(config.thresholds.high_spend, 500.0);
        assert_eq!(config.thresholds.at_risk_days, 40);
        assert_eq!(config.top_services_limit, 3);
        assert_eq!(config.thresholds.frequent_visits, 5);
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let config =
            AnalyticsConfig::from_pairs(&pairs(&[("salon.name", "Polished")])).unwrap();
        assert_eq!(config, AnalyticsConfig::default());
    }

    #[test]
    fn test_bad_values_rejected() {
        let err = AnalyticsConfig::from_pairs(&pairs(&[(LOST_DAYS, "soon")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(AnalyticsConfig::from_pairs(&pairs(&[(HIGH_SPEND, "-5")])).is_err());
        assert!(AnalyticsConfig::from_pairs(&pairs(&[(PERFORMANCE_DAYS, "0")])).is_err());
    }

    #[test]
    fn test_validate_entry() {
        assert!(AnalyticsConfig::validate_entry(LOYAL_FREQUENCY_FACTOR, "2.0").is_ok());
        assert!(AnalyticsConfig::validate_entry(LOYAL_FREQUENCY_FACTOR, "0").is_err());
        assert!(AnalyticsConfig::validate_entry(FREQUENT_VISITS, "4.5").is_err());
        assert!(AnalyticsConfig::validate_entry("anything.else", "x").is_ok());
    }

    #[test]
    fn test_window_days_capped() {
        assert!(AnalyticsConfig::validate_entry(RETENTION_DAYS, "36500").is_ok());
        let err = AnalyticsConfig::validate_entry(RETENTION_DAYS, "4000000000").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(AnalyticsConfig::validate_entry(LAPSED_DAYS, "36501").is_err());
        assert!(AnalyticsConfig::from_pairs(&pairs(&[(TREND_DAYS, "100000")])).is_err());
    }

    #[test]
    fn test_entries_cover_known_keys() {
        let entries = AnalyticsConfig::default().entries();
        let keys: Vec<&str> = entries.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, KNOWN_KEYS.to_vec());
        assert_eq!(entries[0].1, "300");
    }
}
