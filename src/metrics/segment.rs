//! Customer segmentation.
//!
//! Segments are assigned by an ordered rule table: the first rule whose
//! predicate holds wins, and a customer matching none of them needs
//! attention. Later rules are written assuming every earlier rule failed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Behavioural segment of a customer.
///
/// Variant order is the reporting order used by summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Segment {
    #[serde(rename = "VIP")]
    Vip,
    Champion,
    Loyal,
    Promising,
    #[serde(rename = "At-Risk")]
    AtRisk,
    #[serde(rename = "Needs Attention")]
    NeedsAttention,
    Lost,
}

impl Segment {
    pub const ALL: [Segment; 7] = [
        Segment::Vip,
        Segment::Champion,
        Segment::Loyal,
        Segment::Promising,
        Segment::AtRisk,
        Segment::NeedsAttention,
        Segment::Lost,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Segment::Vip => "VIP",
            Segment::Champion => "Champion",
            Segment::Loyal => "Loyal",
            Segment::Promising => "Promising",
            Segment::AtRisk => "At-Risk",
            Segment::NeedsAttention => "Needs Attention",
            Segment::Lost => "Lost",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Segment {
    type Err = Error;

    /// Accepts the display label or a loose spelling (`at-risk`, `at_risk`,
    /// `needs attention`), case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        Segment::ALL
            .into_iter()
            .find(|seg| {
                seg.label()
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric())
                    .collect::<String>()
                    .eq_ignore_ascii_case(&normalized)
            })
            .ok_or_else(|| Error::InvalidInput(format!("unknown segment: {s}")))
    }
}

/// Business-tunable cut-offs for segmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentThresholds {
    /// Lifetime spend (price + tips) that marks a high-value customer.
    pub high_spend: f64,
    /// Visit count that marks a frequent customer.
    pub frequent_visits: i64,
    /// Expected days between visits for a regular, and the recency limit
    /// for VIP, Champion and Promising.
    pub regular_frequency_days: i64,
    pub at_risk_days: i64,
    pub lost_days: i64,
    /// Loyal customers may visit this many times less often than a regular.
    pub loyal_frequency_factor: f64,
    pub promising_max_visits: i64,
}

impl Default for SegmentThresholds {
    fn default() -> Self {
        Self {
            high_spend: 300.0,
            frequent_visits: 5,
            regular_frequency_days: 28,
            at_risk_days: 45,
            lost_days: 60,
            loyal_frequency_factor: 1.5,
            promising_max_visits: 3,
        }
    }
}

impl SegmentThresholds {
    pub fn validate(&self) -> Result<()> {
        if !self.high_spend.is_finite() || self.high_spend < 0.0 {
            return Err(Error::Config(format!(
                "high spend threshold must be non-negative, got {}",
                self.high_spend
            )));
        }
        if !self.loyal_frequency_factor.is_finite() || self.loyal_frequency_factor <= 0.0 {
            return Err(Error::Config(format!(
                "loyal frequency factor must be positive, got {}",
                self.loyal_frequency_factor
            )));
        }
        let counts = [
            ("frequent visits", self.frequent_visits),
            ("regular frequency days", self.regular_frequency_days),
            ("at-risk days", self.at_risk_days),
            ("lost days", self.lost_days),
            ("promising max visits", self.promising_max_visits),
        ];
        if let Some((name, value)) = counts.iter().find(|(_, v)| *v < 0) {
            return Err(Error::Config(format!(
                "{name} threshold must be non-negative, got {value}"
            )));
        }
        Ok(())
    }

    fn loyal_frequency_days(&self) -> f64 {
        self.regular_frequency_days as f64 * self.loyal_frequency_factor
    }
}

/// The four derived figures segmentation looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentInputs {
    pub total_visits: i64,
    pub days_since_last_visit: i64,
    pub total_spend: f64,
    pub avg_days_between_visits: f64,
}

impl SegmentInputs {
    fn validate(&self) -> Result<()> {
        if self.total_visits < 0 {
            return Err(Error::InvalidInput(format!(
                "total visits must be non-negative, got {}",
                self.total_visits
            )));
        }
        if self.days_since_last_visit < 0 {
            return Err(Error::InvalidInput(format!(
                "days since last visit must be non-negative, got {}",
                self.days_since_last_visit
            )));
        }
        if !self.total_spend.is_finite() || self.total_spend < 0.0 {
            return Err(Error::InvalidInput(format!(
                "total spend must be a non-negative amount, got {}",
                self.total_spend
            )));
        }
        if !self.avg_days_between_visits.is_finite() {
            return Err(Error::InvalidInput(format!(
                "average days between visits must be finite, got {}",
                self.avg_days_between_visits
            )));
        }
        Ok(())
    }

    fn is_frequent(&self, t: &SegmentThresholds) -> bool {
        self.total_visits >= t.frequent_visits
    }

    fn is_high_spend(&self, t: &SegmentThresholds) -> bool {
        self.total_spend >= t.high_spend
    }

    fn is_recent(&self, t: &SegmentThresholds) -> bool {
        self.days_since_last_visit <= t.regular_frequency_days
    }

    fn visits_regularly(&self, t: &SegmentThresholds) -> bool {
        self.avg_days_between_visits <= t.regular_frequency_days as f64
    }
}

type Rule = fn(&SegmentInputs, &SegmentThresholds) -> bool;

fn is_lost(m: &SegmentInputs, t: &SegmentThresholds) -> bool {
    m.days_since_last_visit > t.lost_days
}

fn is_vip(m: &SegmentInputs, t: &SegmentThresholds) -> bool {
    m.is_high_spend(t) && m.is_recent(t)
}

fn is_champion(m: &SegmentInputs, t: &SegmentThresholds) -> bool {
    m.is_frequent(t) && m.visits_regularly(t) && m.is_recent(t)
}

fn is_at_risk(m: &SegmentInputs, t: &SegmentThresholds) -> bool {
    (m.is_frequent(t) || m.is_high_spend(t)) && m.days_since_last_visit > t.at_risk_days
}

fn is_loyal(m: &SegmentInputs, t: &SegmentThresholds) -> bool {
    m.is_frequent(t) && m.avg_days_between_visits <= t.loyal_frequency_days()
}

fn is_promising(m: &SegmentInputs, t: &SegmentThresholds) -> bool {
    m.total_visits <= t.promising_max_visits && m.is_recent(t)
}

/// Evaluated top-down; first match wins.
static RULES: [(Segment, Rule); 6] = [
    (Segment::Lost, is_lost),
    (Segment::Vip, is_vip),
    (Segment::Champion, is_champion),
    (Segment::AtRisk, is_at_risk),
    (Segment::Loyal, is_loyal),
    (Segment::Promising, is_promising),
];

/// Assign a segment to a customer's derived metrics.
///
/// Total over all valid inputs. Negative visit counts, negative or
/// non-finite spend and non-finite visit cadence are rejected.
pub fn classify_customer(inputs: &SegmentInputs, thresholds: &SegmentThresholds) -> Result<Segment> {
    inputs.validate()?;
    let segment = RULES
        .iter()
        .find(|(_, matches)| matches(inputs, thresholds))
        .map_or(Segment::NeedsAttention, |(segment, _)| *segment);
    Ok(segment)
}
