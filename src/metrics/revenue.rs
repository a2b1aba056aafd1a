//! Revenue breakdowns over appointment history.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;

use super::types::{LabeledAmount, RevenueBreakdown};
use crate::date_util::round_money;
use crate::error::{Error, Result};
use crate::ledger::{Appointment, Ledger};
use crate::query::period::DateWindow;

/// Bucket size for the revenue trend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Granularity {
    #[default]
    Day,
    Month,
}

impl Granularity {
    fn label(&self, appt: &Appointment) -> String {
        match self {
            Granularity::Day => appt.date_time.format("%Y-%m-%d").to_string(),
            Granularity::Month => appt.date_time.format("%Y-%m").to_string(),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Day => write!(f, "day"),
            Granularity::Month => write!(f, "month"),
        }
    }
}

impl FromStr for Granularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "day" | "daily" | "d" => Ok(Granularity::Day),
            "month" | "monthly" | "m" => Ok(Granularity::Month),
            other => Err(Error::InvalidInput(format!(
                "unknown granularity '{other}', expected 'day' or 'month'"
            ))),
        }
    }
}

/// Takings (price + tips) of the selected appointments, bucketed by period
/// label, technician and service.
pub fn revenue_breakdown(
    ledger: &Ledger,
    technician_id: Option<i64>,
    window: Option<&DateWindow>,
    granularity: Granularity,
) -> RevenueBreakdown {
    let mut trend: BTreeMap<String, f64> = BTreeMap::new();
    let mut by_technician: IndexMap<&str, f64> = IndexMap::new();
    let mut by_service: IndexMap<&str, f64> = IndexMap::new();

    let selected = ledger
        .appointments()
        .iter()
        .filter(|a| technician_id.is_none_or(|id| a.technician_id == id))
        .filter(|a| window.is_none_or(|w| w.contains(a.date_time)));

    for appt in selected {
        let paid = appt.total_paid();
        *trend.entry(granularity.label(appt)).or_insert(0.0) += paid;
        *by_technician
            .entry(ledger.technician_name(appt.technician_id))
            .or_insert(0.0) += paid;
        *by_service
            .entry(ledger.service_name(appt.service_id))
            .or_insert(0.0) += paid;
    }

    RevenueBreakdown {
        trend: labeled(trend),
        by_technician: labeled(by_technician),
        by_service: labeled(by_service),
    }
}

fn labeled<K: ToString>(amounts: impl IntoIterator<Item = (K, f64)>) -> Vec<LabeledAmount> {
    amounts
        .into_iter()
        .map(|(label, amount)| LabeledAmount {
            label: label.to_string(),
            amount: round_money(amount),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::fixtures::*;
    use crate::ledger::UNKNOWN_LABEL;

    fn amounts(rows: &[LabeledAmount]) -> Vec<(&str, f64)> {
        rows.iter().map(|r| (r.label.as_str(), r.amount)).collect()
    }

    #[test]
    fn test_breakdown_by_technician_and_service() {
        let breakdown = revenue_breakdown(&staff_ledger(), None, None, Granularity::Day);
        // first-seen order follows the oldest appointment of each group
        assert_eq!(
            amounts(&breakdown.by_technician),
            vec![("Alice", 286.0), ("Bob", 123.0), ("Carol", 69.0)]
        );
        assert_eq!(breakdown.by_service[0].label, "Manicure");
        let total: f64 = breakdown.trend.iter().map(|r| r.amount).sum();
        assert_eq!(round_money(total), 478.0);
    }

    #[test]
    fn test_trend_sorted_ascending() {
        let breakdown = revenue_breakdown(&staff_ledger(), Some(1), None, Granularity::Day);
        let labels: Vec<&str> = breakdown.trend.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["2025-06-05", "2025-06-10", "2025-06-15", "2025-06-20", "2025-06-25"]
        );
        assert_eq!(breakdown.trend[4].amount, 65.0);
        assert_eq!(amounts(&breakdown.by_technician), vec![("Alice", 286.0)]);
    }

    #[test]
    fn test_monthly_buckets_and_window() {
        let ledger = Ledger::new(
            vec![customer(1, "C1")],
            vec![technician(1, "Alice", 0.6)],
            vec![service(1, "Gel", 55.0)],
            vec![
                appt(1, days_ago(40), 1, 1, 1, 50.0, 5.0),
                appt(2, days_ago(35), 1, 1, 1, 40.0, 0.0),
                appt(3, days_ago(2), 1, 1, 1, 30.0, 3.0),
            ],
        );
        let breakdown = revenue_breakdown(&ledger, None, None, Granularity::Month);
        assert_eq!(
            amounts(&breakdown.trend),
            vec![("2025-05", 95.0), ("2025-06", 33.0)]
        );

        let window = DateWindow::trailing_days(now(), 30).unwrap();
        let recent = revenue_breakdown(&ledger, None, Some(&window), Granularity::Month);
        assert_eq!(amounts(&recent.trend), vec![("2025-06", 33.0)]);
    }

    #[test]
    fn test_dangling_references_grouped_as_unknown() {
        let ledger = Ledger::new(
            vec![customer(1, "C1")],
            vec![],
            vec![],
            vec![
                appt(1, days_ago(3), 1, 8, 9, 20.0, 0.0),
                appt(2, days_ago(2), 1, 7, 6, 10.0, 0.0),
            ],
        );
        let breakdown = revenue_breakdown(&ledger, None, None, Granularity::Day);
        assert_eq!(amounts(&breakdown.by_technician), vec![(UNKNOWN_LABEL, 30.0)]);
        assert_eq!(amounts(&breakdown.by_service), vec![(UNKNOWN_LABEL, 30.0)]);
    }

    #[test]
    fn test_granularity_parse() {
        assert_eq!("Month".parse::<Granularity>().unwrap(), Granularity::Month);
        assert_eq!("day".parse::<Granularity>().unwrap(), Granularity::Day);
        assert!("week".parse::<Granularity>().is_err());
    }
}
