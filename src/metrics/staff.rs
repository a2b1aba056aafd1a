//! Technician performance, revenue trend, retention and service mix.

use std::collections::{BTreeMap, HashSet};

use indexmap::IndexMap;

use super::types::{
    RetentionMetrics, RevenueTrend, ServiceUsage, StaffSummary, TechnicianPerformance,
};
use crate::date_util::{round_money, round_tenth};
use crate::ledger::{Appointment, Ledger};
use crate::query::period::DateWindow;

/// Customers need this many visits with the same technician inside a window
/// to count as retained.
const RETURNING_VISITS: u32 = 2;

/// Per-technician totals for every technician with at least one appointment
/// in `window`, highest revenue first and ranked from 1.
pub fn technician_performance(ledger: &Ledger, window: &DateWindow) -> Vec<TechnicianPerformance> {
    let mut rows: Vec<TechnicianPerformance> = ledger
        .list_technicians()
        .iter()
        .filter_map(|tech| {
            let appointments = ledger.list_appointments_for_technician(tech.id, Some(window));
            if appointments.is_empty() {
                return None;
            }
            let appointment_count = appointments.len() as u32;
            let total_revenue: f64 = appointments.iter().map(|a| a.price_charged).sum();
            let total_tips: f64 = appointments.iter().map(|a| a.tip_amount).sum();
            let unique_customers = appointments
                .iter()
                .map(|a| a.customer_id)
                .collect::<HashSet<_>>()
                .len() as u32;

            Some(TechnicianPerformance {
                technician_id: tech.id,
                name: tech.name.clone(),
                commission_rate: tech.commission_rate,
                appointment_count,
                total_revenue: round_money(total_revenue),
                total_tips: round_money(total_tips),
                commission_earned: round_money(total_revenue * tech.commission_rate),
                avg_service_price: round_money(total_revenue / appointment_count as f64),
                unique_customers,
                rank: 0,
            })
        })
        .collect();

    rows.sort_by(|a, b| b.total_revenue.total_cmp(&a.total_revenue));
    for (idx, row) in rows.iter_mut().enumerate() {
        row.rank = idx as u32 + 1;
    }
    log::debug!("ranked {} technicians over {window}", rows.len());
    rows
}

/// Service revenue per calendar day for one technician inside `window`.
pub fn technician_revenue_trend(
    ledger: &Ledger,
    technician_id: i64,
    window: &DateWindow,
) -> RevenueTrend {
    daily_revenue(ledger.list_appointments_for_technician(technician_id, Some(window)))
}

/// Price charged per calendar day, oldest day first. Days without
/// appointments are omitted.
pub fn daily_revenue<'a>(appointments: impl IntoIterator<Item = &'a Appointment>) -> RevenueTrend {
    let mut daily: BTreeMap<chrono::NaiveDate, f64> = BTreeMap::new();
    for appt in appointments {
        *daily.entry(appt.date_time.date()).or_insert(0.0) += appt.price_charged;
    }

    let (dates, revenues) = daily
        .into_iter()
        .map(|(date, revenue)| (date, round_money(revenue)))
        .unzip();
    RevenueTrend { dates, revenues }
}

/// Retention for every technician, including those without customers in
/// `window` (reported as zero).
pub fn customer_retention_by_technician(
    ledger: &Ledger,
    window: &DateWindow,
) -> Vec<RetentionMetrics> {
    ledger
        .list_technicians()
        .iter()
        .map(|tech| {
            let mut visits: IndexMap<i64, u32> = IndexMap::new();
            for appt in ledger.list_appointments_for_technician(tech.id, Some(window)) {
                *visits.entry(appt.customer_id).or_insert(0) += 1;
            }
            let total_customers = visits.len() as u32;
            let returning_customers =
                visits.values().filter(|&&n| n >= RETURNING_VISITS).count() as u32;
            let retention_rate = if total_customers > 0 {
                returning_customers as f64 / total_customers as f64 * 100.0
            } else {
                0.0
            };

            RetentionMetrics {
                technician_id: tech.id,
                technician_name: tech.name.clone(),
                total_customers,
                returning_customers,
                retention_rate: round_tenth(retention_rate),
            }
        })
        .collect()
}

/// A technician's most performed services across their whole history, most
/// frequent first, at most `limit` entries. Equal counts keep the order in
/// which each service first appeared.
pub fn top_services_by_technician(
    ledger: &Ledger,
    technician_id: i64,
    limit: usize,
) -> Vec<ServiceUsage> {
    let mut groups: IndexMap<i64, (u32, f64)> = IndexMap::new();
    for appt in ledger.list_appointments_for_technician(technician_id, None) {
        let entry = groups.entry(appt.service_id).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += appt.price_charged;
    }

    let mut usage: Vec<ServiceUsage> = groups
        .into_iter()
        .map(|(service_id, (count, revenue))| ServiceUsage {
            service_id,
            service_name: ledger.service_name(service_id).to_string(),
            count,
            revenue: round_money(revenue),
        })
        .collect();
    usage.sort_by(|a, b| b.count.cmp(&a.count));
    usage.truncate(limit);
    usage
}

/// Salon-wide appointment and revenue totals inside `window`. The
/// technician head count is all-time.
pub fn staff_summary_stats(ledger: &Ledger, window: &DateWindow) -> StaffSummary {
    let total_technicians = ledger.list_technicians().len() as u32;
    let (total_appointments, total_revenue, total_tips) = ledger
        .appointments_in(window)
        .fold((0u32, 0.0f64, 0.0f64), |(n, revenue, tips), a| {
            (n + 1, revenue + a.price_charged, tips + a.tip_amount)
        });
    let avg_revenue_per_tech = if total_technicians > 0 {
        total_revenue / total_technicians as f64
    } else {
        0.0
    };

    StaffSummary {
        total_technicians,
        total_appointments,
        total_revenue: round_money(total_revenue),
        total_tips: round_money(total_tips),
        avg_revenue_per_tech: round_money(avg_revenue_per_tech),
        date_range_days: window.whole_days(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::fixtures::*;
    use crate::ledger::{Ledger, UNKNOWN_LABEL};
    use chrono::Duration;

    fn last_30() -> DateWindow {
        DateWindow::trailing_days(now(), 30).unwrap()
    }

    fn find<'a>(rows: &'a [TechnicianPerformance], name: &str) -> &'a TechnicianPerformance {
        rows.iter().find(|r| r.name == name).unwrap()
    }

    #[test]
    fn test_performance_basic() {
        let perf = technician_performance(&staff_ledger(), &last_30());
        assert_eq!(perf.len(), 3);
        assert_eq!(perf[0].name, "Alice");
        assert_eq!(perf[0].rank, 1);
        assert_eq!(perf[0].appointment_count, 5);
        assert_eq!(perf[0].total_revenue, 240.0);
        assert_eq!(perf[0].total_tips, 46.0);
    }

    #[test]
    fn test_performance_ranking_order() {
        let perf = technician_performance(&staff_ledger(), &last_30());
        let order: Vec<(&str, u32)> = perf.iter().map(|p| (p.name.as_str(), p.rank)).collect();
        assert_eq!(order, vec![("Alice", 1), ("Bob", 2), ("Carol", 3)]);
    }

    #[test]
    fn test_commission_and_averages() {
        let perf = technician_performance(&staff_ledger(), &last_30());
        let alice = find(&perf, "Alice");
        assert_eq!(alice.commission_earned, 144.0);
        assert_eq!(alice.avg_service_price, 48.0);
        assert_eq!(alice.unique_customers, 3);
        let bob = find(&perf, "Bob");
        assert_eq!(bob.commission_earned, 57.75);
        assert_eq!(bob.unique_customers, 2);
    }

    #[test]
    fn test_performance_date_filtering() {
        let window = DateWindow::trailing_days(now(), 7).unwrap();
        let perf = technician_performance(&staff_ledger(), &window);
        assert_eq!(find(&perf, "Alice").appointment_count, 1);
        // Bob's latest appointment is 8 days old
        assert!(perf.iter().all(|p| p.name != "Bob"));
    }

    #[test]
    fn test_performance_two_technicians() {
        let ledger = Ledger::new(
            vec![customer(1, "C1"), customer(2, "C2")],
            vec![technician(1, "Alice", 0.6), technician(2, "Bob", 0.5)],
            vec![service(1, "Gel", 55.0), service(2, "Pedicure", 45.0), service(3, "Basic", 30.0)],
            vec![
                appt(1, days_ago(3), 1, 1, 1, 55.0, 5.0),
                appt(2, days_ago(4), 2, 1, 1, 55.0, 5.0),
                appt(3, days_ago(5), 1, 1, 2, 45.0, 5.0),
                appt(4, days_ago(6), 2, 2, 3, 30.0, 5.0),
            ],
        );
        let perf = technician_performance(&ledger, &last_30());
        assert_eq!(perf[0].name, "Alice");
        assert_eq!(perf[0].rank, 1);
        assert_eq!(perf[0].total_revenue, 155.0);
        assert_eq!(perf[1].name, "Bob");
        assert_eq!(perf[1].rank, 2);
        assert_eq!(perf[1].total_revenue, 30.0);
    }

    #[test]
    fn test_performance_ties_keep_technician_order() {
        let ledger = Ledger::new(
            vec![customer(1, "C1")],
            vec![technician(1, "Ana", 0.5), technician(2, "Ben", 0.5)],
            vec![service(1, "Basic", 30.0)],
            vec![
                appt(1, days_ago(2), 1, 2, 1, 30.0, 0.0),
                appt(2, days_ago(3), 1, 1, 1, 30.0, 0.0),
            ],
        );
        let perf = technician_performance(&ledger, &last_30());
        assert_eq!(perf[0].name, "Ana");
        assert_eq!(perf[1].name, "Ben");
        assert_eq!(perf[1].rank, 2);
    }

    #[test]
    fn test_no_appointments_means_no_rows() {
        let ledger = Ledger::new(vec![], vec![technician(1, "Solo", 0.6)], vec![], vec![]);
        assert!(technician_performance(&ledger, &last_30()).is_empty());
    }

    #[test]
    fn test_revenue_trend_groups_by_day() {
        let ledger = Ledger::new(
            vec![customer(1, "C1")],
            vec![technician(1, "Alice", 0.6)],
            vec![service(1, "Gel", 55.0)],
            vec![
                appt(1, days_ago(3), 1, 1, 1, 55.0, 5.0),
                appt(2, days_ago(3) + Duration::hours(2), 1, 1, 1, 45.0, 5.0),
                appt(3, days_ago(1), 1, 1, 1, 30.0, 0.0),
                appt(4, days_ago(45), 1, 1, 1, 99.0, 0.0),
            ],
        );
        let trend = technician_revenue_trend(&ledger, 1, &last_30());
        assert_eq!(
            trend.dates,
            vec![days_ago(3).date(), days_ago(1).date()]
        );
        assert_eq!(trend.revenues, vec![100.0, 30.0]);

        assert_eq!(technician_revenue_trend(&ledger, 42, &last_30()), RevenueTrend::default());
    }

    #[test]
    fn test_retention_calculation() {
        let window = DateWindow::trailing_days(now(), 90).unwrap();
        let retention = customer_retention_by_technician(&staff_ledger(), &window);
        assert_eq!(retention.len(), 3);
        let alice = retention.iter().find(|r| r.technician_name == "Alice").unwrap();
        assert_eq!(alice.total_customers, 3);
        assert_eq!(alice.returning_customers, 2);
        assert_eq!(alice.retention_rate, 66.7);
    }

    #[test]
    fn test_retention_all_new_customers() {
        let ledger = Ledger::new(
            vec![customer(1, "A"), customer(2, "B"), customer(3, "C")],
            vec![technician(1, "Dana", 0.6)],
            vec![service(1, "Basic", 30.0)],
            vec![
                appt(1, days_ago(5), 1, 1, 1, 30.0, 0.0),
                appt(2, days_ago(6), 2, 1, 1, 30.0, 0.0),
                appt(3, days_ago(7), 3, 1, 1, 30.0, 0.0),
            ],
        );
        let window = DateWindow::trailing_days(now(), 90).unwrap();
        let retention = customer_retention_by_technician(&ledger, &window);
        assert_eq!(retention[0].total_customers, 3);
        assert_eq!(retention[0].returning_customers, 0);
        assert_eq!(retention[0].retention_rate, 0.0);
    }

    #[test]
    fn test_retention_no_customers_is_zero_filled() {
        let ledger = Ledger::new(vec![], vec![technician(1, "Idle", 0.6)], vec![], vec![]);
        let window = DateWindow::trailing_days(now(), 90).unwrap();
        let retention = customer_retention_by_technician(&ledger, &window);
        assert_eq!(retention.len(), 1);
        assert_eq!(retention[0].total_customers, 0);
        assert_eq!(retention[0].retention_rate, 0.0);
    }

    #[test]
    fn test_top_services_ranking_and_revenue() {
        let top = top_services_by_technician(&staff_ledger(), 1, 3);
        assert!(top.len() <= 3);
        assert_eq!(top[0].service_name, "Gel Nails");
        assert_eq!(top[0].count, 3);
        assert_eq!(top[0].revenue, 165.0);
        // Manicure (25 days ago) appeared before Pedicure (15 days ago)
        assert_eq!(top[1].service_name, "Manicure");
        assert_eq!(top[2].service_name, "Pedicure");
    }

    #[test]
    fn test_top_services_limit_and_unknown() {
        assert_eq!(top_services_by_technician(&staff_ledger(), 1, 2).len(), 2);
        assert!(top_services_by_technician(&staff_ledger(), 1, 0).is_empty());
        assert!(top_services_by_technician(&staff_ledger(), 99, 5).is_empty());

        let ledger = Ledger::new(
            vec![customer(1, "C1")],
            vec![technician(1, "Alice", 0.6)],
            vec![],
            vec![appt(1, days_ago(3), 1, 1, 7, 40.0, 0.0)],
        );
        let top = top_services_by_technician(&ledger, 1, 5);
        assert_eq!(top[0].service_name, UNKNOWN_LABEL);
    }

    #[test]
    fn test_top_services_ignores_window() {
        let ledger = Ledger::new(
            vec![customer(1, "C1")],
            vec![technician(1, "Alice", 0.6)],
            vec![service(1, "Gel", 55.0)],
            vec![appt(1, days_ago(400), 1, 1, 1, 55.0, 0.0)],
        );
        assert_eq!(top_services_by_technician(&ledger, 1, 5)[0].count, 1);
    }

    #[test]
    fn test_summary_stats() {
        let stats = staff_summary_stats(&staff_ledger(), &last_30());
        assert_eq!(stats.total_technicians, 3);
        assert_eq!(stats.total_appointments, 10);
        assert_eq!(stats.total_revenue, 405.0);
        assert_eq!(stats.total_tips, 73.0);
        assert_eq!(stats.avg_revenue_per_tech, 135.0);
        assert_eq!(stats.date_range_days, 30);
    }

    #[test]
    fn test_summary_stats_empty() {
        let stats = staff_summary_stats(&Ledger::default(), &last_30());
        assert_eq!(stats.total_technicians, 0);
        assert_eq!(stats.total_appointments, 0);
        assert_eq!(stats.total_revenue, 0.0);
        assert_eq!(stats.avg_revenue_per_tech, 0.0);
    }
}
