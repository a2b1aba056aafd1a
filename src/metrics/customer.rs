//! Customer lifetime value: per-customer metrics, favourite picks and
//! portfolio roll-ups.

use chrono::NaiveDateTime;
use indexmap::IndexMap;

use super::segment::{classify_customer, Segment, SegmentInputs, SegmentThresholds};
use super::types::{
    CustomerMetrics, CustomerOverview, LapsedCustomer, SegmentStats, SegmentSummary, VisitTrend,
};
use crate::date_util::{round_money, round_tenth, whole_days_between};
use crate::error::Result;
use crate::ledger::{Appointment, Customer, Ledger};
use crate::query::period::days_before;

/// Returned by [`favorite_technician`] when there is nothing to pick from.
pub const NO_FAVORITE: &str = "None";

const FAVORITE_SERVICE_COUNT: usize = 2;
const DAYS_PER_YEAR: f64 = 365.0;
/// Second-half gaps below this share of first-half gaps read as visits
/// speeding up.
const TREND_FASTER_RATIO: f64 = 0.8;
/// Second-half gaps above this share of first-half gaps read as visits
/// slowing down.
const TREND_SLOWER_RATIO: f64 = 1.2;

/// Compute the lifetime-value snapshot for one customer.
///
/// `appointments` need not be sorted. Returns `Ok(None)` for a customer
/// with no appointments; such customers are left out of every report.
pub fn calculate_customer_metrics(
    customer: &Customer,
    appointments: &[&Appointment],
    ledger: &Ledger,
    thresholds: &SegmentThresholds,
    now: NaiveDateTime,
) -> Result<Option<CustomerMetrics>> {
    let mut visits = appointments.to_vec();
    visits.sort_by_key(|a| a.date_time);

    let (first_visit, last_visit) = match (visits.first(), visits.last()) {
        (Some(first), Some(last)) => (first.date_time, last.date_time),
        _ => return Ok(None),
    };

    let total_visits = visits.len();
    let total_revenue: f64 = visits.iter().map(|a| a.price_charged).sum();
    let total_tips: f64 = visits.iter().map(|a| a.tip_amount).sum();
    let total_spend = total_revenue + total_tips;

    let days_as_customer = whole_days_between(first_visit, now);
    let days_since_last_visit = whole_days_between(last_visit, now);

    let gaps: Vec<i64> = visits
        .windows(2)
        .map(|pair| whole_days_between(pair[0].date_time, pair[1].date_time))
        .collect();
    // A single visit has no cadence yet; tenure stands in for it.
    let avg_days_between_visits = mean(&gaps).unwrap_or(days_as_customer as f64);

    let avg_transaction_value = total_spend / total_visits as f64;
    let avg_tip_percentage = if total_revenue > 0.0 {
        total_tips / total_revenue * 100.0
    } else {
        0.0
    };
    let predicted_ltv_12mo = predicted_ltv_12mo(avg_days_between_visits, avg_transaction_value);

    let segment = classify_customer(
        &SegmentInputs {
            total_visits: total_visits as i64,
            days_since_last_visit,
            total_spend,
            avg_days_between_visits,
        },
        thresholds,
    )?;

    Ok(Some(CustomerMetrics {
        customer_id: customer.id,
        name: customer.first_name.clone(),
        phone: customer.phone.clone(),
        segment,
        total_visits: total_visits as u32,
        first_visit,
        last_visit,
        days_as_customer,
        days_since_last_visit,
        avg_days_between_visits: round_tenth(avg_days_between_visits),
        visit_trend: visit_trend(&gaps),
        total_spend: round_money(total_spend),
        total_revenue: round_money(total_revenue),
        total_tips: round_money(total_tips),
        avg_transaction_value: round_money(avg_transaction_value),
        avg_tip_percentage: round_tenth(avg_tip_percentage),
        predicted_ltv_12mo: round_money(predicted_ltv_12mo),
        favorite_services: favorite_services(&visits, ledger),
        favorite_technician: favorite_technician(&visits, ledger),
    }))
}

/// Visits expected over the next year at the current cadence, times the
/// average ticket. Zero when the cadence is not positive.
pub fn predicted_ltv_12mo(avg_days_between_visits: f64, avg_transaction_value: f64) -> f64 {
    if avg_days_between_visits > 0.0 {
        DAYS_PER_YEAR / avg_days_between_visits * avg_transaction_value
    } else {
        0.0
    }
}

/// Compare the mean gap of the later half of visits with the earlier half.
///
/// Needs at least two gaps (three visits); anything shorter is `Stable`.
pub fn visit_trend(gaps: &[i64]) -> VisitTrend {
    if gaps.len() < 2 {
        return VisitTrend::Stable;
    }
    let (first_half, second_half) = gaps.split_at(gaps.len() / 2);
    let (Some(first_avg), Some(second_avg)) = (mean(first_half), mean(second_half)) else {
        return VisitTrend::Stable;
    };

    if second_avg < first_avg * TREND_FASTER_RATIO {
        VisitTrend::Increasing
    } else if second_avg > first_avg * TREND_SLOWER_RATIO {
        VisitTrend::Decreasing
    } else {
        VisitTrend::Stable
    }
}

/// The two most booked service names, most frequent first. Ties keep the
/// order in which the services were first booked.
pub fn favorite_services(appointments: &[&Appointment], ledger: &Ledger) -> Vec<String> {
    let mut ranked: Vec<(&str, usize)> =
        tally(appointments.iter().map(|a| ledger.service_name(a.service_id)))
            .into_iter()
            .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
        .into_iter()
        .take(FAVORITE_SERVICE_COUNT)
        .map(|(name, _)| name.to_string())
        .collect()
}

/// The technician seen most often; the earliest-seen wins a tie.
/// [`NO_FAVORITE`] when there are no appointments.
pub fn favorite_technician(appointments: &[&Appointment], ledger: &Ledger) -> String {
    let mut best: Option<(&str, usize)> = None;
    for (name, count) in tally(appointments.iter().map(|a| ledger.technician_name(a.technician_id))) {
        if best.is_none_or(|(_, best_count)| count > best_count) {
            best = Some((name, count));
        }
    }
    best.map_or_else(|| NO_FAVORITE.to_string(), |(name, _)| name.to_string())
}

/// Lifetime-value snapshots for every customer with at least one
/// appointment, highest total spend first.
pub fn calculate_customer_ltv(
    ledger: &Ledger,
    thresholds: &SegmentThresholds,
    now: NaiveDateTime,
) -> Result<Vec<CustomerMetrics>> {
    let by_customer = ledger.appointments_by_customer();

    let mut metrics = Vec::with_capacity(by_customer.len());
    for customer in ledger.list_customers() {
        let Some(appointments) = by_customer.get(&customer.id) else {
            continue;
        };
        if let Some(m) = calculate_customer_metrics(customer, appointments, ledger, thresholds, now)? {
            metrics.push(m);
        }
    }

    metrics.sort_by(|a, b| b.total_spend.total_cmp(&a.total_spend));
    log::debug!(
        "computed lifetime value for {} of {} customers",
        metrics.len(),
        ledger.list_customers().len()
    );
    Ok(metrics)
}

/// Count, total spend and average spend per segment.
pub fn segment_summary(customers: &[CustomerMetrics]) -> SegmentSummary {
    let mut summary = SegmentSummary::new();
    for customer in customers {
        let stats = summary.entry(customer.segment).or_default();
        stats.count += 1;
        stats.total_revenue += customer.total_spend;
    }
    for stats in summary.values_mut() {
        stats.avg_spend = if stats.count > 0 {
            round_money(stats.total_revenue / stats.count as f64)
        } else {
            0.0
        };
        stats.total_revenue = round_money(stats.total_revenue);
    }
    summary
}

/// Headline totals for the customer analytics page.
pub fn customer_overview(customers: &[CustomerMetrics]) -> CustomerOverview {
    let total_customers = customers.len() as u32;
    let total_ltv: f64 = customers.iter().map(|c| c.total_spend).sum();
    let count_in = |segment: Segment| customers.iter().filter(|c| c.segment == segment).count() as u32;

    CustomerOverview {
        total_customers,
        total_ltv: round_money(total_ltv),
        avg_ltv: if total_customers > 0 {
            round_money(total_ltv / total_customers as f64)
        } else {
            0.0
        },
        vip_count: count_in(Segment::Vip),
        at_risk_count: count_in(Segment::AtRisk),
    }
}

/// Customers whose most recent visit is older than `days` before `now`,
/// longest-absent first.
pub fn lapsed_customers(
    ledger: &Ledger,
    days: u32,
    now: NaiveDateTime,
) -> Result<Vec<LapsedCustomer>> {
    let cutoff = days_before(now, days)?;
    let by_customer = ledger.appointments_by_customer();

    let mut lapsed: Vec<LapsedCustomer> = ledger
        .list_customers()
        .iter()
        .filter_map(|customer| {
            let last_visit = by_customer
                .get(&customer.id)?
                .iter()
                .map(|a| a.date_time)
                .max()?;
            (last_visit < cutoff).then(|| LapsedCustomer {
                customer_id: customer.id,
                name: customer.first_name.clone(),
                phone: customer.phone.clone(),
                last_visit,
                days_missed: whole_days_between(last_visit, now),
            })
        })
        .collect();
    lapsed.sort_by(|a, b| b.days_missed.cmp(&a.days_missed));
    Ok(lapsed)
}

/// Occurrence counts in first-seen order.
fn tally<'a>(names: impl IntoIterator<Item = &'a str>) -> IndexMap<&'a str, usize> {
    let mut counts = IndexMap::new();
    for name in names {
        *counts.entry(name).or_insert(0) += 1;
    }
    counts
}

fn mean(values: &[i64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<i64>() as f64 / values.len() as f64)
}
