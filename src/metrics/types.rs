use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use super::segment::Segment;

/// Direction of a customer's visit cadence.
///
/// `Increasing` means visits are becoming more frequent (the gaps between
/// them are shrinking); `Decreasing` means the gaps are growing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VisitTrend {
    Increasing,
    Decreasing,
    Stable,
}

/// Lifetime-value snapshot for one customer.
///
/// Money is rounded to cents, percentages and day averages to one decimal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerMetrics {
    pub customer_id: i64,
    pub name: String,
    pub phone: String,
    pub segment: Segment,
    pub total_visits: u32,
    pub first_visit: NaiveDateTime,
    pub last_visit: NaiveDateTime,
    pub days_as_customer: i64,
    pub days_since_last_visit: i64,
    pub avg_days_between_visits: f64,
    pub visit_trend: VisitTrend,
    pub total_spend: f64,
    pub total_revenue: f64,
    pub total_tips: f64,
    pub avg_transaction_value: f64,
    pub avg_tip_percentage: f64,
    /// Naive linear extrapolation of the current cadence over the next
    /// 365 days. No seasonality, churn decay or confidence bound.
    pub predicted_ltv_12mo: f64,
    pub favorite_services: Vec<String>,
    pub favorite_technician: String,
}

/// Roll-up of one segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SegmentStats {
    pub count: u32,
    /// Sum of member total spend (price + tips).
    pub total_revenue: f64,
    pub avg_spend: f64,
}

/// Segment roll-ups keyed in reporting order. Segments with no members are
/// absent.
pub type SegmentSummary = BTreeMap<Segment, SegmentStats>;

/// Headline figures for the customer base.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CustomerOverview {
    pub total_customers: u32,
    pub total_ltv: f64,
    pub avg_ltv: f64,
    pub vip_count: u32,
    pub at_risk_count: u32,
}

/// A customer whose latest visit is older than the alert threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LapsedCustomer {
    pub customer_id: i64,
    pub name: String,
    pub phone: String,
    pub last_visit: NaiveDateTime,
    pub days_missed: i64,
}

/// Performance of one technician over a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechnicianPerformance {
    pub technician_id: i64,
    pub name: String,
    pub commission_rate: f64,
    pub appointment_count: u32,
    pub total_revenue: f64,
    pub total_tips: f64,
    /// Revenue times commission rate; tips are not commissioned.
    pub commission_earned: f64,
    pub avg_service_price: f64,
    pub unique_customers: u32,
    /// 1-based position by descending revenue.
    pub rank: u32,
}

/// Daily service revenue for one technician. Days without appointments are
/// omitted rather than zero-filled.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RevenueTrend {
    pub dates: Vec<NaiveDate>,
    pub revenues: Vec<f64>,
}

/// How many of a technician's customers came back within a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionMetrics {
    pub technician_id: i64,
    pub technician_name: String,
    pub total_customers: u32,
    pub returning_customers: u32,
    /// Percentage of customers with two or more visits.
    pub retention_rate: f64,
}

/// One line of a technician's service mix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceUsage {
    pub service_id: i64,
    pub service_name: String,
    pub count: u32,
    pub revenue: f64,
}

/// Salon-wide staff totals over a window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StaffSummary {
    pub total_technicians: u32,
    pub total_appointments: u32,
    pub total_revenue: f64,
    pub total_tips: f64,
    pub avg_revenue_per_tech: f64,
    pub date_range_days: i64,
}

/// A label and the money attributed to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledAmount {
    pub label: String,
    pub amount: f64,
}

/// Takings (price + tips) of a set of appointments, sliced three ways.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RevenueBreakdown {
    /// Ascending by period label.
    pub trend: Vec<LabeledAmount>,
    /// First-seen order.
    pub by_technician: Vec<LabeledAmount>,
    /// First-seen order.
    pub by_service: Vec<LabeledAmount>,
}
