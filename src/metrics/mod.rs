pub mod customer;
pub mod revenue;
pub mod segment;
pub mod staff;
pub mod types;

pub use customer::{
    calculate_customer_ltv, calculate_customer_metrics, customer_overview, lapsed_customers,
    segment_summary,
};
pub use revenue::{revenue_breakdown, Granularity};
pub use segment::{classify_customer, Segment, SegmentInputs, SegmentThresholds};
pub use staff::{
    customer_retention_by_technician, daily_revenue, staff_summary_stats, technician_performance,
    technician_revenue_trend, top_services_by_technician,
};
pub use types::*;
