pub mod config;
pub mod date_util;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod query;
pub mod storage;

use chrono::NaiveDateTime;

pub use config::AnalyticsConfig;
pub use error::{Error, Result};
pub use ledger::{
    Appointment, Customer, Ledger, NewBooking, NewCustomer, NewService, NewTechnician, Service,
    Technician,
};
pub use metrics::{
    CustomerMetrics, CustomerOverview, Granularity, LapsedCustomer, RetentionMetrics,
    RevenueBreakdown, RevenueTrend, Segment, SegmentSummary, SegmentThresholds, ServiceUsage,
    StaffSummary, TechnicianPerformance, VisitTrend,
};
pub use query::builder::{AppointmentOrder, AppointmentQuery, AppointmentRow};
pub use query::period::{DateWindow, Period};
pub use storage::Database;

// Re-export repository types needed by the binary crate, but not the module itself
pub use storage::repository::LedgerStatus;

use storage::repository;

/// Current local wall-clock time, the default "now" for every report.
pub fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Main entry point: customer lifetime value and staff analytics over a
/// salon's appointment ledger.
///
/// Every report loads a fresh [`Ledger`] snapshot and the stored
/// [`AnalyticsConfig`], fills in default windows, then runs the pure
/// engine in [`metrics`].
pub struct SalonPulse {
    db: Database,
}

impl SalonPulse {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Snapshot of the whole ledger.
    pub async fn ledger(&self) -> Result<Ledger> {
        let ledger = self
            .db
            .reader()
            .call(|conn| repository::load_ledger(conn))
            .await?;
        Ok(ledger)
    }

    /// Stored settings layered over the defaults.
    pub async fn config(&self) -> Result<AnalyticsConfig> {
        let pairs = self.config_list().await?;
        AnalyticsConfig::from_pairs(&pairs)
    }

    pub async fn status(&self) -> Result<LedgerStatus> {
        let status = self
            .db
            .reader()
            .call(|conn| repository::ledger_status(conn))
            .await?;
        Ok(status)
    }

    // ── Customer analytics ─────────────────────────────────────────

    /// Lifetime-value snapshot of every customer with at least one visit,
    /// highest total spend first.
    pub async fn calculate_customer_ltv(
        &self,
        now: Option<NaiveDateTime>,
    ) -> Result<Vec<CustomerMetrics>> {
        let ledger = self.ledger().await?;
        let config = self.config().await?;
        metrics::calculate_customer_ltv(&ledger, &config.thresholds, now.unwrap_or_else(local_now))
    }

    pub async fn segment_summary(&self, now: Option<NaiveDateTime>) -> Result<SegmentSummary> {
        let customers = self.calculate_customer_ltv(now).await?;
        Ok(metrics::segment_summary(&customers))
    }

    pub async fn customer_overview(&self, now: Option<NaiveDateTime>) -> Result<CustomerOverview> {
        let customers = self.calculate_customer_ltv(now).await?;
        Ok(metrics::customer_overview(&customers))
    }

    /// Customers with no visit in the last `days` days (default from
    /// `report.lapsed_days`).
    pub async fn lapsed_customers(
        &self,
        days: Option<u32>,
        now: Option<NaiveDateTime>,
    ) -> Result<Vec<LapsedCustomer>> {
        let ledger = self.ledger().await?;
        let days = match days {
            Some(d) => d,
            None => self.config().await?.lapsed_days,
        };
        metrics::lapsed_customers(&ledger, days, now.unwrap_or_else(local_now))
    }

    // ── Staff analytics ────────────────────────────────────────────

    /// Ranked technician performance. `end` defaults to now and `start` to
    /// `window.performance_days` before `end`.
    pub async fn technician_performance(
        &self,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<TechnicianPerformance>> {
        let config = self.config().await?;
        let window = DateWindow::resolve(start, end, config.performance_window_days, local_now())?;
        let ledger = self.ledger().await?;
        Ok(metrics::technician_performance(&ledger, &window))
    }

    /// Daily revenue for one technician over the last `days` days (default
    /// `window.trend_days`).
    pub async fn technician_revenue_trend(
        &self,
        technician_id: i64,
        days: Option<u32>,
        now: Option<NaiveDateTime>,
    ) -> Result<RevenueTrend> {
        let days = match days {
            Some(d) => d,
            None => self.config().await?.trend_days,
        };
        let window = DateWindow::trailing_days(now.unwrap_or_else(local_now), days)?;
        let (technician, appointments) = self
            .db
            .reader()
            .call(move |conn| {
                Ok::<_, rusqlite::Error>((
                    repository::get_technician(conn, technician_id)?,
                    repository::list_appointments_for_technician(conn, technician_id, Some(&window))?,
                ))
            })
            .await?;
        if technician.is_none() {
            log::warn!("revenue trend requested for unknown technician {technician_id}");
        }
        Ok(metrics::daily_revenue(&appointments))
    }

    /// Retention per technician. `start` defaults to `window.retention_days`
    /// before `end`.
    pub async fn customer_retention_by_technician(
        &self,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<RetentionMetrics>> {
        let config = self.config().await?;
        let window = DateWindow::resolve(start, end, config.retention_window_days, local_now())?;
        let ledger = self.ledger().await?;
        Ok(metrics::customer_retention_by_technician(&ledger, &window))
    }

    pub async fn top_services_by_technician(
        &self,
        technician_id: i64,
        limit: Option<usize>,
    ) -> Result<Vec<ServiceUsage>> {
        let limit = match limit {
            Some(n) => n,
            None => self.config().await?.top_services_limit,
        };
        let ledger = self.ledger().await?;
        Ok(metrics::top_services_by_technician(&ledger, technician_id, limit))
    }

    pub async fn staff_summary_stats(
        &self,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<StaffSummary> {
        let config = self.config().await?;
        let window = DateWindow::resolve(start, end, config.performance_window_days, local_now())?;
        let ledger = self.ledger().await?;
        Ok(metrics::staff_summary_stats(&ledger, &window))
    }

    pub async fn revenue_breakdown(
        &self,
        technician_id: Option<i64>,
        window: Option<DateWindow>,
        granularity: Granularity,
    ) -> Result<RevenueBreakdown> {
        let ledger = self.ledger().await?;
        Ok(metrics::revenue_breakdown(
            &ledger,
            technician_id,
            window.as_ref(),
            granularity,
        ))
    }

    // ── Recording ──────────────────────────────────────────────────

    pub async fn add_technician(&self, tech: NewTechnician) -> Result<i64> {
        tech.validate()?;
        let id = self
            .db
            .writer()
            .call(move |conn| repository::insert_technician(conn, &tech))
            .await?;
        Ok(id)
    }

    pub async fn add_service(&self, service: NewService) -> Result<i64> {
        service.validate()?;
        let id = self
            .db
            .writer()
            .call(move |conn| repository::insert_service(conn, &service))
            .await?;
        Ok(id)
    }

    /// Insert a customer. A phone number already on file is rejected.
    pub async fn add_customer(&self, customer: NewCustomer) -> Result<i64> {
        customer.validate()?;
        let phone = customer.phone.trim().to_string();
        let existing = self
            .db
            .reader()
            .call(move |conn| repository::find_customer_by_phone(conn, &phone))
            .await?;
        if let Some(existing) = existing {
            return Err(Error::InvalidInput(format!(
                "phone {} already belongs to customer {} ({})",
                existing.phone, existing.id, existing.first_name
            )));
        }
        let id = self
            .db
            .writer()
            .call(move |conn| repository::insert_customer(conn, &customer))
            .await?;
        Ok(id)
    }

    /// Record an appointment, creating the customer on their first visit.
    /// Returns the new appointment id.
    pub async fn add_appointment(&self, booking: NewBooking) -> Result<i64> {
        let now = local_now();
        booking.validate(now)?;

        let (technician_id, service_id) = (booking.technician_id, booking.service_id);
        let (technician, service) = self
            .db
            .reader()
            .call(move |conn| {
                Ok::<_, rusqlite::Error>((
                    repository::get_technician(conn, technician_id)?,
                    repository::get_service(conn, service_id)?,
                ))
            })
            .await?;
        if technician.is_none() {
            return Err(Error::NotFound(format!("technician {technician_id}")));
        }
        if service.is_none() {
            return Err(Error::NotFound(format!("service {service_id}")));
        }

        let id = self
            .db
            .writer()
            .call(move |conn| {
                let tx = conn.transaction()?;
                let customer_id = repository::find_or_create_customer(&tx, &booking.customer())?;
                let id = repository::insert_appointment(&tx, &booking.appointment(customer_id, now))?;
                tx.commit()?;
                Ok::<i64, rusqlite::Error>(id)
            })
            .await?;
        log::info!("recorded appointment {id}");
        Ok(id)
    }

    // ── Config commands ────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.db
            .reader()
            .call({
                let key = key.to_string();
                move |conn| repository::get_config(conn, &key)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Store a setting. Recognised keys are type- and range-checked first.
    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        AnalyticsConfig::validate_entry(key, value)?;
        if !config::KNOWN_KEYS.contains(&key) {
            log::warn!("'{key}' is not an analytics setting; storing it anyway");
        }
        self.db
            .writer()
            .call({
                let key = key.to_string();
                let value = value.trim().to_string();
                move |conn| repository::set_config(conn, &key, &value)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        self.db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 30)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn booking(phone: &str, days_ago: i64, technician_id: i64, price: f64, tip: f64) -> NewBooking {
        NewBooking {
            technician_id,
            service_id: 1,
            customer_name: format!("Client {phone}"),
            customer_phone: phone.to_string(),
            price_charged: price,
            tip_amount: tip,
            payment_method: Some("Cash".to_string()),
            date_time: Some(now() - Duration::days(days_ago)),
        }
    }

    async fn salon() -> SalonPulse {
        let app = SalonPulse::new(Database::open_memory().await.unwrap());
        for (name, rate) in [("Alice", 0.6), ("Bob", 0.5)] {
            app.add_technician(NewTechnician {
                name: name.to_string(),
                commission_rate: rate,
            })
            .await
            .unwrap();
        }
        app.add_service(NewService {
            name: "Gel Nails".to_string(),
            base_price: 55.0,
            category: None,
        })
        .await
        .unwrap();
        app
    }

    #[tokio::test]
    async fn test_add_appointment_creates_customer_once() {
        let app = salon().await;
        app.add_appointment(booking("555-0100", 20, 1, 55.0, 10.0)).await.unwrap();
        app.add_appointment(booking(" 555-0100 ", 5, 2, 50.0, 5.0)).await.unwrap();

        let status = app.status().await.unwrap();
        assert_eq!(status.customers, 1);
        assert_eq!(status.appointments, 2);

        let ltv = app.calculate_customer_ltv(Some(now())).await.unwrap();
        assert_eq!(ltv.len(), 1);
        assert_eq!(ltv[0].total_visits, 2);
        assert_eq!(ltv[0].total_spend, 120.0);
        assert_eq!(ltv[0].days_since_last_visit, 5);
    }

    #[tokio::test]
    async fn test_add_appointment_rejects_bad_references() {
        let app = salon().await;
        let err = app
            .add_appointment(booking("555-0101", 1, 9, 30.0, 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let mut bad_service = booking("555-0101", 1, 1, 30.0, 0.0);
        bad_service.service_id = 7;
        assert!(matches!(
            app.add_appointment(bad_service).await,
            Err(Error::NotFound(_))
        ));

        let err = app
            .add_appointment(booking("555-0101", 1, 1, -30.0, 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let mut future = booking("555-0101", 1, 1, 30.0, 0.0);
        future.date_time = Some(local_now() + Duration::days(3));
        let err = app.add_appointment(future).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(app.status().await.unwrap().appointments, 0);
    }

    #[tokio::test]
    async fn test_add_customer_rejects_duplicate_phone() {
        let app = salon().await;
        let customer = NewCustomer {
            first_name: "Dana".to_string(),
            phone: "555-0200".to_string(),
            notes: None,
        };
        app.add_customer(customer.clone()).await.unwrap();
        assert!(matches!(
            app.add_customer(customer).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_stored_thresholds_drive_segmentation() {
        let app = salon().await;
        app.add_appointment(booking("555-0300", 10, 1, 200.0, 20.0)).await.unwrap();

        // 220 spend is below the default 300 high-spend mark
        let ltv = app.calculate_customer_ltv(Some(now())).await.unwrap();
        assert_eq!(ltv[0].segment, Segment::Promising);

        app.config_set(config::HIGH_SPEND, "200").await.unwrap();
        let ltv = app.calculate_customer_ltv(Some(now())).await.unwrap();
        assert_eq!(ltv[0].segment, Segment::Vip);

        let summary = app.segment_summary(Some(now())).await.unwrap();
        assert_eq!(summary[&Segment::Vip].count, 1);
        let overview = app.customer_overview(Some(now())).await.unwrap();
        assert_eq!(overview.vip_count, 1);
        assert_eq!(overview.total_ltv, 220.0);
    }

    #[tokio::test]
    async fn test_config_set_validates_known_keys() {
        let app = salon().await;
        assert!(app.config_set(config::LOST_DAYS, "never").await.is_err());
        assert_eq!(app.config_get(config::LOST_DAYS).await.unwrap(), None);

        app.config_set("salon.name", "Polished").await.unwrap();
        assert_eq!(
            app.config_get("salon.name").await.unwrap(),
            Some("Polished".to_string())
        );
        assert_eq!(app.config().await.unwrap(), AnalyticsConfig::default());
    }

    #[tokio::test]
    async fn test_staff_reports_with_explicit_window() {
        let app = salon().await;
        app.add_appointment(booking("555-0400", 3, 1, 55.0, 5.0)).await.unwrap();
        app.add_appointment(booking("555-0400", 4, 1, 55.0, 5.0)).await.unwrap();
        app.add_appointment(booking("555-0401", 5, 2, 30.0, 5.0)).await.unwrap();

        let start = Some(now() - Duration::days(30));
        let end = Some(now());

        let perf = app.technician_performance(start, end).await.unwrap();
        assert_eq!(perf.len(), 2);
        assert_eq!(perf[0].name, "Alice");
        assert_eq!(perf[0].total_revenue, 110.0);
        assert_eq!(perf[1].rank, 2);

        let retention = app.customer_retention_by_technician(start, end).await.unwrap();
        assert_eq!(retention[0].retention_rate, 100.0);
        assert_eq!(retention[1].retention_rate, 0.0);

        let trend = app.technician_revenue_trend(1, Some(7), Some(now())).await.unwrap();
        assert_eq!(trend.revenues, vec![55.0, 55.0]);
        assert_eq!(
            trend.dates,
            vec![(now() - Duration::days(4)).date(), (now() - Duration::days(3)).date()]
        );
        let none = app.technician_revenue_trend(42, Some(7), Some(now())).await.unwrap();
        assert_eq!(none, RevenueTrend::default());

        let top = app.top_services_by_technician(1, None).await.unwrap();
        assert_eq!(top[0].count, 2);

        let summary = app.staff_summary_stats(start, end).await.unwrap();
        assert_eq!(summary.total_appointments, 3);
        assert_eq!(summary.total_revenue, 140.0);
        assert_eq!(summary.avg_revenue_per_tech, 70.0);

        assert!(matches!(
            app.technician_performance(end, start).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_lapsed_and_revenue_breakdown() {
        let app = salon().await;
        app.add_appointment(booking("555-0500", 45, 1, 40.0, 0.0)).await.unwrap();
        app.add_appointment(booking("555-0501", 2, 2, 30.0, 3.0)).await.unwrap();

        let lapsed = app.lapsed_customers(None, Some(now())).await.unwrap();
        assert_eq!(lapsed.len(), 1);
        assert_eq!(lapsed[0].phone, "555-0500");
        assert_eq!(lapsed[0].days_missed, 45);

        let breakdown = app
            .revenue_breakdown(Some(2), None, Granularity::Month)
            .await
            .unwrap();
        assert_eq!(breakdown.trend.len(), 1);
        assert_eq!(breakdown.trend[0].label, "2025-06");
        assert_eq!(breakdown.trend[0].amount, 33.0);
    }
}
