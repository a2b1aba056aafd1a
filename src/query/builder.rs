use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::ledger::UNKNOWN_LABEL;
use crate::query::period::DateWindow;
use crate::storage::Database;

/// A row from an appointment history query, with names resolved.
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentRow {
    pub id: i64,
    pub date_time: NaiveDateTime,
    pub customer_id: i64,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub technician_id: i64,
    pub technician_name: String,
    pub service_id: i64,
    pub service_name: String,
    pub price_charged: f64,
    pub tip_amount: f64,
    pub total_paid: f64,
    pub payment_method: Option<String>,
}

/// Sort key for appointment listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AppointmentOrder {
    #[default]
    Date,
    Price,
    Tip,
    Total,
}

impl AppointmentOrder {
    fn column(&self) -> &'static str {
        match self {
            AppointmentOrder::Date => "a.date_time",
            AppointmentOrder::Price => "a.price_charged",
            AppointmentOrder::Tip => "a.tip_amount",
            AppointmentOrder::Total => "(a.price_charged + a.tip_amount)",
        }
    }
}

impl FromStr for AppointmentOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "date" | "date_time" => Ok(AppointmentOrder::Date),
            "price" => Ok(AppointmentOrder::Price),
            "tip" => Ok(AppointmentOrder::Tip),
            "total" => Ok(AppointmentOrder::Total),
            other => Err(Error::InvalidInput(format!(
                "unknown order field '{other}', expected date, price, tip or total"
            ))),
        }
    }
}

/// Builder for constructing appointment history queries with optional filters.
#[derive(Debug, Clone, Default)]
pub struct AppointmentQuery {
    technician_id: Option<i64>,
    customer_id: Option<i64>,
    customer_phone: Option<String>,
    service_id: Option<i64>,
    payment_method: Option<String>,
    after: Option<NaiveDateTime>,
    before: Option<NaiveDateTime>,
    limit: Option<u32>,
    order_by: AppointmentOrder,
    order_desc: bool,
}

impl AppointmentQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn technician(mut self, id: i64) -> Self {
        self.technician_id = Some(id);
        self
    }

    pub fn customer(mut self, id: i64) -> Self {
        self.customer_id = Some(id);
        self
    }

    pub fn customer_phone(mut self, phone: &str) -> Self {
        self.customer_phone = Some(phone.trim().to_string());
        self
    }

    pub fn service(mut self, id: i64) -> Self {
        self.service_id = Some(id);
        self
    }

    pub fn payment_method(mut self, method: &str) -> Self {
        self.payment_method = Some(method.to_string());
        self
    }

    /// Inclusive lower bound.
    pub fn after(mut self, t: NaiveDateTime) -> Self {
        self.after = Some(t);
        self
    }

    /// Inclusive upper bound.
    pub fn before(mut self, t: NaiveDateTime) -> Self {
        self.before = Some(t);
        self
    }

    pub fn within(self, window: &DateWindow) -> Self {
        self.after(window.start()).before(window.end())
    }

    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn order_by(mut self, field: AppointmentOrder) -> Self {
        self.order_by = field;
        self
    }

    pub fn descending(mut self) -> Self {
        self.order_desc = true;
        self
    }

    /// Build and execute the query, returning appointment rows.
    pub async fn appointments(self, db: &Database) -> Result<Vec<AppointmentRow>> {
        let builder = self;
        db.reader()
            .call(move |conn| {
                let (sql, params) = builder.build_sql();
                let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                    params.iter().map(|p| p.as_ref()).collect();
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(param_refs.as_slice(), |row| {
                    let price_charged: f64 = row.get(9)?;
                    let tip_amount: f64 = row.get(10)?;
                    Ok(AppointmentRow {
                        id: row.get(0)?,
                        date_time: row.get(1)?,
                        customer_id: row.get(2)?,
                        customer_name: row.get(3)?,
                        customer_phone: row.get(4)?,
                        technician_id: row.get(5)?,
                        technician_name: row.get(6)?,
                        service_id: row.get(7)?,
                        service_name: row.get(8)?,
                        price_charged,
                        tip_amount,
                        total_paid: price_charged + tip_amount,
                        payment_method: row.get(11)?,
                    })
                })?;
                let result: std::result::Result<Vec<AppointmentRow>, _> = rows.collect();
                result
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Build and execute the query, returning a count of matching appointments.
    pub async fn count(self, db: &Database) -> Result<u64> {
        let builder = self;
        db.reader()
            .call(move |conn| {
                let (inner_sql, params) = builder.build_sql();
                let sql = format!("SELECT COUNT(*) FROM ({inner_sql})");
                let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                    params.iter().map(|p| p.as_ref()).collect();
                let count: i64 = conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?;
                Ok::<u64, rusqlite::Error>(count as u64)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Build and execute the query, returning results as JSON.
    pub async fn to_json(self, db: &Database) -> Result<String> {
        let rows = self.appointments(db).await?;
        serde_json::to_string_pretty(&rows).map_err(|e| Error::Other(e.to_string()))
    }

    /// Build and execute the query, returning results as CSV.
    pub async fn to_csv(self, db: &Database) -> Result<String> {
        let rows = self.appointments(db).await?;
        Ok(rows_to_csv(&rows))
    }

    fn build_sql(&self) -> (String, Vec<Box<dyn rusqlite::types::ToSql>>) {
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        let mut wheres = Vec::new();
        let mut param_idx = 1;

        let mut sql = format!(
            "SELECT a.id, a.date_time, a.customer_id,
                COALESCE(c.first_name, '{UNKNOWN_LABEL}') AS customer_name, c.phone,
                a.technician_id, COALESCE(t.name, '{UNKNOWN_LABEL}') AS technician_name,
                a.service_id, COALESCE(s.name, '{UNKNOWN_LABEL}') AS service_name,
                a.price_charged, a.tip_amount, a.payment_method
            FROM appointments a
            LEFT JOIN customers c ON c.id = a.customer_id
            LEFT JOIN technicians t ON t.id = a.technician_id
            LEFT JOIN services s ON s.id = a.service_id"
        );

        if let Some(id) = self.technician_id {
            wheres.push(format!("a.technician_id = ?{param_idx}"));
            params.push(Box::new(id));
            param_idx += 1;
        }
        if let Some(id) = self.customer_id {
            wheres.push(format!("a.customer_id = ?{param_idx}"));
            params.push(Box::new(id));
            param_idx += 1;
        }
        if let Some(ref phone) = self.customer_phone {
            wheres.push(format!("c.phone = ?{param_idx}"));
            params.push(Box::new(phone.clone()));
            param_idx += 1;
        }
        if let Some(id) = self.service_id {
            wheres.push(format!("a.service_id = ?{param_idx}"));
            params.push(Box::new(id));
            param_idx += 1;
        }
        if let Some(ref method) = self.payment_method {
            wheres.push(format!("a.payment_method = ?{param_idx} COLLATE NOCASE"));
            params.push(Box::new(method.clone()));
            param_idx += 1;
        }

        // Date range, inclusive
        if let Some(after) = self.after {
            wheres.push(format!("a.date_time >= ?{param_idx}"));
            params.push(Box::new(after));
            param_idx += 1;
        }
        if let Some(before) = self.before {
            wheres.push(format!("a.date_time <= ?{param_idx}"));
            params.push(Box::new(before));
            param_idx += 1;
        }

        if !wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&wheres.join(" AND "));
        }

        let order_dir = if self.order_desc { "DESC" } else { "ASC" };
        sql.push_str(&format!(
            " ORDER BY {} {order_dir}, a.id {order_dir}",
            self.order_by.column()
        ));

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT ?{param_idx}"));
            params.push(Box::new(limit));
        }

        (sql, params)
    }
}

/// Render appointment rows as CSV with a header line.
pub fn rows_to_csv(rows: &[AppointmentRow]) -> String {
    let mut out = String::new();
    out.push_str("id,date_time,customer_id,customer_name,customer_phone,technician_id,technician_name,service_id,service_name,price_charged,tip_amount,total_paid,payment_method\n");
    for row in rows {
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{:.2},{:.2},{:.2},{}\n",
            row.id,
            row.date_time.format("%Y-%m-%d %H:%M:%S"),
            row.customer_id,
            csv_escape(&row.customer_name),
            csv_escape(row.customer_phone.as_deref().unwrap_or("")),
            row.technician_id,
            csv_escape(&row.technician_name),
            row.service_id,
            csv_escape(&row.service_name),
            row.price_charged,
            row.tip_amount,
            row.total_paid,
            csv_escape(row.payment_method.as_deref().unwrap_or("")),
        ));
    }
    out
}

fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
