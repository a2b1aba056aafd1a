use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::ledger::{
    Appointment, Customer, Ledger, NewAppointment, NewCustomer, NewService, NewTechnician,
    Service, Technician,
};
use crate::query::period::DateWindow;

const APPOINTMENT_COLUMNS: &str = "id, date_time, customer_id, technician_id, service_id, \
     price_charged, tip_amount, payment_method";

// ── Technicians ────────────────────────────────────────────────────

pub fn insert_technician(conn: &Connection, tech: &NewTechnician) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO technicians (name, commission_rate) VALUES (?1, ?2)",
        params![tech.name.trim(), tech.commission_rate],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_technicians(conn: &Connection) -> Result<Vec<Technician>, rusqlite::Error> {
    let mut stmt =
        conn.prepare("SELECT id, name, commission_rate FROM technicians ORDER BY id")?;
    let rows = stmt.query_map([], technician_from_row)?;
    rows.collect()
}

pub fn get_technician(
    conn: &Connection,
    technician_id: i64,
) -> Result<Option<Technician>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, name, commission_rate FROM technicians WHERE id = ?1",
        params![technician_id],
        technician_from_row,
    )
    .optional()
}

// ── Services ───────────────────────────────────────────────────────

pub fn insert_service(conn: &Connection, service: &NewService) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO services (name, base_price, category) VALUES (?1, ?2, ?3)",
        params![service.name.trim(), service.base_price, service.category],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_services(conn: &Connection) -> Result<Vec<Service>, rusqlite::Error> {
    let mut stmt =
        conn.prepare("SELECT id, name, base_price, category FROM services ORDER BY id")?;
    let rows = stmt.query_map([], service_from_row)?;
    rows.collect()
}

pub fn get_service(conn: &Connection, service_id: i64) -> Result<Option<Service>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, name, base_price, category FROM services WHERE id = ?1",
        params![service_id],
        service_from_row,
    )
    .optional()
}

// ── Customers ──────────────────────────────────────────────────────

pub fn insert_customer(conn: &Connection, customer: &NewCustomer) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO customers (first_name, phone, notes) VALUES (?1, ?2, ?3)",
        params![customer.first_name.trim(), customer.phone.trim(), customer.notes],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find_customer_by_phone(
    conn: &Connection,
    phone: &str,
) -> Result<Option<Customer>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, first_name, phone, notes FROM customers WHERE phone = ?1",
        params![phone.trim()],
        customer_from_row,
    )
    .optional()
}

/// Return the id of the customer with this phone, creating them first if
/// needed. An existing customer keeps their stored name.
pub fn find_or_create_customer(
    conn: &Connection,
    customer: &NewCustomer,
) -> Result<i64, rusqlite::Error> {
    match find_customer_by_phone(conn, &customer.phone)? {
        Some(existing) => Ok(existing.id),
        None => insert_customer(conn, customer),
    }
}

pub fn list_customers(conn: &Connection) -> Result<Vec<Customer>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT id, first_name, phone, notes FROM customers ORDER BY id")?;
    let rows = stmt.query_map([], customer_from_row)?;
    rows.collect()
}

// ── Appointments ───────────────────────────────────────────────────

pub fn insert_appointment(
    conn: &Connection,
    appt: &NewAppointment,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO appointments
         (date_time, customer_id, technician_id, service_id, price_charged, tip_amount, payment_method)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            appt.date_time,
            appt.customer_id,
            appt.technician_id,
            appt.service_id,
            appt.price_charged,
            appt.tip_amount,
            appt.payment_method,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Every appointment, oldest first.
pub fn list_appointments(conn: &Connection) -> Result<Vec<Appointment>, rusqlite::Error> {
    let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments ORDER BY date_time, id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], appointment_from_row)?;
    rows.collect()
}

/// One customer's visits, oldest first. Reports work from [`load_ledger`];
/// this is the per-customer read for callers that need a single history.
pub fn list_appointments_for_customer(
    conn: &Connection,
    customer_id: i64,
) -> Result<Vec<Appointment>, rusqlite::Error> {
    let sql = format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         WHERE customer_id = ?1 ORDER BY date_time, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![customer_id], appointment_from_row)?;
    rows.collect()
}

/// A technician's appointments, oldest first, optionally limited to an
/// inclusive window.
pub fn list_appointments_for_technician(
    conn: &Connection,
    technician_id: i64,
    window: Option<&DateWindow>,
) -> Result<Vec<Appointment>, rusqlite::Error> {
    let (start, end): (Option<NaiveDateTime>, Option<NaiveDateTime>) = match window {
        Some(w) => (Some(w.start()), Some(w.end())),
        None => (None, None),
    };
    let sql = format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         WHERE technician_id = ?1
           AND (?2 IS NULL OR date_time >= ?2)
           AND (?3 IS NULL OR date_time <= ?3)
         ORDER BY date_time, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![technician_id, start, end], appointment_from_row)?;
    rows.collect()
}

// ── Snapshot ───────────────────────────────────────────────────────

/// Read the whole ledger in four queries.
pub fn load_ledger(conn: &Connection) -> Result<Ledger, rusqlite::Error> {
    Ok(Ledger::new(
        list_customers(conn)?,
        list_technicians(conn)?,
        list_services(conn)?,
        list_appointments(conn)?,
    ))
}

/// Row counts and date span of the ledger.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LedgerStatus {
    pub customers: i64,
    pub technicians: i64,
    pub services: i64,
    pub appointments: i64,
    pub first_appointment: Option<NaiveDateTime>,
    pub last_appointment: Option<NaiveDateTime>,
}

pub fn ledger_status(conn: &Connection) -> Result<LedgerStatus, rusqlite::Error> {
    let count = |table: &str| -> Result<i64, rusqlite::Error> {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
    };
    let (first_appointment, last_appointment) = conn.query_row(
        "SELECT MIN(date_time), MAX(date_time) FROM appointments",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(LedgerStatus {
        customers: count("customers")?,
        technicians: count("technicians")?,
        services: count("services")?,
        appointments: count("appointments")?,
        first_appointment,
        last_appointment,
    })
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Row mapping ────────────────────────────────────────────────────

fn technician_from_row(row: &Row<'_>) -> Result<Technician, rusqlite::Error> {
    Ok(Technician {
        id: row.get(0)?,
        name: row.get(1)?,
        commission_rate: row.get(2)?,
    })
}

fn service_from_row(row: &Row<'_>) -> Result<Service, rusqlite::Error> {
    Ok(Service {
        id: row.get(0)?,
        name: row.get(1)?,
        base_price: row.get(2)?,
        category: row.get(3)?,
    })
}

fn customer_from_row(row: &Row<'_>) -> Result<Customer, rusqlite::Error> {
    Ok(Customer {
        id: row.get(0)?,
        first_name: row.get(1)?,
        phone: row.get(2)?,
        notes: row.get(3)?,
    })
}

fn appointment_from_row(row: &Row<'_>) -> Result<Appointment, rusqlite::Error> {
    Ok(Appointment {
        id: row.get(0)?,
        date_time: row.get(1)?,
        customer_id: row.get(2)?,
        technician_id: row.get(3)?,
        service_id: row.get(4)?,
        price_charged: row.get(5)?,
        tip_amount: row.get(6)?,
        payment_method: row.get(7)?,
    })
}

#[cfg(test)]
pub(crate) mod seed {
    use super::*;
    use chrono::NaiveDate;

    pub fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    /// Two technicians, two services, two customers, four appointments in
    /// June 2025.
    pub fn seed(conn: &Connection) -> Result<(), rusqlite::Error> {
        for (name, rate) in [("Alice", 0.6), ("Bob", 0.5)] {
            insert_technician(
                conn,
                &NewTechnician {
                    name: name.to_string(),
                    commission_rate: rate,
                },
            )?;
        }
        for (name, price) in [("Gel Nails", 55.0), ("Manicure", 30.0)] {
            insert_service(
                conn,
                &NewService {
                    name: name.to_string(),
                    base_price: price,
                    category: Some("Nails".to_string()),
                },
            )?;
        }
        for (name, phone) in [("Dana", "555-0001"), ("Eve", "555-0002")] {
            insert_customer(
                conn,
                &NewCustomer {
                    first_name: name.to_string(),
                    phone: phone.to_string(),
                    notes: None,
                },
            )?;
        }
        let rows = [
            (at(20, 10), 1, 1, 1, 55.0, 10.0),
            (at(5, 14), 1, 2, 2, 30.0, 5.0),
            (at(12, 9), 2, 1, 2, 30.0, 4.0),
            (at(25, 16), 2, 1, 1, 55.0, 8.0),
        ];
        for (date_time, customer_id, technician_id, service_id, price, tip) in rows {
            insert_appointment(
                conn,
                &NewAppointment {
                    date_time,
                    customer_id,
                    technician_id,
                    service_id,
                    price_charged: price,
                    tip_amount: tip,
                    payment_method: Some("Card".to_string()),
                },
            )?;
        }
        Ok(())
    }
}
