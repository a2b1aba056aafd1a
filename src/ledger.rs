//! Appointment ledger entities and the read-only snapshot the analytics
//! engine runs against.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::query::period::DateWindow;

/// Label used wherever an appointment points at a service or technician
/// that no longer resolves.
pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub first_name: String,
    pub phone: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technician {
    pub id: i64,
    pub name: String,
    /// Fraction of service revenue paid out, in `[0, 1]`.
    pub commission_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub base_price: f64,
    pub category: Option<String>,
}

/// One row of the ledger. Never mutated once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: i64,
    pub date_time: NaiveDateTime,
    pub customer_id: i64,
    pub technician_id: i64,
    pub service_id: i64,
    pub price_charged: f64,
    pub tip_amount: f64,
    pub payment_method: Option<String>,
}

impl Appointment {
    /// Price plus tip.
    pub fn total_paid(&self) -> f64 {
        self.price_charged + self.tip_amount
    }
}

/// Input for recording a technician.
#[derive(Debug, Clone)]
pub struct NewTechnician {
    pub name: String,
    pub commission_rate: f64,
}

impl NewTechnician {
    pub fn validate(&self) -> Result<()> {
        require_name(&self.name, "technician name")?;
        if !(0.0..=1.0).contains(&self.commission_rate) {
            return Err(Error::InvalidInput(format!(
                "commission rate must be between 0 and 1, got {}",
                self.commission_rate
            )));
        }
        Ok(())
    }
}

/// Input for recording a menu item.
#[derive(Debug, Clone)]
pub struct NewService {
    pub name: String,
    pub base_price: f64,
    pub category: Option<String>,
}

impl NewService {
    pub fn validate(&self) -> Result<()> {
        require_name(&self.name, "service name")?;
        require_amount(self.base_price, "base price")
    }
}

/// Input for recording a client.
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub first_name: String,
    pub phone: String,
    pub notes: Option<String>,
}

impl NewCustomer {
    pub fn validate(&self) -> Result<()> {
        require_name(&self.first_name, "customer name")?;
        require_name(&self.phone, "customer phone")
    }
}

/// Input for booking an appointment against an existing customer.
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub date_time: NaiveDateTime,
    pub customer_id: i64,
    pub technician_id: i64,
    pub service_id: i64,
    pub price_charged: f64,
    pub tip_amount: f64,
    pub payment_method: Option<String>,
}

impl NewAppointment {
    pub fn validate(&self) -> Result<()> {
        require_amount(self.price_charged, "price charged")?;
        require_amount(self.tip_amount, "tip amount")
    }
}

/// A walk-in booking: the customer is identified by phone and created on
/// first visit.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub technician_id: i64,
    pub service_id: i64,
    pub customer_name: String,
    pub customer_phone: String,
    pub price_charged: f64,
    pub tip_amount: f64,
    pub payment_method: Option<String>,
    /// Defaults to the time of recording.
    pub date_time: Option<NaiveDateTime>,
}

impl NewBooking {
    /// Bookings are recorded after the fact, so `date_time` may not be later
    /// than `now`.
    pub fn validate(&self, now: NaiveDateTime) -> Result<()> {
        self.customer().validate()?;
        require_amount(self.price_charged, "price charged")?;
        require_amount(self.tip_amount, "tip amount")?;
        match self.date_time {
            Some(t) if t > now => Err(Error::InvalidInput(format!(
                "appointment time {t} is in the future"
            ))),
            _ => Ok(()),
        }
    }

    pub fn customer(&self) -> NewCustomer {
        NewCustomer {
            first_name: self.customer_name.trim().to_string(),
            phone: self.customer_phone.trim().to_string(),
            notes: None,
        }
    }

    pub fn appointment(&self, customer_id: i64, now: NaiveDateTime) -> NewAppointment {
        NewAppointment {
            date_time: self.date_time.unwrap_or(now),
            customer_id,
            technician_id: self.technician_id,
            service_id: self.service_id,
            price_charged: self.price_charged,
            tip_amount: self.tip_amount,
            payment_method: self.payment_method.clone(),
        }
    }
}

fn require_name(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{what} must not be empty")));
    }
    Ok(())
}

fn require_amount(value: f64, what: &str) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::InvalidInput(format!(
            "{what} must be a non-negative amount, got {value}"
        )));
    }
    Ok(())
}

/// Point-in-time copy of the salon's ledger.
///
/// Appointments are held in ascending `(date_time, id)` order regardless of
/// the order they were supplied in, so every per-entity view below is
/// chronological.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    customers: Vec<Customer>,
    technicians: Vec<Technician>,
    services: Vec<Service>,
    appointments: Vec<Appointment>,
    technician_index: HashMap<i64, usize>,
    service_index: HashMap<i64, usize>,
}

impl Ledger {
    pub fn new(
        customers: Vec<Customer>,
        technicians: Vec<Technician>,
        services: Vec<Service>,
        mut appointments: Vec<Appointment>,
    ) -> Self {
        appointments.sort_by(|a, b| a.date_time.cmp(&b.date_time).then(a.id.cmp(&b.id)));
        let technician_index = technicians
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id, i))
            .collect::<HashMap<_, _>>();
        let service_index = services
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id, i))
            .collect::<HashMap<_, _>>();

        let dangling = appointments
            .iter()
            .filter(|a| {
                !technician_index.contains_key(&a.technician_id)
                    || !service_index.contains_key(&a.service_id)
            })
            .count();
        if dangling > 0 {
            log::warn!("{dangling} appointments reference a missing technician or service");
        }

        Self {
            customers,
            technicians,
            services,
            appointments,
            technician_index,
            service_index,
        }
    }

    pub fn list_customers(&self) -> &[Customer] {
        &self.customers
    }

    pub fn list_technicians(&self) -> &[Technician] {
        &self.technicians
    }

    pub fn list_services(&self) -> &[Service] {
        &self.services
    }

    /// Every appointment, oldest first.
    pub fn appointments(&self) -> &[Appointment] {
        &self.appointments
    }

    pub fn get_service(&self, service_id: i64) -> Option<&Service> {
        self.service_index
            .get(&service_id)
            .map(|&i| &self.services[i])
    }

    pub fn get_technician(&self, technician_id: i64) -> Option<&Technician> {
        self.technician_index
            .get(&technician_id)
            .map(|&i| &self.technicians[i])
    }

    /// Service name, or [`UNKNOWN_LABEL`] for a dangling reference.
    pub fn service_name(&self, service_id: i64) -> &str {
        self.get_service(service_id)
            .map_or(UNKNOWN_LABEL, |s| s.name.as_str())
    }

    /// Technician name, or [`UNKNOWN_LABEL`] for a dangling reference.
    pub fn technician_name(&self, technician_id: i64) -> &str {
        self.get_technician(technician_id)
            .map_or(UNKNOWN_LABEL, |t| t.name.as_str())
    }

    pub fn list_appointments_for_customer(&self, customer_id: i64) -> Vec<&Appointment> {
        self.appointments
            .iter()
            .filter(|a| a.customer_id == customer_id)
            .collect()
    }

    pub fn list_appointments_for_technician(
        &self,
        technician_id: i64,
        window: Option<&DateWindow>,
    ) -> Vec<&Appointment> {
        self.appointments
            .iter()
            .filter(|a| a.technician_id == technician_id)
            .filter(|a| window.is_none_or(|w| w.contains(a.date_time)))
            .collect()
    }

    pub fn appointments_in<'a>(
        &'a self,
        window: &'a DateWindow,
    ) -> impl Iterator<Item = &'a Appointment> + 'a {
        self.appointments
            .iter()
            .filter(move |a| window.contains(a.date_time))
    }

    /// Appointments grouped by customer in a single pass, each group in
    /// chronological order.
    pub fn appointments_by_customer(&self) -> HashMap<i64, Vec<&Appointment>> {
        let mut grouped: HashMap<i64, Vec<&Appointment>> = HashMap::new();
        for appt in &self.appointments {
            grouped.entry(appt.customer_id).or_default().push(appt);
        }
        grouped
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_appointments_sorted_chronologically() {
        let ledger = staff_ledger();
        let dates: Vec<_> = ledger.appointments().iter().map(|a| a.date_time).collect();
        let mut sorted = dates.clone();
        sorted.sort();
        assert_eq!(dates, sorted);

        let for_customer = ledger.list_appointments_for_customer(1);
        assert_eq!(
            for_customer.iter().map(|a| a.id).collect::<Vec<_>>(),
            vec![2, 6, 1]
        );
    }

    #[test]
    fn test_dangling_references_resolve_to_unknown() {
        let ledger = staff_ledger();
        assert_eq!(ledger.service_name(3), "Gel Nails");
        assert_eq!(ledger.service_name(99), UNKNOWN_LABEL);
        assert_eq!(ledger.technician_name(2), "Bob");
        assert_eq!(ledger.technician_name(42), UNKNOWN_LABEL);
    }

    #[test]
    fn test_technician_appointments_respect_window() {
        let ledger = staff_ledger();
        assert_eq!(ledger.list_appointments_for_technician(1, None).len(), 5);

        let window = DateWindow::trailing_days(now(), 12).unwrap();
        let recent = ledger.list_appointments_for_technician(1, Some(&window));
        assert_eq!(recent.iter().map(|a| a.id).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn test_validation_rejects_bad_amounts() {
        let mut appt = NewAppointment {
            date_time: now(),
            customer_id: 1,
            technician_id: 1,
            service_id: 1,
            price_charged: 35.0,
            tip_amount: 5.0,
            payment_method: None,
        };
        assert!(appt.validate().is_ok());
        appt.tip_amount = -1.0;
        assert!(matches!(appt.validate(), Err(Error::InvalidInput(_))));

        let tech = NewTechnician {
            name: "Lisa".to_string(),
            commission_rate: 1.2,
        };
        assert!(tech.validate().is_err());
    }

    #[test]
    fn test_booking_rejects_future_time() {
        let mut booking = NewBooking {
            technician_id: 1,
            service_id: 1,
            customer_name: " Mia ".to_string(),
            customer_phone: "555-0042".to_string(),
            price_charged: 40.0,
            tip_amount: 0.0,
            payment_method: None,
            date_time: Some(now()),
        };
        assert!(booking.validate(now()).is_ok());
        booking.date_time = None;
        assert!(booking.validate(now()).is_ok());
        booking.date_time = Some(now() + Duration::minutes(1));
        assert!(matches!(booking.validate(now()), Err(Error::InvalidInput(_))));
    }
}
