pub mod builder;
pub mod period;

pub use builder::{AppointmentOrder, AppointmentQuery, AppointmentRow};
pub use period::{DateWindow, Period};
