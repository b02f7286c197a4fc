pub mod patient;
pub mod payment;
pub mod rider;
