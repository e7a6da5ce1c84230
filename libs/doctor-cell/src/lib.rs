pub mod models;
pub mod services;

pub use models::{AvailabilityError, AvailabilityStatus, DoctorAvailability};
pub use services::{AvailabilityStore, SupabaseAvailabilityStore};
