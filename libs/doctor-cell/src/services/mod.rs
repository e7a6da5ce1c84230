pub mod availability;

pub use availability::{AvailabilityStore, SupabaseAvailabilityStore};
