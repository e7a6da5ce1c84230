pub mod alternatives;
pub mod booking;
pub mod conflict;
pub mod interval;
pub mod rooms;
pub mod slots;
pub mod store;
pub mod timezone;

pub use alternatives::AlternativeSlotFinder;
pub use booking::AppointmentBookingService;
pub use conflict::{blocking_overlaps, ConflictDetectionService, ConflictReport};
pub use interval::TimeRange;
pub use rooms::{RoomAvailabilityService, RoomStore, SupabaseRoomStore};
pub use slots::{generate_slots, DaySchedule, SlotService};
pub use store::{AppointmentScope, AppointmentStore, SupabaseAppointmentStore};
pub use timezone::{
    EntityTimezoneLookup, HttpEntityTimezoneLookup, TimezoneCache, TimezoneConverter, TimezoneError,
};
