mod common;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Days, NaiveDate};

use appointment_cell::models::{AppointmentStatus, SchedulingRules};
use appointment_cell::services::{AlternativeSlotFinder, SlotService};
use doctor_cell::AvailabilityStatus;

use common::{
    appointment, at, date, working_day, InMemoryAppointmentStore, InMemoryAvailabilityStore, ENTITY,
};

fn finder(
    availability: Arc<InMemoryAvailabilityStore>,
    appointments: Arc<InMemoryAppointmentStore>,
) -> AlternativeSlotFinder {
    AlternativeSlotFinder::new(SlotService::new(availability, appointments, SchedulingRules::default()))
}

fn open_days(doctor_id: i64, first: NaiveDate, count: u64) -> InMemoryAvailabilityStore {
    let store = InMemoryAvailabilityStore::new();
    for offset in 0..count {
        let day = first.checked_add_days(Days::new(offset)).unwrap();
        store.add(working_day(doctor_id, day, AvailabilityStatus::Available, true));
    }
    store
}

#[tokio::test]
async fn takes_first_three_free_slots_per_day_and_caps_at_ten() {
    let availability = Arc::new(open_days(1, date(2024, 1, 15), 7));
    let finder = finder(availability.clone(), Arc::new(InMemoryAppointmentStore::new()));

    let alternatives = finder
        .find_alternatives(1, ENTITY, at(2024, 1, 15, 10, 0), 30)
        .await
        .unwrap();

    assert_eq!(alternatives.len(), 10);

    let mut per_day: HashMap<NaiveDate, usize> = HashMap::new();
    for slot in &alternatives {
        *per_day.entry(slot.date_time.date_naive()).or_default() += 1;
        assert!(slot.is_available);
    }
    assert!(per_day.values().all(|count| *count <= 3));

    assert_eq!(alternatives[0].date_time, at(2024, 1, 15, 9, 0));
    assert_eq!(alternatives[1].date_time, at(2024, 1, 15, 9, 30));
    assert_eq!(alternatives[2].date_time, at(2024, 1, 15, 10, 0));
    assert_eq!(alternatives[3].date_time, at(2024, 1, 16, 9, 0));

    // Four days already yield twelve candidates.
    assert_eq!(availability.calls(), 4);
}

#[tokio::test]
async fn unavailable_days_contribute_nothing() {
    let availability = InMemoryAvailabilityStore::new()
        .with(working_day(2, date(2024, 2, 1), AvailabilityStatus::Vacation, false))
        .with(working_day(2, date(2024, 2, 3), AvailabilityStatus::Available, false));
    let finder = finder(Arc::new(availability), Arc::new(InMemoryAppointmentStore::new()));

    let alternatives = finder
        .find_alternatives(2, ENTITY, at(2024, 2, 1, 9, 0), 30)
        .await
        .unwrap();

    assert_eq!(alternatives.len(), 3);
    assert!(alternatives
        .iter()
        .all(|slot| slot.date_time.date_naive() == date(2024, 2, 3)));
}

#[tokio::test]
async fn booked_slots_are_skipped() {
    let availability = InMemoryAvailabilityStore::new()
        .with(working_day(1, date(2024, 1, 15), AvailabilityStatus::Available, false));
    let appointments = InMemoryAppointmentStore::new()
        .with(appointment(1, 1, at(2024, 1, 15, 9, 0), 60, AppointmentStatus::Scheduled))
        .with(appointment(2, 1, at(2024, 1, 15, 10, 30), 30, AppointmentStatus::Confirmed));
    let finder = finder(Arc::new(availability), Arc::new(appointments));

    let alternatives = finder
        .find_alternatives(1, ENTITY, at(2024, 1, 15, 9, 0), 30)
        .await
        .unwrap();

    let starts: Vec<_> = alternatives.iter().map(|slot| slot.date_time).collect();
    assert_eq!(
        starts,
        vec![at(2024, 1, 15, 10, 0), at(2024, 1, 15, 11, 0), at(2024, 1, 15, 11, 30)]
    );
}

#[tokio::test]
async fn failing_day_is_skipped() {
    let availability = open_days(1, date(2024, 1, 15), 2);
    availability.fail_on(date(2024, 1, 15));
    let finder = finder(Arc::new(availability), Arc::new(InMemoryAppointmentStore::new()));

    let alternatives = finder
        .find_alternatives(1, ENTITY, at(2024, 1, 15, 9, 0), 30)
        .await
        .unwrap();

    assert_eq!(alternatives.len(), 3);
    assert!(alternatives
        .iter()
        .all(|slot| slot.date_time.date_naive() == date(2024, 1, 16)));
}

#[tokio::test]
async fn search_stops_after_seven_days() {
    let availability = InMemoryAvailabilityStore::new()
        .with(working_day(1, date(2024, 1, 22), AvailabilityStatus::Available, false));
    let availability = Arc::new(availability);
    let finder = finder(availability.clone(), Arc::new(InMemoryAppointmentStore::new()));

    let alternatives = finder
        .find_alternatives(1, ENTITY, at(2024, 1, 15, 9, 0), 30)
        .await
        .unwrap();

    assert!(alternatives.is_empty());
    assert_eq!(availability.calls(), 7);
}
