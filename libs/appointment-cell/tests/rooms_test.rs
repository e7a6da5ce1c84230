mod common;

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{Appointment, AppointmentStatus};
use appointment_cell::services::{
    RoomAvailabilityService, RoomStore, SupabaseRoomStore, TimeRange,
};
use shared_database::SupabaseClient;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

use common::{appointment, at, room, InMemoryAppointmentStore, InMemoryRoomStore, ENTITY};

fn clinic_rooms() -> InMemoryRoomStore {
    InMemoryRoomStore::new(vec![
        room(7, "201", "consultation", 2),
        room(5, "101", "consultation", 1),
        room(6, "102", "procedure", 1),
    ])
}

fn in_room(id: i64, room_id: i64, hour: u32, minute: u32, status: AppointmentStatus) -> Appointment {
    let mut visit = appointment(id, 10 + id, at(2024, 1, 15, hour, minute), 30, status);
    visit.room_id = Some(room_id);
    visit
}

#[tokio::test]
async fn rooms_with_an_overlapping_visit_are_flagged_taken() {
    let appointments = InMemoryAppointmentStore::new()
        .with(in_room(1, 5, 10, 0, AppointmentStatus::Confirmed))
        .with(in_room(2, 6, 10, 0, AppointmentStatus::Cancelled))
        .with(in_room(3, 7, 10, 30, AppointmentStatus::Scheduled));
    let service = RoomAvailabilityService::new(Arc::new(clinic_rooms()), Arc::new(appointments));

    let range = TimeRange::from_duration(at(2024, 1, 15, 10, 0), 30);
    let rooms = service.available_rooms(ENTITY, range, None).await.unwrap();

    let flags: Vec<(i64, bool)> = rooms.iter().map(|r| (r.room.id, r.is_available)).collect();
    assert_eq!(flags, vec![(5, false), (6, true), (7, true)]);
}

#[tokio::test]
async fn room_type_narrows_the_list() {
    let service = RoomAvailabilityService::new(
        Arc::new(clinic_rooms()),
        Arc::new(InMemoryAppointmentStore::new()),
    );

    let range = TimeRange::from_duration(at(2024, 1, 15, 10, 0), 30);
    let rooms = service
        .available_rooms(ENTITY, range, Some("procedure"))
        .await
        .unwrap();

    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].room.room_number, "102");
    assert!(rooms[0].is_available);
}

#[tokio::test]
async fn supabase_room_store_filters_and_orders() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/rooms"))
        .and(query_param("healthcare_entity_id", "eq.1"))
        .and(query_param("is_active", "eq.true"))
        .and(query_param("room_type", "eq.consultation"))
        .and(query_param("order", "floor.asc,room_number.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::room_row(5, "101", "consultation", 1),
            MockSupabaseResponses::room_row(7, "201", "consultation", 2),
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_mock_server(&mock_server.uri()).to_app_config();
    let store = SupabaseRoomStore::new(Arc::new(SupabaseClient::new(&config)), Some("token".to_string()));

    let rooms = store.list_active(1, Some("consultation")).await.unwrap();

    assert_eq!(rooms.len(), 2);
    assert_eq!(rooms[1].room_number, "201");
    assert_eq!(rooms[1].floor, Some(2));
}
