use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use shared_database::SupabaseClient;

use crate::models::{AppointmentError, Room, RoomAvailability};
use crate::services::interval::TimeRange;
use crate::services::store::{AppointmentScope, AppointmentStore};

#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Active rooms of the entity, ordered by floor then room number.
    async fn list_active(
        &self,
        healthcare_entity_id: i64,
        room_type: Option<&str>,
    ) -> Result<Vec<Room>, AppointmentError>;
}

pub struct SupabaseRoomStore {
    supabase: Arc<SupabaseClient>,
    auth_token: Option<String>,
}

impl SupabaseRoomStore {
    pub fn new(supabase: Arc<SupabaseClient>, auth_token: Option<String>) -> Self {
        Self { supabase, auth_token }
    }
}

#[async_trait]
impl RoomStore for SupabaseRoomStore {
    async fn list_active(
        &self,
        healthcare_entity_id: i64,
        room_type: Option<&str>,
    ) -> Result<Vec<Room>, AppointmentError> {
        let mut query_parts = vec![
            format!("healthcare_entity_id=eq.{}", healthcare_entity_id),
            "is_active=eq.true".to_string(),
        ];

        if let Some(room_type) = room_type.filter(|room_type| !room_type.is_empty()) {
            query_parts.push(format!("room_type=eq.{}", urlencoding::encode(room_type)));
        }
        query_parts.push("order=floor.asc,room_number.asc".to_string());

        let path = format!("/rest/v1/rooms?{}", query_parts.join("&"));

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            self.auth_token.as_deref(),
            None,
        ).await?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row)
                    .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse room: {}", e)))
            })
            .collect()
    }
}

/// Flags each active room as free or taken over a requested range.
pub struct RoomAvailabilityService {
    rooms: Arc<dyn RoomStore>,
    appointments: Arc<dyn AppointmentStore>,
}

impl RoomAvailabilityService {
    pub fn new(rooms: Arc<dyn RoomStore>, appointments: Arc<dyn AppointmentStore>) -> Self {
        Self { rooms, appointments }
    }

    pub async fn available_rooms(
        &self,
        healthcare_entity_id: i64,
        range: TimeRange,
        room_type: Option<&str>,
    ) -> Result<Vec<RoomAvailability>, AppointmentError> {
        let (rooms, appointments) = try_join(
            self.rooms.list_active(healthcare_entity_id, room_type),
            self.appointments
                .get_active_in_range(healthcare_entity_id, AppointmentScope::default(), range),
        )
        .await?;

        let occupied: HashSet<i64> = appointments
            .iter()
            .filter(|appointment| appointment.is_blocking())
            .filter(|appointment| appointment.time_range().overlaps(&range))
            .filter_map(|appointment| appointment.room_id)
            .filter(|room_id| *room_id > 0)
            .collect();

        debug!("{} of {} rooms occupied in entity {} over {} - {}",
               occupied.len(), rooms.len(), healthcare_entity_id, range.start, range.end);

        Ok(rooms
            .into_iter()
            .map(|room| RoomAvailability {
                is_available: !occupied.contains(&room.id),
                room,
            })
            .collect())
    }
}
