use std::sync::Arc;
use base64::{Engine as _, engine::general_purpose};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub user_service_url: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            user_service_url: "http://localhost:8081".to_string(),
        }
    }
}

impl TestConfig {
    /// Points both upstreams at a single mock server.
    pub fn with_mock_server(uri: &str) -> Self {
        Self {
            supabase_url: uri.to_string(),
            user_service_url: uri.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            user_service_url: self.user_service_url.clone(),
            timezone_cache_ttl_secs: 3600,
            port: 0,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
    pub healthcare_entity_id: Option<i64>,
}

impl TestUser {
    pub fn new(id: &str, role: &str, healthcare_entity_id: Option<i64>) -> Self {
        Self {
            id: id.to_string(),
            email: format!("{}-{}@example.com", role, id),
            role: role.to_string(),
            healthcare_entity_id,
        }
    }

    pub fn staff(id: &str, healthcare_entity_id: i64) -> Self {
        Self::new(id, "staff", Some(healthcare_entity_id))
    }

    pub fn doctor(id: &str, healthcare_entity_id: i64) -> Self {
        Self::new(id, "doctor", Some(healthcare_entity_id))
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            healthcare_entity_id: self.healthcare_entity_id,
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let app_metadata = match user.healthcare_entity_id {
            Some(entity_id) => json!({ "healthcare_entity_id": entity_id }),
            None => json!({}),
        };

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "app_metadata": app_metadata,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }
}

/// PostgREST row shapes used by the scheduling tests.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn appointment_row(
        id: i64,
        doctor_id: i64,
        date_time: &str,
        duration: i32,
        status: &str,
        room_id: Option<i64>,
    ) -> serde_json::Value {
        json!({
            "id": id,
            "healthcare_entity_id": 1,
            "patient_id": 100 + id,
            "doctor_id": doctor_id,
            "date_time": date_time,
            "duration": duration,
            "type": "consultation",
            "status": status,
            "reason": "Check-up",
            "notes": "",
            "priority": "normal",
            "room_id": room_id,
            "is_active": true,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z",
            "created_by": "1"
        })
    }

    pub fn availability_row(
        id: i64,
        doctor_id: i64,
        status: &str,
        start: &str,
        end: &str,
        break_window: Option<(&str, &str)>,
    ) -> serde_json::Value {
        json!({
            "id": id,
            "healthcare_entity_id": 1,
            "doctor_id": doctor_id,
            "status": status,
            "start_datetime": start,
            "end_datetime": end,
            "break_start_datetime": break_window.map(|(s, _)| s),
            "break_end_datetime": break_window.map(|(_, e)| e),
            "notes": "",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z",
            "created_by": "1"
        })
    }

    pub fn room_row(id: i64, room_number: &str, room_type: &str, floor: i32) -> serde_json::Value {
        json!({
            "id": id,
            "healthcare_entity_id": 1,
            "room_number": room_number,
            "room_name": format!("Room {}", room_number),
            "room_type": room_type,
            "floor": floor,
            "department": null,
            "capacity": 1,
            "is_active": true,
            "notes": null
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "message": message,
            "code": code,
            "details": null,
            "hint": null
        })
    }
}
