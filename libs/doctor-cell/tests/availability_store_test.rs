use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::NaiveDate;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use doctor_cell::{AvailabilityError, AvailabilityStatus, AvailabilityStore, SupabaseAvailabilityStore};
use shared_database::SupabaseClient;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

async fn store_for(mock_server: &MockServer) -> SupabaseAvailabilityStore {
    let config = TestConfig::with_mock_server(&mock_server.uri()).to_app_config();
    SupabaseAvailabilityStore::new(Arc::new(SupabaseClient::new(&config)), Some("token".to_string()))
}

#[tokio::test]
async fn fetches_the_record_for_the_requested_utc_day() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .and(query_param("doctor_id", "eq.5"))
        .and(query_param("healthcare_entity_id", "eq.1"))
        .and(query_param("start_datetime", "gte.2024-01-15T00:00:00Z"))
        .and(query_param("start_datetime", "lt.2024-01-16T00:00:00Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::availability_row(
                11,
                5,
                "available",
                "2024-01-15T09:00:00Z",
                "2024-01-15T17:00:00Z",
                Some(("2024-01-15T12:00:00Z", "2024-01-15T13:00:00Z")),
            )
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = store_for(&mock_server).await;
    let record = store
        .get_for_date(5, 1, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
        .await
        .unwrap()
        .expect("availability record");

    assert_eq!(record.id, 11);
    assert!(record.is_available());
    assert!(record.break_window().is_some());
    assert_eq!(record.date(), NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
}

#[tokio::test]
async fn no_row_means_no_declared_availability() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let store = store_for(&mock_server).await;
    let record = store
        .get_for_date(5, 1, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap())
        .await
        .unwrap();

    assert!(record.is_none());
}

#[tokio::test]
async fn vacation_record_is_returned_but_not_available() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::availability_row(
                12,
                2,
                "vacation",
                "2024-02-01T09:00:00Z",
                "2024-02-01T17:00:00Z",
                None,
            )
        ])))
        .mount(&mock_server)
        .await;

    let store = store_for(&mock_server).await;
    let record = store
        .get_for_date(2, 1, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(record.status, AvailabilityStatus::Vacation);
    assert!(!record.is_available());
}

#[tokio::test]
async fn upstream_failure_propagates() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock_server)
        .await;

    let store = store_for(&mock_server).await;
    let result = store
        .get_for_date(2, 1, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap())
        .await;

    assert_matches!(result, Err(AvailabilityError::DatabaseError(_)));
}

#[tokio::test]
async fn range_read_spans_whole_utc_days() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .and(query_param("doctor_id", "eq.5"))
        .and(query_param("start_datetime", "gte.2024-01-01T00:00:00Z"))
        .and(query_param("start_datetime", "lt.2024-02-01T00:00:00Z"))
        .and(query_param("order", "start_datetime.asc"))
        .and(query_param("limit", "31"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::availability_row(
                11, 5, "available", "2024-01-15T09:00:00Z", "2024-01-15T17:00:00Z", None,
            ),
            MockSupabaseResponses::availability_row(
                12, 5, "sick_leave", "2024-01-16T09:00:00Z", "2024-01-16T17:00:00Z", None,
            )
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = store_for(&mock_server).await;
    let records = store
        .get_for_range(
            5,
            1,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[1].status, AvailabilityStatus::SickLeave);
}

#[tokio::test]
async fn inverted_range_skips_the_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let store = store_for(&mock_server).await;
    let records = store
        .get_for_range(
            5,
            1,
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        )
        .await
        .unwrap();

    assert!(records.is_empty());
}
