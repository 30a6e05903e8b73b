// Parole Tracker - REST API with Axum
//
// Thin JSON layer over BehaviorTrackingService. This is the boundary that
// reads the wall clock when a caller does not supply `now`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::error::TrackingError;
use crate::gate::GateState;
use crate::scoring::{self, RuleId};
use crate::service::BehaviorTrackingService;
use crate::store::{BehaviorStore, InmateDirectory};

/// Shared application state
pub struct AppState<S> {
    pub service: Arc<BehaviorTrackingService<S>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        AppState {
            service: Arc::clone(&self.service),
        }
    }
}

/// API Response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ApiError>,
}

#[derive(Serialize)]
struct ApiError {
    kind: &'static str,
    message: String,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

fn error_kind(err: &TrackingError) -> (StatusCode, &'static str) {
    match err {
        TrackingError::GateClosed { reason, .. } => (StatusCode::CONFLICT, reason.as_str()),
        TrackingError::InmateNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        TrackingError::MissingStartDate(_) => (StatusCode::UNPROCESSABLE_ENTITY, "incomplete_record"),
        TrackingError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable"),
        e if e.is_validation() => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    }
}

fn error_response(err: TrackingError) -> Response {
    let (status, kind) = error_kind(&err);
    if status.is_server_error() {
        error!(error = %err, "request failed");
    }

    let body = ApiResponse::<()> {
        success: false,
        data: None,
        error: Some(ApiError {
            kind,
            message: err.to_string(),
        }),
    };
    (status, Json(body)).into_response()
}

fn respond<T: Serialize>(result: Result<T, TrackingError>) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::ok(data))).into_response(),
        Err(err) => error_response(err),
    }
}

/// Run a service call on the blocking pool
///
/// SQLite calls can sit in busy_timeout while another writer holds the lock.
async fn run_blocking<S, T, F>(state: AppState<S>, call: F) -> Response
where
    S: InmateDirectory + BehaviorStore + 'static,
    T: Serialize + Send + 'static,
    F: FnOnce(&BehaviorTrackingService<S>) -> Result<T, TrackingError> + Send + 'static,
{
    let service = state.service;
    match tokio::task::spawn_blocking(move || call(&service)).await {
        Ok(result) => respond(result),
        Err(err) => {
            error!(error = %err, "service task failed");
            let body = ApiResponse::<()> {
                success: false,
                data: None,
                error: Some(ApiError {
                    kind: "internal",
                    message: "service task failed".to_string(),
                }),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Deserialize)]
pub struct TimelineQuery {
    start_date: Option<NaiveDate>,
    sentence_length: f64,
}

#[derive(Deserialize)]
pub struct GateQuery {
    now: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct SubmissionRequest {
    /// rule id -> points
    selections: BTreeMap<RuleId, i64>,
    committee_name: String,
    signature_ref: String,
    #[serde(default)]
    now: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct GateResponse {
    open: bool,
    detail: String,
    #[serde(flatten)]
    state: GateState,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/rules - Behavior rule catalog
async fn list_rules() -> impl IntoResponse {
    Json(ApiResponse::ok(scoring::catalog().to_vec()))
}

/// GET /api/timeline - Compute a timeline without an inmate record
async fn compute_timeline<S>(
    State(state): State<AppState<S>>,
    Query(query): Query<TimelineQuery>,
) -> Response
where
    S: InmateDirectory + BehaviorStore + 'static,
{
    respond(
        state
            .service
            .compute_timeline(query.start_date, query.sentence_length),
    )
}

/// GET /api/inmates/:id/timeline
async fn inmate_timeline<S>(
    State(state): State<AppState<S>>,
    Path(inmate_id): Path<String>,
) -> Response
where
    S: InmateDirectory + BehaviorStore + 'static,
{
    run_blocking(state, move |service| service.inmate_timeline(&inmate_id)).await
}

/// GET /api/inmates/:id/gate - Whether the monthly form should be enabled
async fn evaluate_gate<S>(
    State(state): State<AppState<S>>,
    Path(inmate_id): Path<String>,
    Query(query): Query<GateQuery>,
) -> Response
where
    S: InmateDirectory + BehaviorStore + 'static,
{
    let now = query.now.unwrap_or_else(Utc::now);
    run_blocking(state, move |service| {
        service
            .evaluate_gate(&inmate_id, now)
            .map(|gate| GateResponse {
                open: gate.is_open(),
                detail: gate.detail(),
                state: gate,
            })
    })
    .await
}

/// POST /api/inmates/:id/submissions - Record a monthly behavior batch
async fn submit_batch<S>(
    State(state): State<AppState<S>>,
    Path(inmate_id): Path<String>,
    Json(request): Json<SubmissionRequest>,
) -> Response
where
    S: InmateDirectory + BehaviorStore + 'static,
{
    let now = request.now.unwrap_or_else(Utc::now);
    run_blocking(state, move |service| {
        service.submit(
            &inmate_id,
            &request.selections,
            &request.committee_name,
            &request.signature_ref,
            now,
        )
    })
    .await
}

/// GET /api/inmates/:id/record - Behavior history
async fn parole_record<S>(
    State(state): State<AppState<S>>,
    Path(inmate_id): Path<String>,
) -> Response
where
    S: InmateDirectory + BehaviorStore + 'static,
{
    run_blocking(state, move |service| service.parole_record(&inmate_id)).await
}

/// Build the /api router
pub fn router<S>(service: Arc<BehaviorTrackingService<S>>) -> Router
where
    S: InmateDirectory + BehaviorStore + 'static,
{
    let state = AppState { service };

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/rules", get(list_rules))
        .route("/timeline", get(compute_timeline::<S>))
        .route("/inmates/:id/timeline", get(inmate_timeline::<S>))
        .route("/inmates/:id/gate", get(evaluate_gate::<S>))
        .route("/inmates/:id/submissions", post(submit_batch::<S>))
        .route("/inmates/:id/record", get(parole_record::<S>))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::InmateRecord;
    use crate::db::SqliteStore;
    use crate::error::GateReason;
    use crate::store::MemoryStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        let store = MemoryStore::new();
        store
            .upsert_inmate(InmateRecord::new(
                "inm-1",
                NaiveDate::from_ymd_opt(2023, 1, 10),
                3.0,
            ))
            .unwrap();
        router(Arc::new(BehaviorTrackingService::new(store)))
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn submission(now: &str, points: i64) -> Request<Body> {
        let body = serde_json::json!({
            "selections": { "1": points, "2": 4 },
            "committee_name": "Board A",
            "signature_ref": "sig-1",
            "now": now,
        });
        Request::builder()
            .method("POST")
            .uri("/api/inmates/inm-1/submissions")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_timeline_endpoint() {
        let (status, body) = call(
            app(),
            get_req("/api/timeline?start_date=2023-01-10&sentence_length=3"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["parole_date"], "2025-01-10");
        assert_eq!(body["data"]["release_date"], "2026-01-10");
        assert_eq!(body["data"]["duration_to_parole"], "2 years");
    }

    #[tokio::test]
    async fn test_rules_endpoint() {
        let (status, body) = call(app(), get_req("/api/rules")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 21);
    }

    #[tokio::test]
    async fn test_gate_endpoint_too_early() {
        let (status, body) = call(
            app(),
            get_req("/api/inmates/inm-1/gate?now=2023-01-20T10:00:00Z"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["open"], false);
        assert_eq!(body["data"]["state"], "too_early");
        assert_eq!(body["data"]["earliest_date"], "2023-02-10");
    }

    #[tokio::test]
    async fn test_submission_flow() {
        let app = app();

        let (status, body) = call(app.clone(), submission("2023-02-15T10:00:00Z", 5)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["score"], 9);
        assert_eq!(body["data"]["tracked_months"], 1);

        let (status, body) = call(app.clone(), submission("2023-02-28T10:00:00Z", 5)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["kind"], "already_submitted");

        let (status, body) = call(app, get_req("/api/inmates/inm-1/record")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["batches"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_validation_and_not_found() {
        let (status, body) = call(app(), submission("2023-02-15T10:00:00Z", 9)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["kind"], "validation");

        let (status, _) = call(app(), get_req("/api/inmates/ghost/timeline")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_concurrent_sqlite_submissions_accept_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parole.db");
        let store = SqliteStore::open(&path).unwrap();
        store
            .upsert_inmate(&InmateRecord::new(
                "inm-1",
                NaiveDate::from_ymd_opt(2023, 1, 10),
                3.0,
            ))
            .unwrap();
        let app = router(Arc::new(BehaviorTrackingService::new(store)));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let app = app.clone();
                tokio::spawn(async move {
                    call(app, submission("2023-02-15T10:00:00Z", 5)).await
                })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            let (status, body) = handle.await.unwrap();
            if status == StatusCode::OK {
                accepted += 1;
            } else {
                assert_eq!(status, StatusCode::CONFLICT);
                assert_eq!(body["error"]["kind"], GateReason::AlreadySubmitted.as_str());
            }
        }
        assert_eq!(accepted, 1);

        let (status, body) = call(
            app,
            get_req("/api/inmates/inm-1/gate?now=2023-02-20T10:00:00Z"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["open"], false);
    }
}
