use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, Request, State,
    },
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use cora_core::client::CoraClient;
use cora_core::error::{ScheduleError, ScheduleResult};
use cora_core::infrastructure::SeedableStore;
use cora_core::infrastructure_in_memory::InMemoryScheduleStore;
use cora_core::types::{BookingRecord, CancelOutcome, RoomId, ScheduleSeed, Slot, SlotId, Subject};

use crate::error::{ApiError, ApiResult};
use crate::handlers::*;

#[derive(Clone)]
pub struct AppState {
    pub client: CoraClient,
    /// Deadline for each store call made on behalf of a request.
    pub store_timeout: Duration,
    /// Bearer token required on every route but `/health`; `None` is dev mode.
    pub api_key: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // Health is always open (no auth)
        .route("/health", get(health))
        .route("/free-rooms", get(free_rooms))
        .route("/free-slots", get(free_slots))
        .route("/timetable", get(timetable))
        .route(
            "/bookings",
            get(list_bookings).post(reserve).delete(cancel_booking),
        )
        .route("/slots", get(list_slots))
        .route("/rooms", get(list_rooms))
        .route("/subjects", get(list_subjects))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run(host: &str, port: u16, state: AppState) -> anyhow::Result<()> {
    if state.api_key.is_some() {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!("No CORA_API_KEY set, server is open (dev mode)");
    }

    let app = router(state);
    let addr = format!("{}:{}", host, port);
    tracing::info!("Cora server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}

// ─── Auth Middleware ────────────────────────────────────────────────────────

async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected_key) = state.api_key.as_deref().filter(|k| !k.is_empty()) else {
        return Ok(next.run(request).await);
    };

    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    if token == expected_key {
        Ok(next.run(request).await)
    } else {
        tracing::warn!("Unauthorized request to {}", request.uri().path());
        Err(StatusCode::UNAUTHORIZED)
    }
}

// ─── Store Access ───────────────────────────────────────────────────────────

fn deadline_message(timeout: Duration) -> String {
    format!("store did not answer within {} ms", timeout.as_millis())
}

/// Run one read on the blocking pool under the request deadline.
///
/// An expired deadline is reported as the store being unavailable. Reads
/// change nothing, so the abandoned call is left to finish on its own.
async fn with_deadline<T, F>(state: &AppState, op: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&CoraClient) -> ScheduleResult<T> + Send + 'static,
{
    let client = state.client.clone();
    let task = tokio::task::spawn_blocking(move || op(&client));

    match tokio::time::timeout(state.store_timeout, task).await {
        Ok(Ok(result)) => result.map_err(ApiError::from),
        Ok(Err(join_err)) => Err(ScheduleError::store(format!("store call aborted: {}", join_err)).into()),
        Err(_) => Err(ScheduleError::StoreUnavailable(deadline_message(state.store_timeout)).into()),
    }
}

/// Run one write on the blocking pool under the request deadline.
///
/// The client stops issuing writes once the deadline passes. A write still
/// in flight at that point is interrupted and then awaited, so the value
/// returned is what the store actually did and nothing lands after the
/// response. The flag is true when the deadline expired.
async fn write_with_deadline<T, F>(state: &AppState, op: F) -> ApiResult<(T, bool)>
where
    T: Send + 'static,
    F: FnOnce(&CoraClient) -> ScheduleResult<T> + Send + 'static,
{
    let client = state.client.until(Instant::now() + state.store_timeout);
    let mut task = tokio::task::spawn_blocking(move || op(&client));

    let waited = tokio::time::timeout(state.store_timeout, &mut task).await;
    let (joined, late) = match waited {
        Ok(joined) => (joined, false),
        Err(_) => {
            tracing::warn!(
                timeout_ms = state.store_timeout.as_millis() as u64,
                "Store write overran its deadline"
            );
            state.client.interrupt();
            (task.await, true)
        }
    };

    let result = joined.map_err(|e| ScheduleError::store(format!("store call aborted: {}", e)))?;
    Ok((result?, late))
}

fn from_query<T>(query: Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    query
        .map(|Query(q)| q)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

// ─── Handlers ───────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<HealthResponse>>> {
    let rooms = with_deadline(&state, |client| client.all_rooms()).await?;
    Ok(Json(ApiResponse::ok(HealthResponse {
        status: "ok".to_string(),
        rooms: rooms.len(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })))
}

async fn free_rooms(
    State(state): State<AppState>,
    query: Result<Query<FreeRoomsQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<BTreeSet<RoomId>>>> {
    let q = from_query(query)?;
    q.validate().map_err(ApiError::BadRequest)?;

    let rooms = with_deadline(&state, move |client| client.free_rooms(q.slot, q.date)).await?;
    Ok(Json(ApiResponse::ok(rooms)))
}

async fn free_slots(
    State(state): State<AppState>,
    query: Result<Query<RoomDayQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<BTreeSet<SlotId>>>> {
    let q = from_query(query)?;
    q.validate().map_err(ApiError::BadRequest)?;

    let slots = with_deadline(&state, move |client| client.free_slots(&q.room, q.date)).await?;
    Ok(Json(ApiResponse::ok(slots)))
}

async fn timetable(
    State(state): State<AppState>,
    query: Result<Query<RoomDayQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<BTreeMap<SlotId, String>>>> {
    let q = from_query(query)?;
    q.validate().map_err(ApiError::BadRequest)?;

    let day = with_deadline(&state, move |client| client.day_timetable(&q.room, q.date)).await?;
    Ok(Json(ApiResponse::ok(day)))
}

async fn reserve(
    State(state): State<AppState>,
    body: Result<Json<BookingRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse<ReservationResponse>>)> {
    let req = body
        .map(|Json(r)| r)
        .map_err(|e| ApiError::BadRequest(e.body_text()))?;
    req.validate().map_err(ApiError::BadRequest)?;

    let (outcome, late) = write_with_deadline(&state, move |client| {
        client.reserve_range_report(
            &req.room,
            req.date,
            req.slot,
            req.last_slot(),
            &req.instructor,
            &req.subject,
        )
    })
    .await?;

    let data = ReservationResponse {
        reserved: outcome.reserved,
        requested: outcome.requested,
    };
    if late || outcome.expired {
        Ok((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::rejected(data, deadline_message(state.store_timeout))),
        ))
    } else if outcome.reserved > 0 {
        Ok((StatusCode::CREATED, Json(ApiResponse::ok(data))))
    } else {
        Ok((
            StatusCode::CONFLICT,
            Json(ApiResponse::rejected(data, "NOT_FREE")),
        ))
    }
}

async fn cancel_booking(
    State(state): State<AppState>,
    query: Result<Query<CancelQuery>, QueryRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse<CancelResponse>>)> {
    let q = from_query(query)?;
    q.validate().map_err(ApiError::BadRequest)?;

    let (outcome, late) = write_with_deadline(&state, move |client| client.cancel(&q.room, q.date, q.slot)).await?;
    let data = CancelResponse {
        canceled: outcome == CancelOutcome::Canceled,
    };
    if late {
        Ok((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::rejected(data, deadline_message(state.store_timeout))),
        ))
    } else {
        Ok((StatusCode::OK, Json(ApiResponse::ok(data))))
    }
}

async fn list_bookings(
    State(state): State<AppState>,
    query: Result<Query<BookingsQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<Vec<BookingRecord>>>> {
    let q = from_query(query)?;
    q.validate().map_err(ApiError::BadRequest)?;

    let bookings = with_deadline(&state, move |client| client.bookings_for(&q.instructor)).await?;
    Ok(Json(ApiResponse::ok(bookings)))
}

async fn list_slots(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<Vec<Slot>>>> {
    let slots = with_deadline(&state, |client| client.all_slots()).await?;
    Ok(Json(ApiResponse::ok(slots)))
}

async fn list_rooms(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<Vec<RoomId>>>> {
    let rooms = with_deadline(&state, |client| client.all_rooms()).await?;
    Ok(Json(ApiResponse::ok(rooms)))
}

async fn list_subjects(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<Vec<Subject>>>> {
    let subjects = with_deadline(&state, |client| client.all_subjects()).await?;
    Ok(Json(ApiResponse::ok(subjects)))
}

// ─── Storage Backend Selection ──────────────────────────────────────────────

pub fn load_seed(path: &Path) -> anyhow::Result<ScheduleSeed> {
    let input = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read seed file {}", path.display()))?;
    ScheduleSeed::from_json(&input)
        .with_context(|| format!("invalid seed file {}", path.display()))
}

pub fn create_client(storage: &str, seed: Option<&Path>, busy_timeout: Duration) -> anyhow::Result<CoraClient> {
    let seed = seed.map(load_seed).transpose()?;

    if storage == "memory" {
        tracing::info!("Storage backend: in-memory (bookings will not persist)");
        let store = InMemoryScheduleStore::new();
        match &seed {
            Some(seed) => store.load_seed(seed)?,
            None => tracing::warn!("No seed given, the timetable is empty"),
        }
        Ok(CoraClient::from_store(Arc::new(store)))
    } else if let Some(path) = storage.strip_prefix("sqlite:") {
        #[cfg(feature = "sqlite")]
        {
            tracing::info!("Storage backend: SQLite ({})", path);
            let store = cora_core::infrastructure_sqlite::SqliteScheduleStore::open(path, busy_timeout)
                .with_context(|| format!("failed to open SQLite database at '{}'", path))?;
            if let Some(seed) = &seed {
                store.load_seed(seed)?;
            }
            Ok(CoraClient::from_store(Arc::new(store)))
        }
        #[cfg(not(feature = "sqlite"))]
        {
            let _ = (path, busy_timeout);
            anyhow::bail!(
                "SQLite storage requested but the `sqlite` feature is not enabled. \
                 Rebuild with: cargo build --features sqlite"
            )
        }
    } else {
        anyhow::bail!(
            "Unknown storage backend: '{}'. Use 'memory' or 'sqlite:<path>'",
            storage
        )
    }
}
