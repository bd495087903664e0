use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, error, info, warn};

use fuel_core::bus::{Event, TOTALS_CHANGED};
use fuel_core::error::EngineError;
use fuel_core::models::{
    DATE_FORMAT, DaySummary, DayTargets, DayTotals, DayView, EntrySource, FoodEntry, NewFoodEntry,
    NewTarget, NewWorkoutEntry, TargetOrigin, TargetRecord, UpdateFoodEntry, UpdateWorkoutEntry,
    WorkoutEntry, parse_date_key,
};
use fuel_core::service::{EntryChange, FuelService};

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB

const DEFAULT_HISTORY_DAYS: u32 = 7;

#[derive(Clone)]
struct AppState {
    service: Arc<FuelService>,
    api_key: Option<String>,
}

// --- Request / Response types ---

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
struct CreateFoodRequest {
    date: String,
    meal_type: String,
    name: String,
    calories: Option<f64>,
    protein: Option<f64>,
    carbs: Option<f64>,
    fat: Option<f64>,
    source: Option<String>,
}

#[derive(Deserialize)]
#[allow(clippy::option_option)]
struct UpdateFoodRequest {
    date: Option<String>,
    meal_type: Option<String>,
    name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    calories: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    protein: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    carbs: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    fat: Option<Option<f64>>,
}

#[derive(Deserialize)]
struct CreateWorkoutRequest {
    date: String,
    name: String,
    duration_min: Option<f64>,
    calories_burned: Option<f64>,
    source: Option<String>,
}

#[derive(Deserialize)]
#[allow(clippy::option_option)]
struct UpdateWorkoutRequest {
    date: Option<String>,
    name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    duration_min: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    calories_burned: Option<Option<f64>>,
}

#[derive(Deserialize)]
struct DayTargetsRequest {
    calories: Option<f64>,
    protein: Option<f64>,
    carbs: Option<f64>,
    fat: Option<f64>,
    label: Option<String>,
    rationale: Option<String>,
}

#[derive(Deserialize)]
struct TargetRequest {
    calories: f64,
    protein: Option<f64>,
    carbs: Option<f64>,
    fat: Option<f64>,
    label: Option<String>,
    rationale: Option<String>,
    origin: Option<String>,
}

#[derive(Deserialize, Default)]
struct PinRequest {
    remaining: Option<f64>,
}

#[derive(Deserialize)]
struct HistoryQuery {
    days: Option<u32>,
    today: Option<String>,
}

#[derive(Serialize)]
struct DailyTargetResponse {
    target: TargetRecord,
    totals: DayTotals,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(err) => {
                error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(msg) => Self::BadRequest(msg),
            EngineError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            EngineError::Read(e) => Self::Internal(e.context("storage read failed")),
            EngineError::Write(e) => Self::Internal(e.context("storage write failed")),
        }
    }
}

fn bad_request(err: impl std::fmt::Display) -> ApiError {
    ApiError::BadRequest(format!("{err}"))
}

fn parse_date(raw: &str) -> Result<NaiveDate, ApiError> {
    parse_date_key(raw).map_err(bad_request)
}

fn parse_source(raw: Option<&str>) -> Result<EntrySource, ApiError> {
    raw.map_or(Ok(EntrySource::Manual), |s| s.parse().map_err(bad_request))
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Food handlers ---

async fn create_food(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(req): Json<CreateFoodRequest>,
) -> Result<(StatusCode, Json<EntryChange<FoodEntry>>), ApiError> {
    let entry = NewFoodEntry {
        date: parse_date(&req.date)?,
        meal_type: req.meal_type,
        name: req.name,
        calories: req.calories,
        protein: req.protein,
        carbs: req.carbs,
        fat: req.fat,
        source: parse_source(req.source.as_deref())?,
    };
    let change = state.service.log_food(&user, &entry).await?;
    Ok((StatusCode::CREATED, Json(change)))
}

async fn update_food(
    State(state): State<AppState>,
    Path((user, id)): Path<(String, i64)>,
    Json(req): Json<UpdateFoodRequest>,
) -> Result<Json<EntryChange<FoodEntry>>, ApiError> {
    let update = UpdateFoodEntry {
        date: req.date.as_deref().map(parse_date).transpose()?,
        meal_type: req.meal_type,
        name: req.name,
        calories: req.calories,
        protein: req.protein,
        carbs: req.carbs,
        fat: req.fat,
    };
    Ok(Json(state.service.update_food(&user, id, &update).await?))
}

async fn delete_food(
    State(state): State<AppState>,
    Path((user, id)): Path<(String, i64)>,
) -> Result<Json<EntryChange<FoodEntry>>, ApiError> {
    Ok(Json(state.service.delete_food(&user, id).await?))
}

// --- Workout handlers ---

async fn create_workout(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(req): Json<CreateWorkoutRequest>,
) -> Result<(StatusCode, Json<EntryChange<WorkoutEntry>>), ApiError> {
    let entry = NewWorkoutEntry {
        date: parse_date(&req.date)?,
        name: req.name,
        duration_min: req.duration_min,
        calories_burned: req.calories_burned,
        source: parse_source(req.source.as_deref())?,
    };
    let change = state.service.log_workout(&user, &entry).await?;
    Ok((StatusCode::CREATED, Json(change)))
}

async fn update_workout(
    State(state): State<AppState>,
    Path((user, id)): Path<(String, i64)>,
    Json(req): Json<UpdateWorkoutRequest>,
) -> Result<Json<EntryChange<WorkoutEntry>>, ApiError> {
    let update = UpdateWorkoutEntry {
        date: req.date.as_deref().map(parse_date).transpose()?,
        name: req.name,
        duration_min: req.duration_min,
        calories_burned: req.calories_burned,
    };
    Ok(Json(state.service.update_workout(&user, id, &update).await?))
}

async fn delete_workout(
    State(state): State<AppState>,
    Path((user, id)): Path<(String, i64)>,
) -> Result<Json<EntryChange<WorkoutEntry>>, ApiError> {
    Ok(Json(state.service.delete_workout(&user, id).await?))
}

// --- Day handlers ---

async fn get_day(
    State(state): State<AppState>,
    Path((user, date)): Path<(String, String)>,
) -> Result<Json<DayView>, ApiError> {
    Ok(Json(state.service.get_day(&user, &date).await?))
}

async fn recalc_day(
    State(state): State<AppState>,
    Path((user, date)): Path<(String, String)>,
) -> Result<Json<DayTotals>, ApiError> {
    Ok(Json(state.service.recalc_day(&user, &date).await?))
}

async fn save_day_targets(
    State(state): State<AppState>,
    Path((user, date)): Path<(String, String)>,
    Json(req): Json<DayTargetsRequest>,
) -> Result<Json<DayTotals>, ApiError> {
    let targets = DayTargets {
        calories: req.calories,
        protein: req.protein,
        carbs: req.carbs,
        fat: req.fat,
        label: req.label,
        rationale: req.rationale,
    };
    Ok(Json(
        state
            .service
            .save_day_targets(&user, &date, &targets)
            .await?,
    ))
}

/// Body is optional: no body pins the current remaining.
async fn pin_day(
    State(state): State<AppState>,
    Path((user, date)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<DayTotals>, ApiError> {
    let req: PinRequest = if body.iter().all(u8::is_ascii_whitespace) {
        PinRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(bad_request)?
    };
    Ok(Json(
        state
            .service
            .pin_remaining(&user, &date, req.remaining)
            .await?,
    ))
}

async fn unpin_day(
    State(state): State<AppState>,
    Path((user, date)): Path<(String, String)>,
) -> Result<Json<DayTotals>, ApiError> {
    Ok(Json(state.service.unpin_remaining(&user, &date).await?))
}

// --- Target handlers ---

fn new_target(req: TargetRequest) -> Result<NewTarget, ApiError> {
    let origin = req
        .origin
        .as_deref()
        .map_or(Ok(TargetOrigin::Manual), str::parse)
        .map_err(bad_request)?;
    Ok(NewTarget {
        calories: req.calories,
        protein: req.protein,
        carbs: req.carbs,
        fat: req.fat,
        label: req.label,
        rationale: req.rationale,
        origin,
    })
}

async fn list_targets(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<Vec<TargetRecord>>, ApiError> {
    Ok(Json(state.service.standing_targets(&user)?))
}

async fn create_target(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(req): Json<TargetRequest>,
) -> Result<(StatusCode, Json<TargetRecord>), ApiError> {
    let target = new_target(req)?;
    let record = state.service.save_standing_target(&user, &target)?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn create_daily_target(
    State(state): State<AppState>,
    Path((user, date)): Path<(String, String)>,
    Json(req): Json<TargetRequest>,
) -> Result<(StatusCode, Json<DailyTargetResponse>), ApiError> {
    let target = new_target(req)?;
    let (target, totals) = state
        .service
        .save_daily_target(&user, &date, &target)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(DailyTargetResponse { target, totals }),
    ))
}

async fn get_history(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<DaySummary>>, ApiError> {
    let today = match query.today.as_deref() {
        Some(raw) => parse_date(raw)?,
        None => Local::now().date_naive(),
    };
    let days = query.days.unwrap_or(DEFAULT_HISTORY_DAYS);
    Ok(Json(state.service.day_history(&user, days, today).await?))
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/{user}/foods", post(create_food))
        .route("/api/{user}/foods/{id}", put(update_food).delete(delete_food))
        .route("/api/{user}/workouts", post(create_workout))
        .route(
            "/api/{user}/workouts/{id}",
            put(update_workout).delete(delete_workout),
        )
        .route("/api/{user}/days/{date}", get(get_day))
        .route("/api/{user}/days/{date}/recalc", post(recalc_day))
        .route("/api/{user}/days/{date}/targets", put(save_day_targets))
        .route("/api/{user}/days/{date}/pin", post(pin_day).delete(unpin_day))
        .route(
            "/api/{user}/days/{date}/daily-target",
            post(create_daily_target),
        )
        .route("/api/{user}/targets", get(list_targets).post(create_target))
        .route("/api/{user}/history", get(get_history))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

fn log_totals_change(event: &Event) {
    if let Event::TotalsChanged {
        user_id,
        date,
        totals,
    } = event
    {
        debug!(
            user = %user_id,
            date = %date.format(DATE_FORMAT),
            remaining = totals.remaining,
            locked = totals.locked_remaining,
            "totals changed"
        );
    }
}

pub async fn start_server(
    service: FuelService,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let _totals_log = service.subscribe(TOTALS_CHANGED, log_totals_change);

    let state = AppState {
        service: Arc::new(service),
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    if let Some(ref key) = api_key {
        let head = key.get(..4).unwrap_or_default();
        let tail = key.get(key.len().saturating_sub(4)..).unwrap_or_default();
        eprintln!("API key: {head}...{tail} (see api_key file in data directory)");
    } else {
        warn!("Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        warn!(
            "Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    info!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn test_state(api_key: Option<String>) -> AppState {
        AppState {
            service: Arc::new(FuelService::new_in_memory().unwrap()),
            api_key,
        }
    }

    fn test_app(api_key: Option<String>) -> Router {
        build_router(test_state(api_key))
    }

    async fn send(
        state: &AppState,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = axum::http::Request::builder().method(method).uri(uri);
        let request = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = build_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn as_f64(v: &Value) -> f64 {
        v.as_f64().unwrap()
    }

    #[tokio::test]
    async fn auth_missing_key_returns_401() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/u1/targets")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Invalid or missing API key");
    }

    #[tokio::test]
    async fn auth_wrong_key_returns_401() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/u1/targets")
                    .header("Authorization", "Bearer wrong-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn auth_correct_key_succeeds() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/u1/targets")
                    .header("Authorization", "Bearer test-key-abc123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn security_headers_present() {
        let app = test_app(Some("secret".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/u1/targets")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
        assert_eq!(
            response.headers().get("content-security-policy").unwrap(),
            "default-src 'none'"
        );
    }

    #[tokio::test]
    async fn log_food_and_workout_updates_totals() {
        let state = test_state(None);

        let (status, _) = send(
            &state,
            "POST",
            "/api/u1/targets",
            Some(json!({"calories": 2000})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(
            &state,
            "POST",
            "/api/u1/foods",
            Some(json!({
                "date": "2024-01-05",
                "meal_type": "lunch",
                "name": "Burrito",
                "calories": 500,
                "protein": 30
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["entry"]["name"], "Burrito");
        assert_eq!(body["entry"]["source"], "manual");

        let (status, body) = send(
            &state,
            "POST",
            "/api/u1/workouts",
            Some(json!({
                "date": "2024-01-05",
                "name": "Cycling",
                "duration_min": 60,
                "calories_burned": 300,
                "source": "ai"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!((as_f64(&body["totals"]["allowance"]) - 2300.0).abs() < 1e-9);
        assert!((as_f64(&body["totals"]["remaining"]) - 1800.0).abs() < 1e-9);
        assert_eq!(body["totals"]["locked_remaining"], false);

        let (status, day) = send(&state, "GET", "/api/u1/days/2024-01-05", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(day["foods"].as_array().unwrap().len(), 1);
        assert_eq!(day["workouts"].as_array().unwrap().len(), 1);
        assert_eq!(day["target"]["source"], "day");
        assert!((as_f64(&day["display_remaining"]) - 1800.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn invalid_input_returns_400() {
        let state = test_state(None);

        let (status, body) = send(
            &state,
            "POST",
            "/api/u1/foods",
            Some(json!({"date": "2024-01-05", "meal_type": "lunch", "name": "X", "calories": -5})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("calories"));

        let (status, _) = send(
            &state,
            "POST",
            "/api/u1/foods",
            Some(json!({"date": "05/01/2024", "meal_type": "lunch", "name": "X"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&state, "GET", "/api/u1/days/not-a-date", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&state, "POST", "/api/%20/days/2024-01-05/recalc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &state,
            "POST",
            "/api/u1/targets",
            Some(json!({"calories": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_and_delete_entries() {
        let state = test_state(None);
        let (_, created) = send(
            &state,
            "POST",
            "/api/u1/foods",
            Some(json!({"date": "2024-01-05", "meal_type": "dinner", "name": "Soup", "calories": 300})),
        )
        .await;
        let id = created["entry"]["id"].as_i64().unwrap();

        let (status, body) = send(
            &state,
            "PUT",
            &format!("/api/u1/foods/{id}"),
            Some(json!({"date": "2024-01-06", "calories": 350})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["entry"]["date"], "2024-01-06");
        assert!((as_f64(&body["totals"]["food_cals"]) - 350.0).abs() < 1e-9);
        assert!(as_f64(&body["previous_day"]["food_cals"]).abs() < 1e-9);

        let (status, _) = send(&state, "DELETE", &format!("/api/u2/foods/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&state, "DELETE", &format!("/api/u1/foods/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(as_f64(&body["totals"]["food_cals"]).abs() < 1e-9);

        let (status, _) = send(
            &state,
            "PUT",
            "/api/u1/workouts/999",
            Some(json!({"calories_burned": 10})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn pin_and_unpin_day() {
        let state = test_state(None);
        send(
            &state,
            "PUT",
            "/api/u1/days/2024-01-05/targets",
            Some(json!({"calories": 2000, "label": "Maintenance"})),
        )
        .await;
        send(
            &state,
            "POST",
            "/api/u1/foods",
            Some(json!({"date": "2024-01-05", "meal_type": "snack", "name": "Bar", "calories": 500})),
        )
        .await;

        let (status, body) = send(
            &state,
            "POST",
            "/api/u1/days/2024-01-05/pin",
            Some(json!({"remaining": 1200})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["locked_remaining"], true);
        assert!((as_f64(&body["remaining"]) - 1200.0).abs() < 1e-9);

        let (_, body) = send(&state, "POST", "/api/u1/days/2024-01-05/recalc", None).await;
        assert!((as_f64(&body["remaining"]) - 1200.0).abs() < 1e-9);

        let (status, body) = send(&state, "DELETE", "/api/u1/days/2024-01-05/pin", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["locked_remaining"], false);
        assert!((as_f64(&body["remaining"]) - 1500.0).abs() < 1e-9);

        let (status, body) = send(&state, "POST", "/api/u1/days/2024-01-05/pin", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["locked_remaining"], true);
        assert!(body["remaining_override"].is_null());
    }

    #[tokio::test]
    async fn targets_and_daily_target() {
        let state = test_state(None);
        send(
            &state,
            "POST",
            "/api/u1/targets",
            Some(json!({"calories": 1800, "protein": 140})),
        )
        .await;
        let (status, body) = send(
            &state,
            "POST",
            "/api/u1/targets",
            Some(json!({"calories": 2100, "origin": "suggested", "rationale": "Training block"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["origin"], "suggested");

        let (status, list) = send(&state, "GET", "/api/u1/targets", None).await;
        assert_eq!(status, StatusCode::OK);
        let list = list.as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert!((as_f64(&list[0]["calories"]) - 2100.0).abs() < 1e-9);

        let (status, body) = send(
            &state,
            "POST",
            "/api/u1/days/2024-01-05/daily-target",
            Some(json!({"calories": 1600})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["target"]["date"], "2024-01-05");
        assert!((as_f64(&body["totals"]["allowance"]) - 1600.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn history_window() {
        let state = test_state(None);
        send(
            &state,
            "POST",
            "/api/u1/foods",
            Some(json!({"date": "2024-01-04", "meal_type": "lunch", "name": "Salad", "calories": 400})),
        )
        .await;

        let (status, body) = send(
            &state,
            "GET",
            "/api/u1/history?days=3&today=2024-01-05",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["date"], "2024-01-03");
        assert_eq!(rows[1]["logged"], true);
        assert_eq!(rows[2]["logged"], false);

        let (status, _) = send(&state, "GET", "/api/u1/history?days=0", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn engine_errors_map_to_statuses() {
        let cases = [
            (EngineError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (EngineError::NotFound("food entry 1".into()), StatusCode::NOT_FOUND),
            (
                EngineError::Read(anyhow::anyhow!("disk")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                EngineError::Write(anyhow::anyhow!("disk")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
