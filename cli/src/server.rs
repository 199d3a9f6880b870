use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{FromRequestParts, Path, Query, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header, request::Parts},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;

use crate::objects::LocalObjectStore;
use fitpulse_core::FitpulseService;
use fitpulse_core::error::CoreError;
use fitpulse_core::models::{
    ActivityInput, ActivityTrackRecord, BodyProfile, DailyHydrationRecord, DaySummary,
    HydrationDay, HydrationGoal, HydrationGoalView, MealDay, MealEntry, MealInput, ProfileInput,
    StepReadingOutcome, UserId, WaterLogged, WaterUndone, WorkoutDayRecord, WorkoutUpdate,
};
use fitpulse_core::objects::{MAX_IMAGE_BYTES, content_type_for_key};
use fitpulse_core::provider::ActivityProvider;

const BODY_LIMIT: usize = MAX_IMAGE_BYTES + 1024 * 1024;
const USER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<FitpulseService>,
    pub api_key: Option<String>,
    pub objects: Option<Arc<LocalObjectStore>>,
    pub google_fit: Option<Arc<dyn ActivityProvider>>,
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct DayQuery {
    day: Option<String>,
}

#[derive(Deserialize)]
struct RangeQuery {
    start: Option<String>,
    end: Option<String>,
}

#[derive(Deserialize)]
struct TrackListQuery {
    start: Option<String>,
    end: Option<String>,
    limit: Option<i64>,
}

#[derive(Deserialize)]
struct StepReadingRequest {
    total: i64,
    at: Option<DateTime<Utc>>,
    tz: Option<String>,
}

#[derive(Deserialize)]
struct SetGoalRequest {
    daily_ml: i64,
}

#[derive(Serialize)]
struct GoalSetResponse {
    goal: HydrationGoal,
    today: DailyHydrationRecord,
}

#[derive(Deserialize)]
struct LogWaterRequest {
    amount_ml: Option<i64>,
    at: Option<DateTime<Utc>>,
    #[serde(default)]
    amounts: Vec<i64>,
    #[serde(default)]
    ats: Vec<DateTime<Utc>>,
    source: Option<String>,
}

#[derive(Deserialize)]
struct SyncQuery {
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    bucket_seconds: Option<u32>,
}

#[derive(Deserialize)]
struct ObjectQuery {
    expires: i64,
    sig: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Internal(err) => {
                tracing::error!(error = %format!("{err:#}"), "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => Self::BadRequest(msg),
            CoreError::NotFound(msg) => Self::NotFound(msg),
            CoreError::Conflict(msg) => Self::Conflict(msg),
            CoreError::Store(err) => Self::Internal(err),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

// --- Principal ---

/// Principal id forwarded by the upstream authenticator.
struct CurrentUser(UserId);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::BadRequest("Missing X-User-Id header".to_string()))?;
        Ok(Self(UserId::parse(raw)?))
    }
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

fn content_type(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Missing Content-Type header".to_string()))
}

// --- Summaries ---

async fn get_day_summary(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(q): Query<DayQuery>,
) -> Result<Json<DaySummary>, ApiError> {
    Ok(Json(
        state.service.get_day_summary(&user, q.day.as_deref()).await?,
    ))
}

async fn get_range_summary(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(q): Query<RangeQuery>,
) -> Result<Json<Vec<DaySummary>>, ApiError> {
    let summaries = state
        .service
        .get_range_summary(&user, q.start.as_deref(), q.end.as_deref())
        .await?;
    Ok(Json(summaries))
}

// --- Steps ---

async fn post_step_reading(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<StepReadingRequest>,
) -> Result<Json<StepReadingOutcome>, ApiError> {
    let outcome = state
        .service
        .apply_device_step_reading(&user, req.total, req.at, req.tz.as_deref())
        .await?;
    Ok(Json(outcome))
}

// --- Profile ---

async fn get_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<BodyProfile>, ApiError> {
    Ok(Json(state.service.get_body_profile(&user).await?))
}

async fn create_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<ProfileInput>,
) -> Result<(StatusCode, Json<BodyProfile>), ApiError> {
    let profile = state.service.create_body_profile(&user, input).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

async fn upsert_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<ProfileInput>,
) -> Result<Json<BodyProfile>, ApiError> {
    Ok(Json(state.service.upsert_body_profile(&user, input).await?))
}

async fn upload_profile_photo(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<BodyProfile>, ApiError> {
    let content_type = content_type(&headers)?;
    let profile = state
        .service
        .upload_profile_photo(&user, body.to_vec(), content_type)
        .await?;
    Ok(Json(profile))
}

// --- Hydration ---

async fn get_hydration_goal(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<HydrationGoalView>, ApiError> {
    Ok(Json(state.service.get_hydration_goal(&user).await?))
}

async fn set_hydration_goal(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<SetGoalRequest>,
) -> Result<Json<GoalSetResponse>, ApiError> {
    let (goal, today) = state.service.set_hydration_goal(&user, req.daily_ml).await?;
    Ok(Json(GoalSetResponse { goal, today }))
}

async fn goal_from_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<GoalSetResponse>, ApiError> {
    let (goal, today) = state
        .service
        .recompute_hydration_goal_from_profile(&user)
        .await?;
    Ok(Json(GoalSetResponse { goal, today }))
}

async fn log_water(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<LogWaterRequest>,
) -> Result<(StatusCode, Json<WaterLogged>), ApiError> {
    let entries: Vec<(i64, Option<DateTime<Utc>>)> = if !req.amounts.is_empty() {
        if !req.ats.is_empty() && req.ats.len() != req.amounts.len() {
            return Err(ApiError::BadRequest(
                "ats must have one timestamp per amount".to_string(),
            ));
        }
        req.amounts
            .iter()
            .enumerate()
            .map(|(i, ml)| (*ml, req.ats.get(i).copied()))
            .collect()
    } else if let Some(ml) = req.amount_ml {
        vec![(ml, req.at)]
    } else {
        return Err(ApiError::BadRequest(
            "amount_ml or amounts is required".to_string(),
        ));
    };
    let logged = state
        .service
        .log_water_batch(&user, entries, req.source.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(logged)))
}

async fn undo_water(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<WaterUndone>, ApiError> {
    Ok(Json(state.service.undo_last_water_log(&user).await?))
}

async fn hydration_today(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<HydrationDay>, ApiError> {
    Ok(Json(state.service.hydration_today(&user).await?))
}

async fn hydration_daily(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(q): Query<RangeQuery>,
) -> Result<Json<Vec<DailyHydrationRecord>>, ApiError> {
    let days = state
        .service
        .list_hydration_days(&user, q.start.as_deref(), q.end.as_deref())
        .await?;
    Ok(Json(days))
}

// --- Meals ---

async fn create_meal(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<MealInput>,
) -> Result<(StatusCode, Json<MealEntry>), ApiError> {
    let entry = state.service.log_meal(&user, input).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn list_meals(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(q): Query<DayQuery>,
) -> Result<Json<MealDay>, ApiError> {
    Ok(Json(
        state.service.list_meals_for_day(&user, q.day.as_deref()).await?,
    ))
}

async fn delete_meal(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.service.delete_meal(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn attach_meal_image(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MealEntry>, ApiError> {
    let content_type = content_type(&headers)?;
    let entry = state
        .service
        .attach_meal_image(&user, id, body.to_vec(), content_type)
        .await?;
    Ok(Json(entry))
}

// --- Activity tracks ---

async fn list_tracks(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(q): Query<TrackListQuery>,
) -> Result<Json<Vec<ActivityTrackRecord>>, ApiError> {
    let tracks = state
        .service
        .list_activity_tracks(&user, q.start.as_deref(), q.end.as_deref(), q.limit)
        .await?;
    Ok(Json(tracks))
}

async fn get_track(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(day): Path<String>,
) -> Result<Json<ActivityTrackRecord>, ApiError> {
    Ok(Json(state.service.get_activity_track(&user, &day).await?))
}

async fn create_track(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(day): Path<String>,
    Json(input): Json<ActivityInput>,
) -> Result<(StatusCode, Json<ActivityTrackRecord>), ApiError> {
    let record = state
        .service
        .create_activity_track(&user, &day, input)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn upsert_track(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(day): Path<String>,
    Json(input): Json<ActivityInput>,
) -> Result<Json<ActivityTrackRecord>, ApiError> {
    Ok(Json(
        state.service.upsert_activity_track(&user, &day, input).await?,
    ))
}

async fn patch_track(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(day): Path<String>,
    Json(input): Json<ActivityInput>,
) -> Result<Json<ActivityTrackRecord>, ApiError> {
    Ok(Json(
        state.service.patch_activity_track(&user, &day, input).await?,
    ))
}

async fn add_to_track(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(day): Path<String>,
    Json(input): Json<ActivityInput>,
) -> Result<Json<ActivityTrackRecord>, ApiError> {
    Ok(Json(state.service.add_activity(&user, &day, input).await?))
}

async fn delete_track(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(day): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.service.delete_activity_track(&user, &day).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Workouts ---

async fn list_workouts(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(q): Query<RangeQuery>,
) -> Result<Json<Vec<WorkoutDayRecord>>, ApiError> {
    let days = state
        .service
        .list_workout_days(&user, q.start.as_deref(), q.end.as_deref())
        .await?;
    Ok(Json(days))
}

async fn upsert_workout_today(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(update): Json<WorkoutUpdate>,
) -> Result<Json<WorkoutDayRecord>, ApiError> {
    Ok(Json(
        state.service.upsert_workout_day(&user, None, update).await?,
    ))
}

async fn get_workout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(day): Path<String>,
) -> Result<Json<WorkoutDayRecord>, ApiError> {
    Ok(Json(state.service.get_workout_day(&user, Some(day.as_str())).await?))
}

async fn upsert_workout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(day): Path<String>,
    Json(update): Json<WorkoutUpdate>,
) -> Result<Json<WorkoutDayRecord>, ApiError> {
    Ok(Json(
        state
            .service
            .upsert_workout_day(&user, Some(day.as_str()), update)
            .await?,
    ))
}

async fn delete_workout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(day): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.service.delete_workout_day(&user, &day).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Provider sync ---

async fn sync_google_fit(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(q): Query<SyncQuery>,
) -> Result<Json<Vec<ActivityTrackRecord>>, ApiError> {
    let provider = state.google_fit.as_ref().ok_or_else(|| {
        ApiError::BadRequest("Google Fit is not configured (set FITPULSE_GOOGLE_FIT_TOKEN)".into())
    })?;
    let records = state
        .service
        .sync_provider_activity(provider.as_ref(), &user, q.since, q.until, q.bucket_seconds)
        .await?;
    Ok(Json(records))
}

// --- Objects ---

async fn get_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(q): Query<ObjectQuery>,
) -> Result<Response, ApiError> {
    let objects = state
        .objects
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("Object storage is disabled".to_string()))?;
    if !objects.verify(&key, q.expires, &q.sig, Utc::now().timestamp()) {
        return Err(ApiError::Forbidden(
            "Invalid or expired signature".to_string(),
        ));
    }
    let bytes = objects
        .read_object(&key)
        .await?
        .ok_or_else(|| ApiError::NotFound("Object not found".to_string()))?;
    Ok(([(header::CONTENT_TYPE, content_type_for_key(&key))], bytes).into_response())
}

fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/summary/day", get(get_day_summary))
        .route("/api/summary/range", get(get_range_summary))
        .route("/api/steps/reading", post(post_step_reading))
        .route(
            "/api/profile",
            get(get_profile).post(create_profile).put(upsert_profile),
        )
        .route("/api/profile/photo", post(upload_profile_photo))
        .route(
            "/api/hydration/goal",
            get(get_hydration_goal).put(set_hydration_goal),
        )
        .route("/api/hydration/goal/from-profile", post(goal_from_profile))
        .route("/api/hydration/logs", post(log_water))
        .route("/api/hydration/logs/last", delete(undo_water))
        .route("/api/hydration/today", get(hydration_today))
        .route("/api/hydration/daily", get(hydration_daily))
        .route("/api/meals", post(create_meal).get(list_meals))
        .route("/api/meals/{id}", delete(delete_meal))
        .route("/api/meals/{id}/image", put(attach_meal_image))
        .route("/api/track", get(list_tracks))
        .route(
            "/api/track/{day}",
            get(get_track)
                .post(create_track)
                .put(upsert_track)
                .patch(patch_track)
                .delete(delete_track),
        )
        .route("/api/track/{day}/add", post(add_to_track))
        .route("/api/workout", get(list_workouts).put(upsert_workout_today))
        .route(
            "/api/workout/{day}",
            get(get_workout).put(upsert_workout).delete(delete_workout),
        )
        .route("/api/sync/googlefit", post(sync_google_fit))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // Signed URLs carry their own authorization.
    let objects = Router::new().route("/objects/{*key}", get(get_object));

    api.merge(objects)
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    state: AppState,
    port: u16,
    bind: &str,
) -> anyhow::Result<()> {
    if let Some(ref key) = state.api_key {
        eprintln!(
            "API key: {}...{} (see api_key file in data directory)",
            &key[..4],
            &key[key.len() - 4..],
        );
    } else {
        eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && state.api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }
    if state.google_fit.is_none() {
        tracing::info!("google fit sync disabled; set FITPULSE_GOOGLE_FIT_TOKEN to enable");
    }

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    eprintln!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_app(api_key: Option<String>) -> (Router, TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let objects = Arc::new(LocalObjectStore::new(
            tmp.path().join("objects"),
            "http://localhost",
            "test-secret".to_string(),
        ));
        let service = FitpulseService::new_in_memory()
            .unwrap()
            .with_object_store(objects.clone());
        let state = AppState {
            service: Arc::new(service),
            api_key,
            objects: Some(objects),
            google_fit: None,
        };
        (build_router(state), tmp)
    }

    fn get_as(uri: &str, user: &str) -> axum::http::Request<Body> {
        axum::http::Request::get(uri)
            .header(USER_HEADER, user)
            .body(Body::empty())
            .unwrap()
    }

    fn json_as(
        method: &str,
        uri: &str,
        user: &str,
        body: &serde_json::Value,
    ) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header(USER_HEADER, user)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(
        app: &Router,
        req: axum::http::Request<Body>,
    ) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn auth_missing_key_returns_401() {
        let (app, _tmp) = test_app(Some("test-key-abc123".to_string()));
        let (status, json) = send(&app, get_as("/api/summary/day", "u1")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Invalid or missing API key");
    }

    #[tokio::test]
    async fn auth_correct_key_succeeds() {
        let (app, _tmp) = test_app(Some("test-key-abc123".to_string()));
        let req = axum::http::Request::get("/api/summary/day")
            .header("Authorization", "Bearer test-key-abc123")
            .header(USER_HEADER, "u1")
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["overall_pct"], 0);
    }

    #[tokio::test]
    async fn missing_user_header_is_bad_request() {
        let (app, _tmp) = test_app(None);
        let req = axum::http::Request::get("/api/summary/day")
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Missing X-User-Id header");
    }

    #[tokio::test]
    async fn security_headers_present() {
        let (app, _tmp) = test_app(Some("secret".to_string()));
        let response = app
            .oneshot(get_as("/api/summary/day", "u1"))
            .await
            .unwrap();
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
    }

    #[tokio::test]
    async fn water_requires_goal_then_logs() {
        let (app, _tmp) = test_app(None);
        let body = serde_json::json!({ "amount_ml": 250 });
        let (status, _) = send(&app, json_as("POST", "/api/hydration/logs", "u1", &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let goal = serde_json::json!({ "daily_ml": 2000 });
        let (status, _) = send(&app, json_as("PUT", "/api/hydration/goal", "u1", &goal)).await;
        assert_eq!(status, StatusCode::OK);

        let batch = serde_json::json!({ "amounts": [250, 500] });
        let (status, json) = send(&app, json_as("POST", "/api/hydration/logs", "u1", &batch)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["record"]["consumed_ml"], 750);

        let (status, json) = send(&app, get_as("/api/hydration/today", "u1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["logs"].as_array().unwrap().len(), 2);

        // another user sees nothing
        let (_, json) = send(&app, get_as("/api/hydration/today", "u2")).await;
        assert!(json["logs"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn water_batch_length_mismatch_rejected() {
        let (app, _tmp) = test_app(None);
        let body = serde_json::json!({
            "amounts": [250, 500],
            "ats": ["2025-03-10T05:00:00Z"]
        });
        let (status, _) = send(&app, json_as("POST", "/api/hydration/logs", "u1", &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_profile_twice_conflicts() {
        let (app, _tmp) = test_app(None);
        let body = serde_json::json!({ "height_cm": 170, "weight_kg": 70 });
        let (status, json) = send(&app, json_as("POST", "/api/profile", "u1", &body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["bmi_band"], "normal");
        let (status, _) = send(&app, json_as("POST", "/api/profile", "u1", &body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn range_over_limit_rejected() {
        let (app, _tmp) = test_app(None);
        let (status, _) = send(
            &app,
            get_as("/api/summary/range?start=2025-01-01&end=2025-03-01", "u1"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, json) = send(
            &app,
            get_as("/api/summary/range?start=2025-01-03&end=2025-01-01", "u1"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json[0]["day"], "2025-01-01");
    }

    #[tokio::test]
    async fn step_reading_and_missing_meal() {
        let (app, _tmp) = test_app(None);
        let body = serde_json::json!({ "total": 5000, "at": "2025-03-10T05:00:00Z" });
        let (status, json) = send(&app, json_as("POST", "/api/steps/reading", "u1", &body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["state"], "no_cursor");

        let req = axum::http::Request::delete("/api/meals/42")
            .header(USER_HEADER, "u1")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn sync_without_provider_is_bad_request() {
        let (app, _tmp) = test_app(None);
        let req = axum::http::Request::post("/api/sync/googlefit")
            .header(USER_HEADER, "u1")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn profile_photo_served_through_signed_url() {
        let (app, _tmp) = test_app(None);
        let body = serde_json::json!({ "height_cm": 170, "weight_kg": 70 });
        send(&app, json_as("PUT", "/api/profile", "u1", &body)).await;

        let req = axum::http::Request::post("/api/profile/photo")
            .header(USER_HEADER, "u1")
            .header("content-type", "image/png")
            .body(Body::from(vec![137u8, 80, 78, 71]))
            .unwrap();
        let (status, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        let url = json["image_url"].as_str().unwrap();
        let path = url.strip_prefix("http://localhost").unwrap();

        let response = app
            .clone()
            .oneshot(axum::http::Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("content-type").unwrap(), "image/png");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(bytes.as_ref(), &[137u8, 80, 78, 71]);

        let tampered = path.replace("sig=", "sig=00");
        let (status, _) = send(
            &app,
            axum::http::Request::get(tampered.as_str())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
