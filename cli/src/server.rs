use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;

use slimify_core::Error;
use slimify_core::aggregate::today_stats;
use slimify_core::ai::{AiSettings, AiStatus, ExerciseParser, ExercisePayload};
use slimify_core::models::{
    DailyLog, ExerciseEntry, FoodEntry, Intensity, MealType, NewExerciseEntry, NewFoodEntry,
    TodayStats, WeeklyPlan, WeeklyStats, WeightEntry,
};
use slimify_core::service::{RECENT_WEIGHT_LIMIT, TrackerService};

const BODY_LIMIT: usize = 64 * 1024; // 64 KB

#[derive(Clone)]
struct AppState {
    service: Arc<TrackerService>,
    parser: Arc<dyn ExerciseParser>,
    ai_status: AiStatus,
}

// --- Request / Response types ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    ai: AiStatus,
}

#[derive(Deserialize)]
struct ParseExerciseRequest {
    input: Option<String>,
}

#[derive(Serialize)]
struct DayResponse {
    date: NaiveDate,
    log: Option<DailyLog>,
    stats: TodayStats,
}

#[derive(Deserialize)]
struct CreateFoodRequest {
    name: String,
    calories: i64,
    protein: Option<f64>,
    carbs: Option<f64>,
    fat: Option<f64>,
    meal_type: Option<String>,
}

#[derive(Deserialize)]
struct CreateExerciseRequest {
    activity: String,
    duration: u32,
    #[serde(default)]
    intensity: Option<String>,
}

#[derive(Deserialize)]
struct CreateWeightRequest {
    date: Option<String>,
    weight: f64,
    body_fat: Option<f64>,
    notes: Option<String>,
}

#[derive(Deserialize)]
struct WeightHistoryQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct WeekQuery {
    date: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unprocessable(String),
    BadGateway(String),
    Unavailable(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            Self::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
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

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(msg) => Self::BadRequest(msg),
            Error::AiNotConfigured => Self::Unavailable("AI service not configured".to_string()),
            Error::AiRequest(detail) => {
                tracing::warn!(%detail, "AI request failed");
                Self::BadGateway("AI request failed".to_string())
            }
            Error::AiResponseMalformed(detail) => {
                tracing::warn!(%detail, "AI response rejected");
                Self::Unprocessable("Failed to parse AI response".to_string())
            }
            other => Self::Internal(other.into()),
        }
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("Invalid date '{raw}'. Use YYYY-MM-DD")))
}

// --- Middleware ---

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

// --- Handlers ---

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        ai: state.ai_status.clone(),
    })
}

async fn parse_exercise(
    State(state): State<AppState>,
    Json(req): Json<ParseExerciseRequest>,
) -> Result<Json<ExercisePayload>, ApiError> {
    let input = req.input.unwrap_or_default();
    let input = input.trim();
    if input.is_empty() {
        return Err(ApiError::BadRequest("No input provided".to_string()));
    }
    let exercise = state.parser.parse_exercise(input).await?;
    Ok(Json(ExercisePayload { exercise }))
}

async fn day_response(service: &TrackerService, date: NaiveDate) -> Result<DayResponse, ApiError> {
    let log = service.daily_log(date).await?;
    let stats = today_stats(log.as_ref());
    Ok(DayResponse { date, log, stats })
}

async fn get_today(State(state): State<AppState>) -> Result<Json<DayResponse>, ApiError> {
    let today = state.service.today();
    Ok(Json(day_response(&state.service, today).await?))
}

async fn get_log(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<DayResponse>, ApiError> {
    let date = parse_date(&date)?;
    let day = day_response(&state.service, date).await?;
    if day.log.is_none() {
        return Err(ApiError::NotFound(format!("No log for {date}")));
    }
    Ok(Json(day))
}

async fn create_food(
    State(state): State<AppState>,
    Json(req): Json<CreateFoodRequest>,
) -> Result<(StatusCode, Json<FoodEntry>), ApiError> {
    let meal_type = req
        .meal_type
        .as_deref()
        .map(str::parse::<MealType>)
        .transpose()?;
    let entry = state
        .service
        .add_food_entry(NewFoodEntry {
            name: req.name,
            calories: req.calories,
            protein: req.protein,
            carbs: req.carbs,
            fat: req.fat,
            meal_type,
            ..NewFoodEntry::default()
        })
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn create_exercise(
    State(state): State<AppState>,
    Json(req): Json<CreateExerciseRequest>,
) -> Result<(StatusCode, Json<ExerciseEntry>), ApiError> {
    let intensity = req
        .intensity
        .as_deref()
        .map(str::parse::<Intensity>)
        .transpose()?
        .unwrap_or(Intensity::Moderate);
    let entry = state
        .service
        .add_exercise_entry(NewExerciseEntry {
            activity: req.activity,
            duration: req.duration,
            intensity,
            ai_generated: false,
            raw_input: None,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn delete_food(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.service.remove_food_entry(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("No food entry '{id}' today")))
    }
}

async fn delete_exercise(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.service.remove_exercise_entry(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("No exercise entry '{id}' today")))
    }
}

async fn get_plan(State(state): State<AppState>) -> Result<Json<WeeklyPlan>, ApiError> {
    state
        .service
        .current_weekly_plan()
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No plan for this week. Save a profile first".to_string()))
}

async fn get_weight(
    State(state): State<AppState>,
    Query(query): Query<WeightHistoryQuery>,
) -> Result<Json<Vec<WeightEntry>>, ApiError> {
    let limit = query.limit.unwrap_or(RECENT_WEIGHT_LIMIT);
    Ok(Json(state.service.weight_entries(limit).await?))
}

async fn create_weight(
    State(state): State<AppState>,
    Json(req): Json<CreateWeightRequest>,
) -> Result<(StatusCode, Json<WeightEntry>), ApiError> {
    let date = match req.date.as_deref() {
        Some(raw) => parse_date(raw)?,
        None => state.service.today(),
    };
    let entry = WeightEntry {
        date,
        weight: req.weight,
        body_fat: req.body_fat,
        notes: req.notes,
    };
    state.service.add_weight(entry.clone()).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn get_week_stats(
    State(state): State<AppState>,
    Query(query): Query<WeekQuery>,
) -> Result<Json<WeeklyStats>, ApiError> {
    let date = match query.date.as_deref() {
        Some(raw) => parse_date(raw)?,
        None => state.service.today(),
    };
    Ok(Json(state.service.weekly_stats(date).await?))
}

// --- Router ---

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/ai/exercise", post(parse_exercise))
        .route("/api/today", get(get_today))
        .route("/api/logs/{date}", get(get_log))
        .route("/api/food", post(create_food))
        .route("/api/food/{id}", delete(delete_food))
        .route("/api/exercise", post(create_exercise))
        .route("/api/exercise/{id}", delete(delete_exercise))
        .route("/api/plan", get(get_plan))
        .route("/api/weight", get(get_weight).post(create_weight))
        .route("/api/stats/week", get(get_week_stats))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

pub async fn start_server(
    service: Arc<TrackerService>,
    parser: Arc<dyn ExerciseParser>,
    ai: &AiSettings,
    port: u16,
    bind: &str,
) -> anyhow::Result<()> {
    if let Some(warning) = ai.startup_warning() {
        tracing::warn!("{warning}");
    }
    let state = AppState {
        service,
        parser,
        ai_status: ai.status(),
    };
    let app = build_router(state);

    if bind != "127.0.0.1" && bind != "localhost" {
        eprintln!(
            "Warning: Listening on {bind}. Any device on your network can read and change your log."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    tracing::info!(%bind, port, "server started");
    eprintln!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use slimify_core::ai::ParsedExercise;
    use slimify_core::db::LazyDatabase;
    use slimify_core::models::{ActivityLevel, NewProfile, Sex};
    use tower::ServiceExt;

    enum MockParser {
        Reply,
        NotConfigured,
        Failing,
        Malformed,
    }

    #[async_trait]
    impl ExerciseParser for MockParser {
        async fn parse_exercise(&self, _input: &str) -> slimify_core::Result<ParsedExercise> {
            match self {
                MockParser::Reply => Ok(ParsedExercise {
                    activity: "running".to_string(),
                    duration: 45,
                    intensity: Intensity::Moderate,
                }),
                MockParser::NotConfigured => Err(Error::AiNotConfigured),
                MockParser::Failing => Err(Error::AiRequest("gemini returned 500".to_string())),
                MockParser::Malformed => {
                    Err(Error::AiResponseMalformed("reply is not JSON".to_string()))
                }
            }
        }
    }

    // Wednesday.
    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 12).unwrap()
    }

    fn test_state(parser: MockParser) -> AppState {
        let service = TrackerService::with_clock(LazyDatabase::in_memory(), Arc::new(today));
        AppState {
            service: Arc::new(service),
            parser: Arc::new(parser),
            ai_status: AiStatus {
                provider: "gemini".to_string(),
                configured: true,
            },
        }
    }

    fn test_app() -> Router {
        build_router(test_state(MockParser::Reply))
    }

    async fn send(app: Router, request: axum::http::Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    fn get_req(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::get(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &serde_json::Value) -> axum::http::Request<Body> {
        axum::http::Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn delete_req(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::delete(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ai_status() {
        let (status, json) = send(test_app(), get_req("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["ai"]["provider"], "gemini");
        assert_eq!(json["ai"]["configured"], true);
    }

    #[tokio::test]
    async fn ai_exercise_returns_parsed_payload() {
        let req = post_json("/api/ai/exercise", &serde_json::json!({"input": "ran 45 min"}));
        let (status, json) = send(test_app(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["exercise"]["activity"], "running");
        assert_eq!(json["exercise"]["duration"], 45);
        assert_eq!(json["exercise"]["intensity"], "moderate");
    }

    #[tokio::test]
    async fn ai_exercise_missing_input_returns_400() {
        for body in [serde_json::json!({}), serde_json::json!({"input": "   "})] {
            let (status, json) = send(test_app(), post_json("/api/ai/exercise", &body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(json["error"], "No input provided");
        }
    }

    #[tokio::test]
    async fn ai_exercise_errors_map_to_status() {
        let cases = [
            (MockParser::NotConfigured, StatusCode::SERVICE_UNAVAILABLE),
            (MockParser::Failing, StatusCode::BAD_GATEWAY),
            (MockParser::Malformed, StatusCode::UNPROCESSABLE_ENTITY),
        ];
        for (parser, expected) in cases {
            let app = build_router(test_state(parser));
            let req = post_json("/api/ai/exercise", &serde_json::json!({"input": "walked"}));
            let (status, json) = send(app, req).await;
            assert_eq!(status, expected);
            assert!(json["error"].is_string());
        }
    }

    #[tokio::test]
    async fn ai_exercise_hides_provider_detail() {
        let app = build_router(test_state(MockParser::Failing));
        let req = post_json("/api/ai/exercise", &serde_json::json!({"input": "walked"}));
        let (_, json) = send(app, req).await;
        assert_eq!(json["error"], "AI request failed");
    }

    #[tokio::test]
    async fn food_create_updates_today_and_delete_removes() {
        let app = test_app();

        let req = post_json(
            "/api/food",
            &serde_json::json!({"name": "Oatmeal", "calories": 350, "meal_type": "breakfast"}),
        );
        let (status, entry) = send(app.clone(), req).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(entry["name"], "Oatmeal");
        let id = entry["id"].as_str().unwrap().to_string();

        let (status, day) = send(app.clone(), get_req("/api/today")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(day["date"], "2024-06-12");
        assert_eq!(day["stats"]["total_calories"], 350);
        assert_eq!(day["stats"]["target_calories"], 2000);
        assert_eq!(day["stats"]["remaining"], 1650);

        let (status, _) = send(app.clone(), delete_req(&format!("/api/food/{id}"))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(app.clone(), delete_req(&format!("/api/food/{id}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, day) = send(app, get_req("/api/today")).await;
        assert_eq!(day["stats"]["total_calories"], 0);
    }

    #[tokio::test]
    async fn food_with_bad_meal_type_returns_400() {
        let req = post_json(
            "/api/food",
            &serde_json::json!({"name": "Toast", "calories": 90, "meal_type": "brunch"}),
        );
        let (status, _) = send(test_app(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn food_with_negative_calories_returns_400() {
        let req = post_json("/api/food", &serde_json::json!({"name": "Toast", "calories": -5}));
        let (status, json) = send(test_app(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Calories must not be negative");
    }

    #[tokio::test]
    async fn food_with_huge_calories_returns_400() {
        let app = test_app();
        for _ in 0..2 {
            let req = post_json(
                "/api/food",
                &serde_json::json!({"name": "Overflow", "calories": i64::MAX}),
            );
            let (status, json) = send(app.clone(), req).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(json["error"].as_str().unwrap().contains("at most 20000"));
        }
        let (status, day) = send(app, get_req("/api/today")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(day["log"].is_null());
    }

    #[tokio::test]
    async fn exercise_create_uses_fallback_weight() {
        let app = test_app();
        let req = post_json(
            "/api/exercise",
            &serde_json::json!({"activity": "running", "duration": 60}),
        );
        let (status, entry) = send(app.clone(), req).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(entry["intensity"], "moderate");
        assert_eq!(entry["calories_burned"], 544);
        let id = entry["id"].as_str().unwrap().to_string();

        let (status, _) = send(app, delete_req(&format!("/api/exercise/{id}"))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn exercise_with_zero_duration_returns_400() {
        let req = post_json(
            "/api/exercise",
            &serde_json::json!({"activity": "running", "duration": 0}),
        );
        let (status, _) = send(test_app(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn log_lookup_by_date() {
        let app = test_app();

        let (status, _) = send(app.clone(), get_req("/api/logs/2024-06-12")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, json) = send(app.clone(), get_req("/api/logs/june")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid date 'june'. Use YYYY-MM-DD");

        let req = post_json("/api/food", &serde_json::json!({"name": "Apple", "calories": 95}));
        send(app.clone(), req).await;
        let (status, json) = send(app, get_req("/api/logs/2024-06-12")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["log"]["meals"][0]["name"], "Apple");
    }

    #[tokio::test]
    async fn plan_requires_profile() {
        let state = test_state(MockParser::Reply);
        let app = build_router(state.clone());

        let (status, _) = send(app.clone(), get_req("/api/plan")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        state
            .service
            .save_user_profile(NewProfile {
                age: 30,
                weight: 180.0,
                height: 70.0,
                activity_level: ActivityLevel::Moderate,
                sex: Sex::Male,
                target_weight: 165.0,
                weekly_goal: 1.0,
            })
            .await
            .unwrap();

        let (status, json) = send(app, get_req("/api/plan")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["week_start_date"], "2024-06-10");
        assert_eq!(json["daily_targets"]["2024-06-12"], 2264);
    }

    #[tokio::test]
    async fn weight_post_then_history() {
        let app = test_app();

        let req = post_json(
            "/api/weight",
            &serde_json::json!({"date": "2024-06-10", "weight": 181.0}),
        );
        let (status, _) = send(app.clone(), req).await;
        assert_eq!(status, StatusCode::CREATED);

        let req = post_json("/api/weight", &serde_json::json!({"weight": 180.2}));
        let (status, entry) = send(app.clone(), req).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(entry["date"], "2024-06-12");

        let (status, json) = send(app.clone(), get_req("/api/weight?limit=1")).await;
        assert_eq!(status, StatusCode::OK);
        let entries = json.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["weight"], 180.2);

        let req = post_json("/api/weight", &serde_json::json!({"weight": 0.0}));
        let (status, _) = send(app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn week_stats_default_to_current_week() {
        let app = test_app();
        let req = post_json("/api/food", &serde_json::json!({"name": "Pasta", "calories": 1800}));
        send(app.clone(), req).await;

        let (status, json) = send(app.clone(), get_req("/api/stats/week")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["average_intake"], 1800);
        assert_eq!(json["total_deficit"], 200);

        let (status, json) = send(app, get_req("/api/stats/week?date=2024-06-03")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["average_intake"], 0);
    }

    #[tokio::test]
    async fn security_headers_present() {
        let response = test_app().oneshot(get_req("/api/health")).await.unwrap();

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
    async fn security_headers_on_error_response() {
        let response = test_app().oneshot(get_req("/api/logs/bad")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
    }

    #[tokio::test]
    async fn body_size_limit_rejects_oversized() {
        let big_body = vec![b'a'; BODY_LIMIT + 1];
        let response = test_app()
            .oneshot(
                axum::http::Request::post("/api/ai/exercise")
                    .header("content-type", "application/json")
                    .body(Body::from(big_body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn internal_error_does_not_leak_details() {
        let error = ApiError::from(Error::SchemaMismatch {
            found: 9,
            supported: 1,
        });
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal server error");
    }
}
