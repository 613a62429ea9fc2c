use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Settings;
use crate::db::{create_pool, get_all_matches, get_recent_predictions, get_team_names, init_database, insert_prediction};
use crate::error::PipelineError;
use crate::models::{ApiResponse, Prediction, TeamForm};
use crate::services::data_cleaner::parse_match_date;
use crate::services::{compute_form, MatchPrediction, PredictionEngine, SoftmaxClassifier};
use crate::utils::{resolve_team, results_to_form, suggest_teams};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub settings: Settings,
    /// `None` until a model has been trained; prediction requests get 503.
    pub engine: Option<Arc<PredictionEngine>>,
}

type ApiError = (StatusCode, Json<ApiResponse<()>>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ApiResponse::error(message.into())))
}

fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::InvalidDate(_) | PipelineError::InvalidTeam(_) | PipelineError::SameTeam(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn internal(context: &str, err: PipelineError) -> ApiError {
    tracing::error!("{}: {}", context, err);
    api_error(status_for(&err), err.to_string())
}

fn load_engine(settings: &Settings) -> Option<Arc<PredictionEngine>> {
    let path = settings.model_file();
    let engine = SoftmaxClassifier::load(&path).and_then(|model| PredictionEngine::new(model, settings.rolling_window));
    match engine {
        Ok(engine) => {
            tracing::info!("Loaded model {} from {}", engine.model().model_version, path.display());
            Some(Arc::new(engine))
        }
        Err(e) => {
            tracing::warn!("Predictions disabled, no usable model at {}: {}", path.display(), e);
            None
        }
    }
}

pub async fn serve(settings: Settings, port: u16) -> anyhow::Result<()> {
    let pool = create_pool(&settings.database_url).await?;
    init_database(&pool).await?;

    let engine = load_engine(&settings);
    let app = create_router().with_state(AppState { pool, settings, engine });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!("EPL predictor API server listening on port {}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/teams", get(list_teams_handler))
        .route("/teams/{name}/form", get(team_form_handler))
        .route("/predict", post(predict_handler))
        .route("/predictions/recent", get(recent_predictions_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

// Health check endpoint
async fn health_check() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("EPL predictor API is running"))
}

// GET /teams - Every team in the stored history
async fn list_teams_handler(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<String>>>, ApiError> {
    match get_team_names(&state.pool).await {
        Ok(teams) => Ok(Json(ApiResponse::success(teams))),
        Err(e) => Err(internal("Failed to fetch teams", e)),
    }
}

// GET /teams/{name}/form - Rolling form before a reference date
#[derive(Deserialize)]
struct FormQuery {
    date: Option<String>,
}

#[derive(Serialize)]
struct TeamFormResponse {
    team: String,
    reference_date: NaiveDateTime,
    window: usize,
    form: TeamForm,
    recent_results: String,
}

async fn team_form_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<FormQuery>,
) -> Result<Json<ApiResponse<TeamFormResponse>>, ApiError> {
    let reference = match params.date.as_deref() {
        Some(raw) => parse_match_date(raw).map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?,
        None => Utc::now().naive_utc(),
    };

    let teams = get_team_names(&state.pool)
        .await
        .map_err(|e| internal("Failed to fetch teams", e))?;
    let Some(team) = resolve_team(&name, &teams) else {
        let suggestions = suggest_teams(&name, &teams, 3);
        let message = if suggestions.is_empty() {
            format!("No team found matching '{}'", name)
        } else {
            format!("No team found matching '{}'. Did you mean: {}?", name, suggestions.join(", "))
        };
        return Err(api_error(StatusCode::NOT_FOUND, message));
    };

    let history = get_all_matches(&state.pool)
        .await
        .map_err(|e| internal("Failed to load match history", e))?;
    let window = state.settings.rolling_window;

    Ok(Json(ApiResponse::success(TeamFormResponse {
        team: team.clone(),
        reference_date: reference,
        window,
        form: compute_form(&history, team, reference, window),
        recent_results: results_to_form(team, &history, reference, window),
    })))
}

// POST /predict - Outcome probabilities for one fixture
#[derive(Deserialize)]
struct PredictRequest {
    home_team: String,
    away_team: String,
    match_date: String,
}

async fn predict_handler(
    State(state): State<AppState>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<ApiResponse<MatchPrediction>>, ApiError> {
    let Some(engine) = state.engine.as_ref() else {
        return Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "No trained model loaded; run the train command and restart the server",
        ));
    };

    let match_date =
        parse_match_date(&request.match_date).map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    let history = get_all_matches(&state.pool)
        .await
        .map_err(|e| internal("Failed to load match history", e))?;
    let teams = get_team_names(&state.pool)
        .await
        .map_err(|e| internal("Failed to fetch teams", e))?;
    let home = resolve_team(&request.home_team, &teams).map(String::as_str).unwrap_or(&request.home_team);
    let away = resolve_team(&request.away_team, &teams).map(String::as_str).unwrap_or(&request.away_team);

    let result = engine
        .predict_match(home, away, match_date, &history)
        .map_err(|e| internal("Failed to predict match", e))?;

    insert_prediction(&state.pool, &result.prediction)
        .await
        .map_err(|e| internal("Failed to store prediction", e))?;

    Ok(Json(ApiResponse::success(result)))
}

// GET /predictions/recent - Latest stored predictions
#[derive(Deserialize)]
struct RecentQuery {
    limit: Option<i64>,
}

async fn recent_predictions_handler(
    State(state): State<AppState>,
    Query(params): Query<RecentQuery>,
) -> Result<Json<ApiResponse<Vec<Prediction>>>, ApiError> {
    let limit = params.limit.unwrap_or(20).clamp(1, 100); // Cap at 100

    match get_recent_predictions(&state.pool, limit).await {
        Ok(predictions) => Ok(Json(ApiResponse::success(predictions))),
        Err(e) => Err(internal("Failed to fetch recent predictions", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::replace_matches;
    use crate::services::classifier::TrainingConfig;
    use crate::services::{sample_data, FeatureBuilder};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use sqlx::sqlite::SqlitePoolOptions;
    use tower::ServiceExt;

    async fn test_state(with_model: bool) -> AppState {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_database(&pool).await.unwrap();

        let history = sample_data::generate(200, 7).unwrap();
        replace_matches(&pool, &history).await.unwrap();

        let settings = Settings::default();
        let engine = with_model.then(|| {
            let matrix = FeatureBuilder::new(settings.rolling_window)
                .build_feature_matrix(&history)
                .unwrap();
            let config = TrainingConfig { max_iterations: 50, ..Default::default() };
            let model = SoftmaxClassifier::fit(&matrix, settings.rolling_window, &config).unwrap();
            Arc::new(PredictionEngine::new(model, settings.rolling_window).unwrap())
        });

        AppState { pool, settings, engine }
    }

    async fn send(state: AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = create_router().with_state(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_and_teams() {
        let state = test_state(false).await;

        let (status, body) = send(state.clone(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (status, body) = send(state, get("/teams")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_team_form() {
        let state = test_state(false).await;

        let (status, body) = send(state.clone(), get("/teams/arsenal/form?date=2021-06-01")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["team"], "Arsenal");
        assert_eq!(body["data"]["window"], 5);

        let (status, _) = send(state.clone(), get("/teams/Arsenal/form?date=yesterday")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(state, get("/teams/Nowhere%20FC/form")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_predict_without_model_is_unavailable() {
        let state = test_state(false).await;
        let request = serde_json::json!({"home_team": "Arsenal", "away_team": "Chelsea", "match_date": "2024-01-01"});

        let (status, _) = send(state, post_json("/predict", request)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_predict_and_list_recent() {
        let state = test_state(true).await;
        let request = serde_json::json!({"home_team": "Arsenal", "away_team": "Chelsea", "match_date": "2024-01-01"});

        let (status, body) = send(state.clone(), post_json("/predict", request)).await;
        assert_eq!(status, StatusCode::OK);
        let p = &body["data"]["probabilities"];
        let total = p["home_win"].as_f64().unwrap() + p["draw"].as_f64().unwrap() + p["away_win"].as_f64().unwrap();
        assert!((total - 1.0).abs() < 0.01);

        let (status, body) = send(state, get("/predictions/recent")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_predict_rejects_bad_input() {
        let state = test_state(true).await;

        let same = serde_json::json!({"home_team": "Arsenal", "away_team": "Arsenal", "match_date": "2024-01-01"});
        let (status, _) = send(state.clone(), post_json("/predict", same)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let bad_date = serde_json::json!({"home_team": "Arsenal", "away_team": "Chelsea", "match_date": "soon"});
        let (status, _) = send(state, post_json("/predict", bad_date)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
