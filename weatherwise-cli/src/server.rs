//! HTTP backend: the query, insight and intent endpoints the dashboard calls.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use weatherwise_core::{
    ChatCompletion, ClimateSource, Config, PlannerError, WeatherQuery, WeatherQueryResponse,
    chat::default_client_from_config,
    insights::{InsightRequest, InsightResponse, generate_insight},
    intent::{IntentParser, ParsedIntent},
    planner::run_query,
    source_from_config,
};

#[derive(Clone)]
pub struct AppState {
    source: Arc<dyn ClimateSource>,
    /// `None` when no chat provider is configured; AI endpoints then answer 502.
    chat: Option<Arc<dyn ChatCompletion>>,
    /// Provider named in "missing key" errors.
    chat_provider: String,
    demo_mode: bool,
}

impl AppState {
    pub fn new(
        source: Arc<dyn ClimateSource>,
        chat: Option<Arc<dyn ChatCompletion>>,
        demo_mode: bool,
    ) -> Self {
        Self {
            source,
            chat,
            chat_provider: "default".to_string(),
            demo_mode,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let source: Arc<dyn ClimateSource> = Arc::from(source_from_config(config)?);

        let chat: Option<Arc<dyn ChatCompletion>> = match default_client_from_config(config) {
            Ok(client) => {
                tracing::info!(
                    provider = %client.provider(),
                    model = client.model(),
                    "chat provider ready"
                );
                Some(Arc::new(client))
            }
            Err(e) => {
                tracing::warn!("AI endpoints disabled: {:#}", e);
                None
            }
        };

        let mut state = Self::new(source, chat, config.data.demo_mode);
        if let Some(provider) = &config.default_provider {
            state.chat_provider = provider.clone();
        }
        Ok(state)
    }

    fn chat(&self) -> Result<&dyn ChatCompletion, ApiError> {
        self.chat.as_deref().ok_or_else(|| {
            let missing = PlannerError::MissingApiKey {
                provider: self.chat_provider.clone(),
            };
            ApiError(missing.into())
        })
    }
}

/// Maps classified failures to a status; everything else is a 500.
pub struct ApiError(anyhow::Error);

impl<E: Into<anyhow::Error>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.downcast_ref::<PlannerError>() {
            Some(e) if e.is_validation() => StatusCode::BAD_REQUEST,
            Some(PlannerError::LocationNotFound(_)) => StatusCode::NOT_FOUND,
            Some(
                PlannerError::Upstream { .. }
                | PlannerError::EmptyCompletion { .. }
                | PlannerError::MissingApiKey { .. },
            ) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("request failed: {:#}", self.0);
        } else {
            tracing::debug!("request rejected: {:#}", self.0);
        }

        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct IntentBody {
    pub message: String,
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "WeatherWise Planner backend is running." }))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "source": state.source.name(),
        "demo_mode": state.demo_mode,
        "ai_enabled": state.chat.is_some(),
    }))
}

async fn query(
    State(state): State<AppState>,
    Json(payload): Json<WeatherQuery>,
) -> Result<Json<WeatherQueryResponse>, ApiError> {
    let outcome = run_query(state.source.as_ref(), &payload).await?;
    Ok(Json(outcome.response))
}

async fn insights(
    State(state): State<AppState>,
    Json(payload): Json<InsightRequest>,
) -> Result<Json<InsightResponse>, ApiError> {
    let insight = generate_insight(state.chat()?, &payload).await?;
    Ok(Json(insight))
}

async fn intent(
    State(state): State<AppState>,
    Json(body): Json<IntentBody>,
) -> Result<Json<ParsedIntent>, ApiError> {
    let parsed = IntentParser::new(state.chat()?).parse(&body.message).await;
    Ok(Json(parsed))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/query", post(query))
        .route("/insights", post(insights))
        .route("/intent", post(intent))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(config: Config, bind: &str) -> Result<()> {
    let state = AppState::from_config(&config)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;

    tracing::info!("WeatherWise backend listening on http://{}", bind);
    axum::serve(listener, app).await.context("HTTP server error")?;
    Ok(())
}
