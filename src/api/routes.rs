use axum::{
    Json, Router,
    extract::{FromRequest, Query, Request, State},
    response::IntoResponse,
    routing::{get, post},
};
use serde::de::DeserializeOwned;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::api::models::{
    AdminQuery, DailyQuery, SummarizeRequest, TranslateRequest, TranslateResponse, UsageDashboard,
    requested_translation,
};
use crate::error::{AppError, Result};
use crate::summary::GenerationResult;

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/api/summarize", post(summarize_handler))
        .route("/api/daily-summary", get(daily_summary_handler))
        .route("/api/translate", post(translate_handler))
        .route("/api/admin/usage", get(usage_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Json extractor that reports body problems through our own error shape
/// instead of axum's default 422 plain-text rejection.
pub struct AppJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => Err(AppError::InvalidInput(rejection.body_text())),
        }
    }
}

async fn root_handler() -> &'static str {
    "Bible AI Server Running"
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn summarize_handler(
    State(state): State<AppState>,
    AppJson(req): AppJson<SummarizeRequest>,
) -> Result<Json<GenerationResult>> {
    let chapter = req
        .chapter
        .resolve()
        .filter(|_| !req.book.trim().is_empty())
        .ok_or_else(|| AppError::InvalidInput("Invalid book or chapter".to_string()))?;

    let translation =
        requested_translation(req.translation.as_deref(), &state.config.default_translation);

    let summary = state
        .service
        .chapter_summary(&req.book, chapter, &translation)
        .await?;

    Ok(Json(summary.as_ref().clone()))
}

async fn daily_summary_handler(
    State(state): State<AppState>,
    Query(query): Query<DailyQuery>,
) -> Result<Json<GenerationResult>> {
    let translation =
        requested_translation(query.translation.as_deref(), &state.config.default_translation);
    let force = matches!(query.force.as_deref(), Some("true"));

    let summary = state.service.daily_summary(&translation, force).await?;

    Ok(Json(summary.as_ref().clone()))
}

async fn translate_handler(
    State(state): State<AppState>,
    AppJson(req): AppJson<TranslateRequest>,
) -> Result<Json<TranslateResponse>> {
    if req.text.trim().is_empty() || req.target_lang.trim().is_empty() {
        return Err(AppError::InvalidInput(
            "Missing text or targetLang".to_string(),
        ));
    }

    let translated = state
        .service
        .translate_text(&req.text, &req.target_lang)
        .await?;

    Ok(Json(TranslateResponse {
        translated_text: translated,
    }))
}

async fn usage_handler(
    State(state): State<AppState>,
    Query(query): Query<AdminQuery>,
) -> Result<Json<UsageDashboard>> {
    let expected = state
        .config
        .admin_key
        .as_deref()
        .filter(|key| !key.is_empty());
    if expected.is_none() || query.key.as_deref() != expected {
        return Err(AppError::Forbidden);
    }

    let usage = state
        .service
        .usage()
        .await
        .map_err(|err| AppError::Internal(err.to_string()))?;

    let monthly_token_budget = state.config.monthly_token_budget;
    let remaining_tokens = monthly_token_budget.saturating_sub(usage.total_tokens());

    Ok(Json(UsageDashboard {
        usage,
        monthly_token_budget,
        remaining_tokens,
    }))
}
