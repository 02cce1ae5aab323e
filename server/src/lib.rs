use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::{self, Next};
use axum::response::{Html, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use places_core::auth::{Claims, TokenAuthority};
use places_core::cancel::CancelToken;
use places_core::config::BulkConfig;
use places_core::descriptor::IndexDescriptor;
use places_core::indexing::{Indexer, IndexingReport};
use places_core::query::{PageResult, QueryService, Recommendation};
use places_core::source::read_places;
use places_core::store::DocumentStore;
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod html;

use error::{ApiError, PageError};

#[derive(Deserialize)]
pub struct PageParams {
    pub page: Option<String>,
}

#[derive(Deserialize)]
pub struct RecommendParams {
    #[serde(default)]
    pub lat: String,
    #[serde(default)]
    pub lon: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Verified token claims, attached to the request by the auth middleware.
#[derive(Debug, Clone)]
pub struct TokenClaims(pub Claims);

#[derive(Clone)]
pub struct AppState {
    pub queries: QueryService,
    pub auth: Arc<TokenAuthority>,
}

pub fn build_app(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let protected = Router::new()
        .route("/api/recommend", get(api_recommend))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/web/places", get(web_places))
        .route("/web/recommend", get(web_recommend))
        .route("/api/places", get(api_places))
        .route("/api/get_token", get(get_token))
        .merge(protected)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Re-indexes `path` in the background; requests are served meanwhile and may see the index mid-reset.
///
/// The task logs its report and hands it back, so shutdown can wait for a
/// cancelled run to account for what it dropped.
pub fn spawn_startup_indexing(
    store: Arc<dyn DocumentStore>,
    descriptor: IndexDescriptor,
    path: String,
    bulk: BulkConfig,
    cancel: CancelToken,
) -> JoinHandle<Option<IndexingReport>> {
    tokio::spawn(async move {
        let records = match read_places(&path) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(path = %path, error = %e, "cannot read places");
                return None;
            }
        };
        match Indexer::new(store, bulk).run(&descriptor, &records, cancel).await {
            Ok(report) => {
                tracing::info!(
                    outcome = ?report.outcome,
                    flushed = report.flushed,
                    failed = report.failed,
                    discarded = report.discarded,
                    "start-up indexing finished: {report}"
                );
                Some(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "start-up indexing failed");
                None
            }
        }
    })
}

fn parse_page(raw: Option<&str>) -> Result<i64, ApiError> {
    let raw = raw.unwrap_or("");
    raw.trim().parse().map_err(|_| ApiError::BadRequest(format!("invalid 'page' value: '{raw}'")))
}

async fn list_page(state: &AppState, params: &PageParams) -> Result<PageResult, ApiError> {
    let page = parse_page(params.page.as_deref())?;
    Ok(state.queries.list_places(page, state.queries.page_size()).await?)
}

async fn recommend(state: &AppState, params: &RecommendParams) -> Result<Recommendation, ApiError> {
    Ok(state.queries.nearest_places(&params.lat, &params.lon, state.queries.recommend_limit()).await?)
}

pub async fn web_places(State(state): State<AppState>, Query(params): Query<PageParams>) -> Result<Html<String>, PageError> {
    let data = list_page(&state, &params).await?;
    Ok(Html(html::places_page(&data)))
}

pub async fn web_recommend(State(state): State<AppState>, Query(params): Query<RecommendParams>) -> Result<Html<String>, PageError> {
    let data = recommend(&state, &params).await?;
    Ok(Html(html::recommendation_page(&data)))
}

pub async fn api_places(State(state): State<AppState>, Query(params): Query<PageParams>) -> Result<Json<PageResult>, ApiError> {
    Ok(Json(list_page(&state, &params).await?))
}

pub async fn get_token(State(state): State<AppState>) -> Result<Json<TokenResponse>, ApiError> {
    let token = state.auth.issue_token()?;
    Ok(Json(TokenResponse { token }))
}

pub async fn api_recommend(
    State(state): State<AppState>,
    Extension(claims): Extension<TokenClaims>,
    Query(params): Query<RecommendParams>,
) -> Result<Json<Recommendation>, ApiError> {
    tracing::debug!(jti = ?claims.0.get("jti"), "authorized recommendation request");
    Ok(Json(recommend(&state, &params).await?))
}

async fn require_token(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    let header = req.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok()).unwrap_or("");
    let claims = state.auth.verify_token(header)?;
    req.extensions_mut().insert(TokenClaims(claims));
    Ok(next.run(req).await)
}
