//! HTTP surface of the proxy.
//!
//! ## Endpoints
//! - GET /health - Health check
//! - GET /api/latest_blocks?block=N&url=U - Window of recent blocks
//! - GET /api/latest_transactions?page&docs&name&url - Page of the transaction index
//! - POST /api/latest_transactions?name&url - Refresh the transaction index

use super::{latest_blocks_window, refresh_index, IndexOutcome, IndexSettings, BLOCK_WINDOW};
use crate::cluster::{Cluster, ClusterUrls};
use crate::error::{ErrorKind, FetchError};
use crate::retry::RetryPolicy;
use crate::rpc::{ChainRpc, Connector};
use crate::store::TxIndex;
use crate::types::{LatestBlocksResponse, MessageResponse, TransactionsResponse};
use axum::{
    extract::{Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

pub const MAX_DOCS: usize = 100;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub connector: Arc<dyn Connector>,
    pub urls: ClusterUrls,
    pub default_cluster: Cluster,
    pub index: TxIndex,
    pub batch_size: usize,
    pub retry: RetryPolicy,
    pub index_settings: IndexSettings,
}

#[derive(Debug, Default, Deserialize)]
pub struct BlocksQuery {
    block: Option<u64>,
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionsQuery {
    page: Option<usize>,
    docs: Option<usize>,
    name: Option<String>,
    url: Option<String>,
}

pub struct ApiError(FetchError);

impl From<FetchError> for ApiError {
    fn from(e: FetchError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::Invalid => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_GATEWAY,
        };
        if status == StatusCode::BAD_GATEWAY {
            log::error!("request failed: {}", self.0);
        } else {
            log::debug!("request rejected ({status}): {}", self.0);
        }
        let body = serde_json::json!({ "error": self.0.to_string(), "kind": self.0.kind() });
        (status, Json(body)).into_response()
    }
}

impl AppState {
    /// Node for an explicit `url`, else the one behind `name` (or the
    /// default cluster).
    fn rpc_for(&self, name: Option<&str>, url: Option<&str>) -> Result<Arc<dyn ChainRpc>, ApiError> {
        let url = match url {
            Some(u) => u.to_string(),
            None => {
                let cluster = match name {
                    Some(n) => n
                        .parse::<Cluster>()
                        .map_err(|e| FetchError::invalid(e.to_string()))?,
                    None => self.default_cluster,
                };
                if cluster == Cluster::Custom {
                    return Err(FetchError::invalid("custom cluster requires url").into());
                }
                self.urls.url_for(cluster, "")
            }
        };
        check_url(&url)?;
        Ok(self.connector.connect(&url))
    }

    fn network(&self, name: Option<&str>) -> Result<String, ApiError> {
        match name {
            Some(n) => Ok(n
                .parse::<Cluster>()
                .map_err(|e| FetchError::invalid(e.to_string()))?
                .name()
                .to_string()),
            None => Ok(self.default_cluster.name().to_string()),
        }
    }
}

fn check_url(raw: &str) -> Result<(), ApiError> {
    let parsed = url::Url::parse(raw).map_err(|e| FetchError::invalid(format!("invalid url {raw}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(FetchError::invalid(format!("unsupported url scheme {}", parsed.scheme())).into());
    }
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/latest_blocks", get(latest_blocks_handler))
        .route(
            "/api/latest_transactions",
            get(latest_transactions_handler).post(refresh_transactions_handler),
        )
        .layer(cors)
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn latest_blocks_handler(
    State(state): State<AppState>,
    Query(q): Query<BlocksQuery>,
) -> Result<Json<LatestBlocksResponse>, ApiError> {
    let rpc = state.rpc_for(None, q.url.as_deref())?;
    let res = latest_blocks_window(rpc.as_ref(), q.block, BLOCK_WINDOW, state.batch_size, state.retry).await?;
    Ok(Json(res))
}

async fn latest_transactions_handler(
    State(state): State<AppState>,
    Query(q): Query<TransactionsQuery>,
) -> Result<Json<TransactionsResponse>, ApiError> {
    let network = state.network(q.name.as_deref())?;
    let docs = q.docs.unwrap_or(25).clamp(1, MAX_DOCS);
    let skip = q.page.unwrap_or(0).saturating_mul(docs);
    let transaction_response = state.index.page(&network, skip, docs).await?;
    Ok(Json(TransactionsResponse { transaction_response }))
}

async fn refresh_transactions_handler(
    State(state): State<AppState>,
    Query(q): Query<TransactionsQuery>,
) -> Result<Response, ApiError> {
    let network = state.network(q.name.as_deref())?;
    let rpc = state.rpc_for(q.name.as_deref(), q.url.as_deref())?;
    // Own task so a disconnecting client does not abort the refresh halfway
    let index = state.index.clone();
    let settings = state.index_settings;
    let task = tokio::spawn(async move { refresh_index(rpc.as_ref(), &index, &network, settings).await });
    let outcome = task
        .await
        .map_err(|e| FetchError::Transport(format!("index refresh task: {e}")))??;
    match outcome {
        IndexOutcome::Updated { .. } => Ok(Json(MessageResponse {
            message: "updated".into(),
        })
        .into_response()),
        IndexOutcome::Busy => Ok((
            StatusCode::CONFLICT,
            Json(MessageResponse {
                message: "update in progress".into(),
            }),
        )
            .into_response()),
    }
}
