//! HTTP surface of the node.
//!
//! | Method | Path                     | Description                             |
//! |--------|--------------------------|-----------------------------------------|
//! | GET    | `/health`, `/healthz`    | Liveness probe                          |
//! | GET    | `/chain/head`            | Height and hash of the chain head       |
//! | GET    | `/api/blockchain`        | Every block in index order              |
//! | POST   | `/api/blockchain/add`    | Mine and append a block for the payload |
//! | GET    | `/api/blockchain/verify` | Run the integrity checker               |

use crate::worker::{MiningPool, PoolError};
use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ledger_core::{
    chain::{Chain, ChainStore},
    verify::Violation,
    Block, LedgerError,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::{self, JoinError};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, warn};

pub struct AppState<S: ChainStore> {
    pub chain: Chain<S>,
    pub pool: Arc<MiningPool>,
}

impl<S: ChainStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            pool: self.pool.clone(),
        }
    }
}

impl<S: ChainStore> AppState<S> {
    pub fn new(chain: Chain<S>, pool: Arc<MiningPool>) -> Self {
        Self { chain, pool }
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Serialize)]
struct Head {
    height: u64,
    hash: String,
}

#[derive(Serialize)]
struct Verification {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    violations: Vec<Violation>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("background task failed: {0}")]
    Join(#[from] JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Ledger(LedgerError::InvalidPayload(_)) => StatusCode::BAD_REQUEST,
            ApiError::Ledger(LedgerError::AppendConflict { .. })
            | ApiError::Ledger(LedgerError::IntegrityViolation(_)) => StatusCode::CONFLICT,
            ApiError::Ledger(LedgerError::Cancelled) | ApiError::Pool(PoolError::Closed) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Pool(PoolError::DeadlineExceeded(_)) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            warn!(error = %self, "request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router<S: ChainStore + 'static>(state: AppState<S>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/chain/head", get(head::<S>))
        .route("/api/blockchain", get(fetch_chain::<S>))
        .route("/api/blockchain/add", post(append_block::<S>))
        .route("/api/blockchain/verify", get(verify_chain::<S>))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn head<S: ChainStore + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Json<Head>, ApiError> {
    let chain = state.chain.clone();
    let head = task::spawn_blocking(move || chain.head()).await??;
    Ok(Json(Head {
        height: head.index,
        hash: head.hash,
    }))
}

async fn fetch_chain<S: ChainStore + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Json<Vec<Block>>, ApiError> {
    let chain = state.chain.clone();
    let blocks = task::spawn_blocking(move || chain.fetch_chain()).await??;
    Ok(Json(blocks))
}

async fn append_block<S: ChainStore + 'static>(
    State(state): State<AppState<S>>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<Block>), ApiError> {
    let chain = state.chain.clone();
    let block = state
        .pool
        .run(move |cancel| chain.append_cancellable(payload, cancel))
        .await??;
    Ok((StatusCode::CREATED, Json(block)))
}

async fn verify_chain<S: ChainStore + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Response, ApiError> {
    let chain = state.chain.clone();
    let response = match task::spawn_blocking(move || chain.verify()).await? {
        Ok(height) => (
            StatusCode::OK,
            Json(Verification {
                valid: true,
                height: Some(height),
                violations: Vec::new(),
            }),
        )
            .into_response(),
        Err(LedgerError::IntegrityViolation(report)) => (
            StatusCode::CONFLICT,
            Json(Verification {
                valid: false,
                height: None,
                violations: report.into_violations(),
            }),
        )
            .into_response(),
        Err(err) => return Err(err.into()),
    };
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use ledger_core::{
        chain::StoreError, constants::DIFFICULTY_PREFIX, memory::MemoryStore, ChainConfig,
    };
    use std::time::Duration;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let chain = Chain::new(store.clone());
        let pool = MiningPool::new(2, 8, None).unwrap();
        (router(AppState::new(chain, Arc::new(pool))), store)
    }

    /// Accepts genesis, then loses every later append to an imaginary writer.
    struct ContestedStore(MemoryStore);

    impl ChainStore for ContestedStore {
        fn append(&self, block: &Block) -> Result<(), StoreError> {
            if block.index > 0 {
                return Err(StoreError::Conflict { index: block.index });
            }
            self.0.append(block)
        }

        fn get_block(&self, index: u64) -> Result<Option<Block>, StoreError> {
            self.0.get_block(index)
        }

        fn head(&self) -> Result<Option<Block>, StoreError> {
            self.0.head()
        }

        fn blocks(&self) -> Result<Vec<Block>, StoreError> {
            self.0.blocks()
        }

        fn close(&self) -> Result<(), StoreError> {
            self.0.close()
        }
    }

    fn contested_app(max_append_retries: u32, deadline: Option<Duration>) -> Router {
        let chain = Chain::with_config(
            Arc::new(ContestedStore(MemoryStore::new())),
            ChainConfig {
                max_append_retries,
                ..ChainConfig::default()
            },
        );
        let pool = MiningPool::new(1, 2, deadline).unwrap();
        router(AppState::new(chain, Arc::new(pool)))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (app, _) = app();
        let (status, body) = send(&app, get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn empty_chain_returns_genesis() {
        let (app, _) = app();
        let (status, body) = send(&app, get_req("/api/blockchain")).await;
        assert_eq!(status, StatusCode::OK);
        let blocks = body.as_array().unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0]["index"], json!(0));
        assert_eq!(blocks[0]["previousHash"], json!("0"));
    }

    #[tokio::test]
    async fn add_returns_created_block() {
        let (app, _) = app();
        let (_, chain) = send(&app, get_req("/api/blockchain")).await;
        let genesis_hash = chain[0]["hash"].clone();

        let (status, block) =
            send(&app, post_json("/api/blockchain/add", r#"{"amount":5}"#)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(block["index"], json!(1));
        assert_eq!(block["previousHash"], genesis_hash);
        assert_eq!(block["data"]["amount"], json!(5));
        assert!(block["data"]["ticketId"]
            .as_str()
            .unwrap()
            .starts_with("TKT-1-"));
        assert!(block["hash"]
            .as_str()
            .unwrap()
            .starts_with(DIFFICULTY_PREFIX));

        let (_, head) = send(&app, get_req("/chain/head")).await;
        assert_eq!(head, json!({"height": 1, "hash": block["hash"]}));
    }

    #[tokio::test]
    async fn non_object_payload_is_bad_request() {
        let (app, store) = app();
        let (status, body) = send(&app, post_json("/api/blockchain/add", "[1,2]")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("invalid payload"));
        assert!(store.blocks().unwrap().is_empty());
    }

    #[tokio::test]
    async fn verify_reports_valid_and_tampered_chains() {
        let (app, store) = app();
        send(&app, post_json("/api/blockchain/add", r#"{"amount":1}"#)).await;
        let (status, body) = send(&app, get_req("/api/blockchain/verify")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"valid": true, "height": 1}));

        let mut forged = store.head().unwrap().unwrap();
        forged.index = 2;
        forged.hash = format!("000{}", "e".repeat(61));
        store.append(&forged).unwrap();

        let (status, body) = send(&app, get_req("/api/blockchain/verify")).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["valid"], json!(false));
        assert!(!body["violations"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fresh_ledger_verifies_at_genesis() {
        let (app, store) = app();
        let (status, body) = send(&app, get_req("/api/blockchain/verify")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"valid": true, "height": 0}));
        assert_eq!(store.blocks().unwrap().len(), 1);

        let (_, head) = send(&app, get_req("/chain/head")).await;
        assert_eq!(head["height"], body["height"]);
    }

    #[tokio::test]
    async fn exhausted_retries_are_conflict() {
        let app = contested_app(2, None);
        let (status, body) =
            send(&app, post_json("/api/blockchain/add", r#"{"amount":5}"#)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("lost 3"));
    }

    #[tokio::test]
    async fn mining_deadline_is_gateway_timeout() {
        let app = contested_app(u32::MAX, Some(Duration::from_millis(20)));
        let (status, body) =
            send(&app, post_json("/api/blockchain/add", r#"{"amount":5}"#)).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn closed_pool_is_service_unavailable() {
        let store = Arc::new(MemoryStore::new());
        let pool = Arc::new(MiningPool::new(1, 2, None).unwrap());
        let app = router(AppState::new(Chain::new(store.clone()), pool.clone()));
        pool.close();
        let (status, _) =
            send(&app, post_json("/api/blockchain/add", r#"{"amount":5}"#)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(store.blocks().unwrap().is_empty());
    }
}
