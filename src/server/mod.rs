//! HTTP 백엔드 (axum)
//!
//! - `GET /health`
//! - `GET /lenders`
//! - `POST /search`
//! - `POST /chat`
//!
//! 저장소와 API 클라이언트는 시작 시 한 번 만들고 모든 요청이 공유합니다.

pub mod error;
pub mod handlers;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::knowledge::VectorStore;
use crate::lender::{LenderCatalog, LenderNameNormalizer};
use crate::rag::CriteriaAssistant;
use crate::services;

pub use error::ApiError;

/// 공유 애플리케이션 상태
pub struct AppState {
    /// API 키가 없으면 None (`/search`, `/chat`은 503)
    pub assistant: Option<CriteriaAssistant>,
    pub store: Arc<dyn VectorStore>,
    pub catalog: Option<LenderCatalog>,
    pub normalizer: LenderNameNormalizer,
    pub default_top_k: usize,
}

impl AppState {
    /// 설정에서 상태 구성
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let store = services::open_vector_store(config).await?;

        let assistant = if config.openai.has_api_key() {
            let (embedder, chat) = services::openai_providers(config)?;
            Some(services::build_assistant(config, embedder, chat, store.clone()))
        } else {
            tracing::warn!("OpenAI API key missing; /search and /chat are disabled");
            None
        };

        let catalog = match services::load_catalog(config) {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::warn!("Ignoring lender catalog: {:#}", e);
                None
            }
        };

        Ok(Self {
            assistant,
            store,
            catalog,
            normalizer: config.normalizer(),
            default_top_k: config.retrieval.top_k,
        })
    }
}

/// 라우터 생성
pub fn router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/lenders", get(handlers::lenders))
        .route("/search", post(handlers::search))
        .route("/chat", post(handlers::chat))
        .with_state(state)
        .layer(build_cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .map(|o| o.trim())
        .filter(|o| !o.is_empty())
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
}

/// 서버 실행 (종료될 때까지 블록)
pub async fn serve(config: &AppConfig) -> Result<()> {
    let state = Arc::new(AppState::from_config(config).await?);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    tracing::info!("Listening on http://{}", addr);

    let app = router(state, &config.server.cors_origins);
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::knowledge::InMemoryVectorStore;
    use crate::rag::{DEFAULT_TOP_K, NO_RESULTS_MESSAGE};
    use crate::testing::{sample_corpus, FakeChat, HashEmbedding};

    const CATALOG: &str = r#"{
        "lender_categories": {
            "major_banks": ["barclays_residential.txt", "hsbc_residential_1.txt"],
            "building_societies": ["nationwide_building_society_residential.txt"]
        }
    }"#;

    fn state_with(store: Arc<InMemoryVectorStore>, with_assistant: bool) -> Arc<AppState> {
        let config = AppConfig::default();
        let assistant = with_assistant.then(|| {
            services::build_assistant(
                &config,
                Arc::new(HashEmbedding::default()),
                Arc::new(FakeChat::replying("🏦 Barclays: max age 75")),
                store.clone(),
            )
        });

        Arc::new(AppState {
            assistant,
            store,
            catalog: LenderCatalog::from_json(CATALOG).ok(),
            normalizer: LenderNameNormalizer::default(),
            default_top_k: DEFAULT_TOP_K,
        })
    }

    fn app(with_assistant: bool) -> Router {
        let store = Arc::new(InMemoryVectorStore::with_records(sample_corpus()));
        router(state_with(store, with_assistant), &["http://localhost:3000".to_string()])
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(app(true), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["database_available"], true);
        assert_eq!(body["openai_configured"], true);

        let (_, body) = send(app(false), "GET", "/health", None).await;
        assert_eq!(body["openai_configured"], false);
    }

    #[tokio::test]
    async fn test_lenders() {
        let (status, body) = send(app(true), "GET", "/lenders", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["indexed_lenders"],
            json!(["Barclays", "HSBC", "Nationwide"])
        );
        assert!(body["lender_categories"]["major_banks"].is_array());
        assert_eq!(
            body["display_names"],
            json!(["Barclays", "HSBC", "Nationwide"])
        );
    }

    #[tokio::test]
    async fn test_search_with_filter() {
        let (status, body) = send(
            app(true),
            "POST",
            "/search",
            Some(json!({"query": "LTV limits", "lender_filter": "Barclays", "num_results": 5})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let results = body.as_array().unwrap();
        assert_eq!(results.len(), 2);
        for result in results {
            assert_eq!(result["metadata"]["lender_name"], "Barclays");
            assert!(result["score"].is_number());
            assert!(result.get("vector").is_none());
        }
    }

    #[tokio::test]
    async fn test_search_empty_filter_means_all_lenders() {
        let (status, body) = send(
            app(true),
            "POST",
            "/search",
            Some(json!({"query": "maximum age", "lender_filter": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_search_invalid_request() {
        let (status, body) = send(
            app(true),
            "POST",
            "/search",
            Some(json!({"query": "   "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("invalid retrieval request"));
    }

    #[tokio::test]
    async fn test_search_without_api_key() {
        let (status, body) = send(
            app(false),
            "POST",
            "/search",
            Some(json!({"query": "LTV"})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_chat() {
        let (status, body) = send(
            app(true),
            "POST",
            "/chat",
            Some(json!({
                "messages": [
                    {"role": "user", "content": "hello"},
                    {"role": "assistant", "content": "Hi, ask about criteria."}
                ],
                "query": "maximum age for mortgage applications"
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "🏦 Barclays: max age 75");
        assert!(!body["search_results"].as_array().unwrap().is_empty());
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn test_chat_empty_index() {
        let store = Arc::new(InMemoryVectorStore::new());
        let app = router(state_with(store, true), &[]);

        let (status, body) = send(app, "POST", "/chat", Some(json!({"query": "LTV limits"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], NO_RESULTS_MESSAGE);
        assert_eq!(body["search_results"], json!([]));
    }
}
