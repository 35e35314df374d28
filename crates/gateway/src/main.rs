//! ResearchGraph API Gateway
//!
//! The main entry point for all external API requests.
//! Handles:
//! - Paper chat with answer caching
//! - Citation graph fetch and expansion
//! - Topic discovery
//! - Rate limiting and observability (logging, metrics)

mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use researchgraph_common::{
    config::{AppConfig, ObservabilityConfig},
    db::{AnswerCache, ChunkIndex, DbPool, PaperStore, Repository},
    embeddings::{create_embedder, Embedder},
    llm::{create_chat_model, ChatModel, GenerationParams},
    metrics,
};
use researchgraph_context::{
    AnswerGenerator, ArxivClient, ChatService, LiteratureSearch, ReadingPathPlanner,
};
use researchgraph_search::CitationGraphRepository;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::{limit::ConcurrencyLimitLayer, ServiceBuilder};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub papers: Arc<dyn PaperStore>,
    pub chat: Arc<ChatService>,
    pub graph: Arc<CitationGraphRepository>,
    pub discovery: Arc<ReadingPathPlanner>,
}

impl AppState {
    /// Wire the services over one store backing papers, chunks and the answer cache
    pub fn new<S>(
        config: Arc<AppConfig>,
        store: Arc<S>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn ChatModel>,
        search: Arc<dyn LiteratureSearch>,
    ) -> Self
    where
        S: PaperStore + AnswerCache + ChunkIndex + 'static,
    {
        let generator = AnswerGenerator::new(
            model.clone(),
            GenerationParams::from_config(&config.llm),
            config.retrieval.max_context_chars,
        );

        let chat = ChatService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            embedder,
            generator,
            config.retrieval.top_k,
            config.retrieval.min_similarity,
        );

        let discovery = ReadingPathPlanner::new(search, model, store.clone(), &config.discovery);

        Self {
            chat: Arc::new(chat),
            graph: Arc::new(CitationGraphRepository::new(store.clone())),
            discovery: Arc::new(discovery),
            papers: store,
            config,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load().context("Failed to load configuration")?);

    init_tracing(&config.observability);
    info!("Starting ResearchGraph API Gateway v{}", researchgraph_common::VERSION);

    // Initialize metrics
    if config.observability.metrics_port > 0 {
        install_metrics_exporter(config.observability.metrics_port)?;
    }
    metrics::register_metrics();

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    if config.database.run_migrations {
        db.migrate().await?;
    }
    let repo = Arc::new(Repository::new(db, config.embedding.dimension));

    // Model and literature clients
    let embedder = create_embedder(&config.embedding)?;
    let model = create_chat_model(&config.llm)?;
    let search = Arc::new(ArxivClient::new(&config.discovery)?);
    info!(
        embedding_model = embedder.model_name(),
        chat_model = model.model_name(),
        "Model clients ready"
    );

    let state = AppState::new(config.clone(), repo, embedder, model, search);

    // Build the router
    let app = create_router(state)?;

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Serve Prometheus metrics on their own port
fn install_metrics_exporter(port: u16) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .set_buckets_for_metric(
            Matcher::Suffix("request_duration_seconds".to_string()),
            metrics::LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Suffix("embedding_duration_seconds".to_string()),
            metrics::MODEL_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Suffix("generation_duration_seconds".to_string()),
            metrics::MODEL_BUCKETS,
        )?
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!(port, "Metrics exporter listening");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> anyhow::Result<Router> {
    let config = state.config.clone();

    // CORS configuration
    let origins: Vec<HeaderValue> = config
        .allowed_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Paper chat
        .route("/chat", post(handlers::chat::chat))

        // Citation graph
        .route("/graph/expand", post(handlers::graph::expand_graph))
        .route("/graph/{paper_id}", get(handlers::graph::get_graph))

        // Topic discovery
        .route("/discover", post(handlers::discover::discover))

        .route_layer(axum::middleware::from_fn(middleware::track_requests))
        .with_state(state);

    if config.rate_limit.enabled {
        let limiter = middleware::RateLimitState::new(&config.rate_limit)?;
        app = app.layer(axum::middleware::from_fn_with_state(limiter, middleware::rate_limit));
    }

    Ok(app.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(cors)
            .layer(TimeoutLayer::new(config.request_timeout()))
            .layer(ConcurrencyLimitLayer::new(config.server.max_concurrent_requests)),
    ))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use researchgraph_common::db::models::NewPaper;
    use researchgraph_common::db::InMemoryStore;
    use researchgraph_common::embeddings::MockEmbedder;
    use researchgraph_common::errors::Result;
    use researchgraph_common::llm::MockChatModel;
    use researchgraph_context::CandidatePaper;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct NoResults;

    #[async_trait]
    impl LiteratureSearch for NoResults {
        async fn search(&self, _topic: &str, _max_results: u32) -> Result<Vec<CandidatePaper>> {
            Ok(Vec::new())
        }
    }

    async fn test_app() -> (Router, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new(8));
        let embedder = Arc::new(MockEmbedder::new(8));

        store
            .upsert_paper(NewPaper {
                arxiv_id: "1706.03762".to_string(),
                title: "Attention Is All You Need".to_string(),
                abstract_text: Some("We propose the Transformer.".to_string()),
                references: vec!["1409.0473".to_string(), "0000.00000".to_string()],
                cited_by: vec!["1810.04805".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();
        for (arxiv_id, title, references) in [
            ("1409.0473", "Neural Machine Translation by Jointly Learning to Align and Translate", vec![]),
            ("1810.04805", "BERT", vec!["1706.03762", "1512.03385"]),
            ("1512.03385", "Deep Residual Learning for Image Recognition", vec![]),
        ] {
            store
                .upsert_paper(NewPaper {
                    arxiv_id: arxiv_id.to_string(),
                    title: title.to_string(),
                    references: references.into_iter().map(String::from).collect(),
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let paper = store.find_paper("1706.03762").await.unwrap().unwrap();
        let vector = embedder.embed("What is self-attention?").await.unwrap();
        store
            .add_chunk(paper.id, 0, "Self-attention relates positions.", vector)
            .await
            .unwrap();

        let state = AppState::new(
            Arc::new(AppConfig::default()),
            store.clone(),
            embedder,
            Arc::new(MockChatModel::new()),
            Arc::new(NoResults),
        );
        (create_router(state).unwrap(), store)
    }

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_ready() {
        let (app, _) = test_app().await;

        let (status, body) = call(&app, get_request("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["app"], "ResearchGraph");

        let (status, body) = call(&app, get_request("/ready")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["database"]["status"], "up");
    }

    #[tokio::test]
    async fn test_chat_then_cache() {
        let (app, _) = test_app().await;
        let question = json!({"paper_id": "1706.03762", "question": "What is self-attention?"});

        let (status, body) = call(&app, post_json("/chat", question.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"], "llm");
        assert_eq!(body["context_used"][0], "Self-attention relates positions.");

        let (status, body) = call(&app, post_json("/chat", question)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"], "cache");
    }

    #[tokio::test]
    async fn test_chat_errors() {
        let (app, _) = test_app().await;

        let (status, body) = call(
            &app,
            post_json("/chat", json!({"paper_id": "nonexistent", "question": "Why?"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"]["code"].is_string());

        let (status, _) = call(
            &app,
            post_json("/chat", json!({"paper_id": "1706.03762", "question": "   "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_graph_omits_unknown_papers() {
        let (app, _) = test_app().await;

        let (status, body) = call(&app, get_request("/graph/1706.03762")).await;
        assert_eq!(status, StatusCode::OK);

        let nodes = body["nodes"].as_array().unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0]["data"]["isCenter"], true);
        assert_eq!(nodes[0]["type"], "paperNode");
        assert!(!nodes.iter().any(|n| n["data"]["arxiv_id"] == "0000.00000"));

        let edges = body["edges"].as_array().unwrap();
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().any(|e| e["animated"] == true));

        let (status, _) = call(&app, get_request("/graph/9999.99999")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_expand_is_idempotent() {
        let (app, store) = test_app().await;
        let bert = store.find_paper("1810.04805").await.unwrap().unwrap();

        let (_, graph) = call(&app, get_request("/graph/1706.03762")).await;
        let request = json!({
            "paper_id": bert.id.to_string(),
            "nodes": graph["nodes"],
            "edges": graph["edges"],
        });

        let (status, once) = call(&app, post_json("/graph/expand", request)).await;
        assert_eq!(status, StatusCode::OK);

        // Existing nodes keep their place, ResNet is added around BERT
        let nodes = once["nodes"].as_array().unwrap();
        assert_eq!(nodes.len(), 4);
        assert_eq!(nodes[..3], graph["nodes"].as_array().unwrap()[..]);
        assert_eq!(nodes[3]["data"]["arxiv_id"], "1512.03385");
        assert_eq!(nodes[3]["data"]["isCenter"], false);

        // BERT -> Attention was already drawn as a cited-by edge
        assert_eq!(once["edges"].as_array().unwrap().len(), 3);

        let again = json!({
            "paper_id": "1810.04805",
            "nodes": once["nodes"],
            "edges": once["edges"],
        });
        let (_, twice) = call(&app, post_json("/graph/expand", again)).await;
        assert_eq!(twice, once);
    }

    #[tokio::test]
    async fn test_discover_validation_and_empty_results() {
        let (app, _) = test_app().await;

        let (status, _) = call(
            &app,
            post_json("/discover", json!({"topic": "x", "background": "student"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            post_json("/discover", json!({"topic": "quantum gravity", "background": "student"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
