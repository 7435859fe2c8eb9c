use axum::{
    routing::{get, post},
    Router,
};
use rust_kyb_api::config::Config;
use rust_kyb_api::export::ReportExporter;
use rust_kyb_api::handlers::{self, AppState};
use rust_kyb_api::llm_client::GroqClient;
use rust_kyb_api::report_store::{ReportStore, UsageLog};
use rust_kyb_api::services::ReportService;
use rust_kyb_api::website_scraper::{CachedScraper, HtmlScraper};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the application.
///
/// Initializes tracing, loads configuration, builds the report pipeline
/// (Groq client, cached website scraper, CSV store, JSON exporter) and serves
/// the HTTP API.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_kyb_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    let llm = GroqClient::from_config(&config)?;
    tracing::info!("Groq client initialized: {}", config.groq_base_url);

    // Scraped website data cache (1 hour TTL, 1k max entries)
    let scraper = CachedScraper::new(HtmlScraper::new()?, Duration::from_secs(3600), 1_000);
    tracing::info!("Website scraper initialized (1h cache, 1k capacity)");

    let service = ReportService::new(Arc::new(llm), Arc::new(scraper), config.default_model.clone())
        .with_batch_concurrency(config.batch_concurrency);

    let app_state = Arc::new(AppState {
        store: ReportStore::new(&config.store_path),
        usage_log: UsageLog::new(&config.usage_log_path),
        exporter: ReportExporter::new(&config.reports_dir),
        service,
        config: config.clone(),
    });

    // Configure rate limiter: 5 requests/second per IP, burst of 10
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(5)
            .burst_size(10)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    // Every report costs an LLM call, so API routes sit behind the limiter
    let protected_routes = Router::new()
        .route(
            "/api/v1/reports",
            post(handlers::create_report).get(handlers::list_reports),
        )
        .route("/api/v1/reports/batch", post(handlers::create_batch))
        .route("/api/v1/reports/:file_name", get(handlers::get_report))
        .route("/api/v1/admin/reports", get(handlers::admin_reports))
        .route("/api/v1/models", get(handlers::list_models))
        .layer(
            ServiceBuilder::new()
                // Request size limit: 1MB max payload
                .layer(RequestBodyLimitLayer::new(1024 * 1024))
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
