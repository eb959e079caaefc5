// src/main.rs
use axum::{Extension, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use blogsmith::gemini_client::GeminiClient;
use blogsmith::handlers::{topics::topic_routes, workflows::workflow_routes};
use blogsmith::middleware::logging::request_logging_middleware;
use blogsmith::provider::GenerationProvider;
use blogsmith::store::{MemoryWorkflowStore, PgWorkflowStore, WorkflowStore};
use blogsmith::workflow::{Orchestrator, OrchestratorConfig};
use blogsmith::{db, AppState};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    // The generation provider is mandatory; everything else degrades.
    let provider: Arc<dyn GenerationProvider> = match std::env::var("GEMINI_API_KEY").ok() {
        Some(api_key) => {
            tracing::info!("Initializing Gemini client...");
            Arc::new(GeminiClient::new(api_key))
        }
        None => {
            tracing::error!("GEMINI_API_KEY not set. The content pipeline cannot run without it.");
            std::process::exit(1);
        }
    };

    // Postgres when DATABASE_URL is set, in-memory otherwise.
    let store: Arc<dyn WorkflowStore> = match std::env::var("DATABASE_URL").ok() {
        Some(db_url) => {
            tracing::info!("Connecting to Postgres...");
            match db::create_pool(&db_url).await {
                Ok(pool) => Arc::new(PgWorkflowStore::new(pool)),
                Err(e) => {
                    tracing::error!("Failed to create database pool: {}", e);
                    std::process::exit(1);
                }
            }
        }
        None => {
            tracing::warn!("DATABASE_URL not set. Workflows will not survive a restart.");
            Arc::new(MemoryWorkflowStore::new())
        }
    };

    let config = OrchestratorConfig::from_env();
    let generation_timeout = config.generation_timeout();
    let orchestrator = Orchestrator::new(store, provider.clone(), config);

    let shared_state = Arc::new(AppState {
        orchestrator,
        provider,
        generation_timeout,
    });

    let app = Router::new()
        .merge(workflow_routes())
        .merge(topic_routes())
        .route("/api/status", axum::routing::get(api_status))
        .layer(axum::middleware::from_fn(request_logging_middleware))
        .layer(CorsLayer::permissive())
        .layer(Extension(shared_state));

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{}", port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Ok(local_addr) = listener.local_addr() {
        tracing::info!("listening on {}", local_addr);
    }
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

async fn api_status() -> axum::response::Json<serde_json::Value> {
    axum::response::Json(serde_json::json!({
        "status": "operational",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "workflows": "/api/workflows",
            "topics": "/api/topics/generate",
            "status": "/api/status"
        }
    }))
}

// Production-grade logging configuration
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,blogsmith=trace,sqlx=info,reqwest=info,hyper=info,tower=info".to_string()
        } else {
            "info,blogsmith=info,sqlx=warn,reqwest=warn,hyper=warn,tower=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    // JSON output for log aggregation, human-readable otherwise
    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Blogsmith starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Build mode: {}",
        if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        }
    );
    tracing::info!("Log level: {}", log_level);

    let gemini_configured = std::env::var("GEMINI_API_KEY").is_ok();
    let db_configured = std::env::var("DATABASE_URL").is_ok();
    tracing::info!(
        "Configuration - Database: {}, Gemini AI: {}",
        if db_configured { "yes" } else { "no" },
        if gemini_configured { "yes" } else { "no" }
    );

    Ok(())
}
