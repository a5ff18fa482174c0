use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use articulate::{abuse, api, auth, config::GameConfig, llm, state::AppState, words::WordSource};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "articulate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Articulate...");

    let config = GameConfig::from_env();

    let words = match WordSource::load(&config.words_dir, &config.default_topic) {
        Ok(words) => words,
        Err(e) => {
            tracing::error!("Failed to load word lists: {}", e);
            std::process::exit(1);
        }
    };

    let llm_config = llm::LlmConfig::from_env();
    let llm_manager = match llm_config.build_manager() {
        Ok(manager) => {
            tracing::info!("LLM providers initialized successfully");
            manager
        }
        Err(e) => {
            tracing::error!("Failed to initialize LLM providers: {}", e);
            std::process::exit(1);
        }
    };

    let admin_config = Arc::new(auth::AdminConfig::from_env());
    let abuse_config = Arc::new(abuse::AbuseConfig::from_env());
    if let Some(limiter) = abuse_config.rate_limiter.clone() {
        abuse::spawn_cleanup(limiter);
    }

    let state = Arc::new(AppState::new(config, words, llm_manager, llm_config));

    let app = api::router(state, abuse_config, admin_config)
        .fallback_service(ServeDir::new("static"))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.trim().parse().ok())
        .unwrap_or(8000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
