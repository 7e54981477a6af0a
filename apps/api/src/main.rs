use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use resume_api::config::Config;
use resume_api::export::TracingNotifier;
use resume_api::fonts::DirectoryFontCatalog;
use resume_api::routes::build_router;
use resume_api::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting resume export API v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Export defaults: {} {}mm margin, quality {}, {} slicing, {} fit, max {} pages",
        config.default_format,
        config.default_margin_mm,
        config.default_quality,
        config.slicing_strategy,
        config.fit_policy,
        config.max_pages
    );

    let fonts = DirectoryFontCatalog::with_default_dirs(config.fonts_dir.clone());
    info!("Font search path: {:?}", fonts.search_dirs());

    let state = AppState {
        config: config.clone(),
        fonts: Arc::new(fonts),
        notifier: Arc::new(TracingNotifier),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
