use std::sync::Arc;
use token_handler_auth::{AuthFlow, ProviderRegistry, build_http_client};
use token_handler_server::{app, cleanup, config::ServerConfig, discovery, state::AppState};
use token_handler_session::{FileBackend, MemoryBackend, SessionBackend};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env().expect("failed to load configuration");
    tracing::info!("Loaded configuration");

    let key = config.cookie_key().expect("invalid cookie keys");

    let provider_http =
        build_http_client(config.provider_timeout()).expect("failed to create HTTP client");

    tracing::info!(count = config.providers.len(), "Discovering identity providers...");
    let resolved = discovery::discover_all(
        &config.providers,
        config.redirect_url.as_deref(),
        &provider_http,
    )
    .await
    .expect("failed to discover identity providers");
    let providers =
        ProviderRegistry::new(resolved, provider_http).expect("invalid provider configuration");

    let backend: Arc<dyn SessionBackend> = if config.session_path.is_empty() {
        tracing::info!("Keeping sessions in memory");
        Arc::new(MemoryBackend::new())
    } else {
        tracing::info!(path = %config.session_path, "Keeping sessions on disk");
        Arc::new(
            FileBackend::open(&config.session_path)
                .await
                .expect("failed to open session directory"),
        )
    };

    // Sweep expired records now and then periodically
    cleanup::spawn(backend.clone(), config.cleanup_interval());

    let flow = AuthFlow::new(providers, &config.flow_settings());
    let upstream_http = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("failed to create HTTP client");
    let state = AppState::new(flow, backend, key, upstream_http);

    let app = app::router(state, &config.origins, &config.upstream_routes())
        .expect("invalid route configuration");

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
