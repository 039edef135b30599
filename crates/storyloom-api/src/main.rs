//! Storyloom API server entry point.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use storyloom_api::config::{AppConfig, StoreConfig};
use storyloom_api::error::AppError;
use storyloom_api::generator::HttpGenerator;
use storyloom_api::routes;
use storyloom_api::state::AppState;
use storyloom_api::telemetry;
use storyloom_core::clock::SystemClock;
use storyloom_core::generator::Generator;
use storyloom_core::store::SessionStore;
use storyloom_queue::TaskQueue;
use storyloom_session::SessionEngine;
use storyloom_store::file_session_store::FileSessionStore;
use storyloom_store::pg_session_store::PgSessionStore;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = AppConfig::from_env()?;
    let telemetry = telemetry::init(config.otlp_endpoint.as_deref())?;

    tracing::info!("Starting Storyloom API server");

    let store = open_store(&config.store).await?;
    let generator: Arc<dyn Generator> = Arc::new(HttpGenerator::new(&config.generator)?);

    let engine = Arc::new(SessionEngine::new(
        Arc::clone(&generator),
        Arc::new(SystemClock),
        store,
    ));
    let loaded = engine.load().await?;
    tracing::info!(sessions = loaded, "session library ready");

    // Queue results are folded into the sessions named by their payloads.
    let shutdown = CancellationToken::new();
    let (queue, outcomes) = TaskQueue::new(generator);
    let processor = tokio::spawn({
        let queue = queue.clone();
        let shutdown = shutdown.clone();
        async move { queue.run(shutdown).await }
    });
    let applier = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.drain_task_outcomes(outcomes).await }
    });

    let app_state = AppState::new(engine, queue);

    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = routes::app_router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let addr = config.socket_addr()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "failed to listen for shutdown signal");
                }
                shutdown.cancel();
            }
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = processor.await {
        tracing::warn!(error = %e, "queue processor task ended abnormally");
    }
    // The router and the processor held the last queue handles; once they
    // are gone the outcome channel closes and the applier finishes draining.
    match applier.await {
        Ok(applied) => tracing::info!(applied, "queue results drained"),
        Err(e) => tracing::warn!(error = %e, "queue result applier ended abnormally"),
    }
    telemetry.shutdown();

    Ok(())
}

async fn open_store(config: &StoreConfig) -> Result<Arc<dyn SessionStore>, AppError> {
    match config {
        StoreConfig::Postgres { database_url } => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await?;
            let store = PgSessionStore::new(pool);
            store.ensure_schema().await?;
            tracing::info!("using PostgreSQL session store");
            Ok(Arc::new(store))
        }
        StoreConfig::File { path } => {
            tracing::info!(path = %path.display(), "using file session store");
            Ok(Arc::new(FileSessionStore::new(path.clone())))
        }
    }
}
