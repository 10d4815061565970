use std::net::SocketAddr;
use std::path::Path;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_api::config::Config;
use chat_api::gateway::history::{HistoryStore, HistoryWriter};
use chat_api::AppState;

#[tokio::main]
async fn main() {
    // .env is optional; variables may come from the environment instead.
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    // History: load what survived the last run, then hand the file to the writer task.
    let (writer, _writer_task) =
        HistoryWriter::spawn(config.history_file.clone(), config.persist_debounce);
    let mut history = HistoryStore::new(config.history_capacity).with_writer(writer);
    match history.load_from_durable_storage(&config.history_file).await {
        Ok(count) => tracing::info!(count, path = %config.history_file.display(), "history loaded"),
        Err(err) => tracing::error!(%err, "could not load history; starting empty"),
    }
    if config.seed_demo_history && history.seed_demo_content() {
        tracing::info!(count = history.len(), "seeded demo history");
    }

    tracing::info!(
        max_message_length = config.max_message_length,
        history_capacity = config.history_capacity,
        history_on_connect = config.history_on_connect,
        max_history_page = config.max_history_page,
        persist_debounce_ms = config.persist_debounce.as_millis() as u64,
        "chat-api configured"
    );

    let state = AppState::new(config, history);
    let hub = state.hub.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(chat_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%addr, %err, "failed to bind listening port; set PORT to a free port");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, "chat-api listening");

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(%err, "server error");
    }

    // Persist the last burst of messages before exiting.
    hub.shutdown().await;
    tracing::info!("chat-api stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!(%err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("shutting down");
}
