//! CineScore backend entrypoint wiring REST, SSE, providers and the session store.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cinescore_back::{
    catalog::Catalog,
    config::{AppConfig, ProviderKeys, StoreBackend},
    dao::{
        session_store::{MemorySessionStore, SessionStore},
        storage::StorageError,
    },
    judging::{JudgingProvider, NoCredentialJudge, gemini::GeminiJudge},
    media::CompositeMediaResolver,
    routes,
    services::storage_supervisor,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let catalog = Catalog::load();
    let keys = ProviderKeys::from_env();
    let backend = StoreBackend::from_env().context("selecting session store backend")?;

    let judge: Arc<dyn JudgingProvider> = match keys.gemini_api_key {
        Some(api_key) => Arc::new(
            GeminiJudge::new(api_key, keys.gemini_model).context("building Gemini judge")?,
        ),
        None => {
            warn!("GEMINI_API_KEY not set; every answer will be judged as a failed verification");
            Arc::new(NoCredentialJudge)
        }
    };
    let media = CompositeMediaResolver::from_keys(keys.tmdb_api_key, config.timings.media_timeout)
        .context("building media resolver")?;

    let app_state = AppState::new(config, catalog, judge, media);
    start_session_store(&app_state, backend)
        .await
        .context("configuring session store")?;

    let app = routes::build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Install the in-process store right away, or hand a durable backend to the supervisor.
///
/// Backend settings are validated here so a misconfiguration stops the process at startup.
async fn start_session_store(state: &SharedState, backend: StoreBackend) -> anyhow::Result<()> {
    match backend {
        StoreBackend::Memory => {
            info!("using in-memory session store; sessions are lost on restart");
            state
                .install_session_store(Arc::new(MemorySessionStore::new()))
                .await;
        }
        #[cfg(feature = "mongo-store")]
        StoreBackend::Mongo => {
            use cinescore_back::dao::session_store::mongodb::{MongoConfig, MongoSessionStore};

            let config = MongoConfig::from_env()
                .await
                .context("reading MongoDB settings")?;
            info!(database = %config.database_name, "using MongoDB session store");
            tokio::spawn(storage_supervisor::run(state.clone(), move || {
                let config = config.clone();
                async move {
                    let store = MongoSessionStore::connect(config)
                        .await
                        .map_err(StorageError::from)?;
                    Ok::<Arc<dyn SessionStore>, StorageError>(Arc::new(store))
                }
            }));
        }
        #[cfg(feature = "couch-store")]
        StoreBackend::Couch => {
            use cinescore_back::dao::session_store::couchdb::{CouchConfig, CouchSessionStore};

            let config = CouchConfig::from_env().context("reading CouchDB settings")?;
            info!(database = %config.database, "using CouchDB session store");
            tokio::spawn(storage_supervisor::run(state.clone(), move || {
                let config = config.clone();
                async move {
                    let store = CouchSessionStore::connect(config)
                        .await
                        .map_err(StorageError::from)?;
                    Ok::<Arc<dyn SessionStore>, StorageError>(Arc::new(store))
                }
            }));
        }
    }
    Ok(())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown signal received");
}
