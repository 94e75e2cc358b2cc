//! # Goblin-Board Binary
//!
//! The entry point that assembles the application from configuration and
//! compile-time features.

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use gb_api::middleware::{access_log, cors_policy};
use gb_api::{configure_routes, AppState};
use gb_auth_simple::DailyIdentityProvider;
use gb_config::{DatabaseBackend, DatabaseSettings, LogSettings, Settings};
use gb_core::{ThreadLifecycle, ThreadRepo};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "db-sqlite")]
use gb_db_sqlite::SqliteThreadRepo;

#[cfg(feature = "db-memory")]
use gb_db_memory::MemoryThreadRepo;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let settings = gb_config::load().context("loading configuration")?;
    init_tracing(&settings.log);

    // 1. Initialize the thread store selected in configuration
    let repo = build_repo(&settings.database).await?;

    let (host, port) = settings.bind_address();
    tracing::info!(
        app = %settings.app.name,
        version = %settings.app.version,
        boards = ?settings.boards.keys().collect::<Vec<_>>(),
        "goblin-board starting on http://{host}:{port}"
    );

    // 2. Wrap in AppState (dynamic dispatch over the configured plugins)
    let state = web::Data::new(app_state(repo, settings));

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(cors_policy())
            .wrap(access_log())
            .configure(configure_routes)
    })
    .bind((host.as_str(), port))
    .with_context(|| format!("binding {host}:{port}"))?
    .run()
    .await?;

    Ok(())
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn app_state(repo: Arc<dyn ThreadRepo>, settings: Settings) -> AppState {
    AppState {
        lifecycle: ThreadLifecycle::new(repo)
            .with_max_posts(settings.moderation.max_posts_per_thread),
        boards: settings.registry(),
        identity: Box::new(DailyIdentityProvider::new(settings.uid_secret)),
        banned_words: settings.moderation.banned_words,
    }
}

async fn build_repo(database: &DatabaseSettings) -> anyhow::Result<Arc<dyn ThreadRepo>> {
    match database.backend {
        #[cfg(feature = "db-sqlite")]
        DatabaseBackend::Sqlite => {
            let repo = SqliteThreadRepo::connect(&database.url)
                .await
                .with_context(|| format!("opening {}", database.url))?;
            Ok(Arc::new(repo))
        }
        #[cfg(feature = "db-memory")]
        DatabaseBackend::Memory => {
            tracing::warn!("using the in-memory store; threads are lost on restart");
            Ok(Arc::new(MemoryThreadRepo::new()))
        }
        #[allow(unreachable_patterns)]
        backend => anyhow::bail!("database backend {backend:?} is not compiled in"),
    }
}
