mod config;
mod db;
mod error;
mod notify;
mod routes;
mod state;
mod storage;
mod workflow;

use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::{Config, StorageBackend};
use crate::db::{MemoryStore, NewUser, PgStore, Store};
use crate::notify::{HttpMailer, LogMailer, Mailer};
use crate::workflow::Role;

async fn bootstrap_admin(
    store: &dyn Store,
    email: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Some(existing) = store.find_user_by_email(email).await? {
        tracing::info!("Bootstrap administrator {} already present ({})", email, existing.id);
        return Ok(());
    }
    let admin = store
        .create_user(NewUser {
            email: email.to_string(),
            full_name: "Head of Programs".to_string(),
            role: Role::HeadOfPrograms,
            institution: "headquarters".to_string(),
        })
        .await?;
    tracing::info!("Created bootstrap administrator {} with id {}", email, admin.id);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "review_portal=info,tower_http=info".into()),
        )
        .init();

    let config = Arc::new(Config::from_env()?);

    crate::storage::ensure_dirs(&config.upload_folder)?;

    let store: Arc<dyn Store> = match config.storage_backend {
        StorageBackend::Postgres => {
            let pool = db::create_pool(&config.database_url).await?;
            db::run_migrations(pool.as_ref()).await?;
            Arc::new(PgStore::new(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; all data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    if let Some(ref email) = config.bootstrap_admin_email {
        bootstrap_admin(store.as_ref(), email).await?;
    }

    let mailer: Arc<dyn Mailer> = match config.mail_api_url {
        Some(ref url) => Arc::new(HttpMailer::new(
            url.clone(),
            config.mail_api_key.clone(),
            config.mail_from.clone(),
        )?),
        None => {
            tracing::info!("MAIL_API_URL not set; notifications will only be logged");
            Arc::new(LogMailer)
        }
    };

    let state = Arc::new(state::AppState {
        store,
        mailer,
        config: config.clone(),
    });

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Review portal listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
