use burn_notes::{
    config::{self, SchedulerBackend, StoreBackend},
    guard::UserAgentGuard,
    handlers::rest::{self, RouterOptions},
    repository::{self, MemoryStore, NoteStore, PgStore},
    scheduler::{CleanupScheduler, HttpScheduler, LocalScheduler, NoopScheduler},
    service::{NoteService, NoteSettings},
};
use tracing_subscriber::EnvFilter;

use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Log setup
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("burn_notes=info,tower_http=info")),
        )
        .init();

    // Load config
    let cfg = config::load_config().unwrap_or_else(|e| {
        tracing::error!("Failed to load config: {e}");
        panic!("failed to load config: {e}");
    });
    tracing::info!("Successfully loaded burn-notes config");

    // Store creation and migration
    let store: Arc<dyn NoteStore> = match cfg.store.backend {
        StoreBackend::Postgres => {
            let dsn = cfg.store.dsn.as_deref().unwrap_or_default();
            let store = PgStore::connect(dsn).await.unwrap_or_else(|e| {
                tracing::error!("Failed to establish database connection: {e}");
                panic!("failed to establish database connection: {e}");
            });
            store.migrate().await.unwrap_or_else(|e| {
                tracing::error!("Failed to migrate database: {e}");
                panic!("failed to migrate database: {e}");
            });
            Arc::new(store)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store, notes will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };
    repository::spawn_expiry_sweeper(store.clone(), cfg.store.sweep_interval);

    // Scheduler creation
    let scheduler: Arc<dyn CleanupScheduler> = match cfg.scheduler.backend {
        SchedulerBackend::Local => Arc::new(LocalScheduler::new(store.clone())),
        SchedulerBackend::Http => {
            let endpoint = cfg.scheduler.endpoint.clone().unwrap_or_default();
            let scheduler = HttpScheduler::new(endpoint, cfg.cleanup_url(), cfg.scheduler.timeout)
                .unwrap_or_else(|e| {
                    tracing::error!("Failed to build scheduler client: {e}");
                    panic!("failed to build scheduler client: {e}");
                });
            Arc::new(scheduler)
        }
        SchedulerBackend::Disabled => Arc::new(NoopScheduler),
    };

    // Service creation
    let guard = Arc::new(UserAgentGuard::new(&cfg.bot_guard.extra_signatures));
    let service = Arc::new(NoteService::new(
        store,
        scheduler,
        guard,
        NoteSettings::from_config(&cfg),
    ));

    let router = rest::router(
        service,
        &RouterOptions {
            allow_unverified_read: cfg.retrieval.allow_unverified_read,
            cors: cfg.cors.clone(),
        },
    );

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", cfg.port))
        .await
        .expect("Failed to bind to address");
    let addr = listener.local_addr().expect("Failed to read local address");

    tracing::info!("Burn notes server starting, listening on {}", addr);

    axum::serve(listener, router)
        .await
        .expect("Failed to start server");
}
