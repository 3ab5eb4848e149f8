//! Application state wiring all services together.
//!
//! The orchestrator is generic over its ports; AppState pins it to the
//! concrete infra implementations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use parley_core::chat::orchestrator::ChatOrchestrator;
use parley_core::spec::ModelSpecRegistry;
use parley_infra::cache::title::MemoryTitleCache;
use parley_infra::config::{data_dir, load_config};
use parley_infra::files::FilesystemAttachmentStore;
use parley_infra::llm::build_registry;
use parley_infra::sqlite::conversation::SqliteConversationRepository;
use parley_infra::sqlite::message::SqliteMessageRepository;
use parley_infra::sqlite::pool::{DatabasePool, database_url};
use parley_types::config::GlobalConfig;

/// Concrete orchestrator pinned to the infra implementations.
pub type ConcreteOrchestrator = ChatOrchestrator<
    SqliteConversationRepository,
    SqliteMessageRepository,
    MemoryTitleCache,
    FilesystemAttachmentStore,
>;

/// How often expired titles are swept from the cache.
const TITLE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Shared application state.
///
/// Used by both CLI commands and HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: ConcreteOrchestrator,
    pub config: Arc<GlobalConfig>,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
    /// Cancelled on server shutdown; stops background tasks.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Initialize the application state: load config, connect to DB, wire services.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_config(&data_dir).await;
        let db_pool = DatabasePool::new(&database_url(&data_dir)).await?;

        let providers = build_registry(&config.providers);
        if providers.is_empty() {
            warn!("no providers configured; add [[providers]] to config.toml");
        }
        let specs = ModelSpecRegistry::new(config.specs.clone());
        info!(
            providers = ?providers.types(),
            specs = specs.len(),
            data_dir = %data_dir.display(),
            "application state initialized"
        );

        let shutdown = CancellationToken::new();
        let titles = Arc::new(MemoryTitleCache::new());
        spawn_title_purge(titles.clone(), shutdown.clone());

        let orchestrator = ChatOrchestrator::new(
            Arc::new(SqliteConversationRepository::new(db_pool.clone())),
            Arc::new(SqliteMessageRepository::new(db_pool.clone())),
            titles,
            Arc::new(FilesystemAttachmentStore::new(data_dir.clone())),
            Arc::new(providers),
            Arc::new(specs),
        )
        .with_title_config(config.title.clone())
        .with_shutdown(shutdown.clone());

        Ok(Self {
            orchestrator,
            config: Arc::new(config),
            data_dir,
            db_pool,
            shutdown,
        })
    }
}

/// Periodically drop titles nobody collected.
fn spawn_title_purge(titles: Arc<MemoryTitleCache>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TITLE_PURGE_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    titles.purge_expired();
                }
            }
        }
    });
}
