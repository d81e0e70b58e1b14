//! Process-wide API index client.
//!
//! [`init`] opens the SQLite index, runs migrations, builds the configured
//! embedder, and stores the resulting [`ApiIndex`] in a `OnceCell`.
//! Concurrent callers wait for the one construction in flight; every later
//! caller reaches the same instance through [`client`]. There is no
//! teardown; the pool closes when the process exits.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

use api_index_core::IndexManager;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::migrate;
use crate::sqlite_index::SqliteIndex;

/// The index manager plus the config it was built from.
pub struct ApiIndex {
    config: Config,
    manager: IndexManager,
}

impl ApiIndex {
    /// Build a client without registering it process-wide.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate(&pool).await?;

        let embedder = create_embedder(&config.embedding)?;
        info!(
            index = %config.index.path.display(),
            provider = %config.embedding.provider,
            model = embedder.model_name(),
            dims = embedder.dims(),
            "opened API index"
        );

        let manager = IndexManager::new(Arc::new(SqliteIndex::new(pool)), embedder)
            .with_batch_size(config.indexing.batch_size);

        Ok(Self {
            config: config.clone(),
            manager,
        })
    }

    pub fn manager(&self) -> &IndexManager {
        &self.manager
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

static CLIENT: OnceCell<ApiIndex> = OnceCell::const_new();

/// Initialize the process-wide client. Later calls return the existing one.
/// A failed open leaves the cell empty so the next call can retry.
pub async fn init(config: &Config) -> Result<&'static ApiIndex> {
    CLIENT.get_or_try_init(|| ApiIndex::open(config)).await
}

/// The process-wide client. Fails if [`init`] has not run.
pub fn client() -> Result<&'static ApiIndex> {
    CLIENT
        .get()
        .ok_or_else(|| anyhow!("API index client is not initialized"))
}
