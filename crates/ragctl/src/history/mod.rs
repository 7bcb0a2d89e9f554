//! Durable run history
//!
//! Runs are stored one record per `run_id`. Two backends are available, selected
//! by [`HistoryConfig::backend`](crate::config::HistoryConfig).

pub mod json_store;
pub mod run_id;
pub mod sqlite_store;
pub mod store;

use std::sync::Arc;

pub use json_store::JsonHistoryStore;
pub use run_id::{allocate_run_id, base_run_id, is_valid_run_id, RUN_ID_PREFIX};
pub use sqlite_store::SqliteHistoryStore;
pub use store::HistoryStore;

use crate::config::{HistoryBackend, HistoryConfig};
use crate::error::Result;

/// Open the configured history backend
pub fn open_store(config: &HistoryConfig) -> Result<Arc<dyn HistoryStore>> {
    let store: Arc<dyn HistoryStore> = match config.backend {
        HistoryBackend::Json => Arc::new(JsonHistoryStore::new(&config.dir)?),
        HistoryBackend::Sqlite => Arc::new(SqliteHistoryStore::new(
            config.dir.join(sqlite_store::DATABASE_FILE),
        )?),
    };
    tracing::debug!("Opened {:?} history store at {}", config.backend, store.location());
    Ok(store)
}
