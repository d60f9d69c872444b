//! Application state shared by the handlers: the record store handle and config.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::config::AppConfig;
use crate::error::{Error, StoreResult};
use crate::store::{RecordStore, SqliteStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub config: AppConfig,
}

impl AppState {
    /// Open the SQLite store named by the config.
    #[instrument(level = "info", skip_all, fields(db = %config.database.path))]
    pub fn from_config(config: AppConfig) -> StoreResult<Self> {
        let store = SqliteStore::open(&config.database.path)?;
        info!(target: "survey_backend", "Application state ready");
        Ok(Self::with_store(Arc::new(store), config))
    }

    pub fn with_store(store: Arc<dyn RecordStore>, config: AppConfig) -> Self {
        Self { store, config }
    }

    /// Run a store operation on the blocking pool.
    pub async fn run<T, F>(&self, work: F) -> Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce(&dyn RecordStore) -> Result<T, Error> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || work(store.as_ref())).await?
    }
}
