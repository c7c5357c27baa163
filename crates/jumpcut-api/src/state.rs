//! Application state.

use std::sync::Arc;

use jumpcut_engine::{EngineConfig, JobRegistry, UploadStore};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub registry: Arc<JobRegistry>,
    pub uploads: Arc<UploadStore>,
}

impl AppState {
    /// Create new application state, ensuring the working directories exist.
    pub async fn new(config: ApiConfig, engine_config: EngineConfig) -> std::io::Result<Self> {
        engine_config.ensure_dirs().await?;
        let uploads = Arc::new(UploadStore::new(engine_config.upload_dir.clone()));
        let registry = Arc::new(JobRegistry::new(engine_config));
        Ok(Self {
            config,
            registry,
            uploads,
        })
    }
}
