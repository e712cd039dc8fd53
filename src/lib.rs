pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::Arc;

use anyhow::Result;

use config::AppConfig;
use db::database::Database;
use services::market_data::{ReturnSource, StooqSource};
use services::pipeline::IntelPipeline;
use services::provider::{AnalysisProvider, OpenAiProvider};

/// Shared state behind the HTTP surface.
pub struct AppState {
    pub config: AppConfig,
    pub db: Arc<Database>,
    pub pipeline: IntelPipeline,
    pub returns: Arc<dyn ReturnSource>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self> {
        let db = Arc::new(Database::new(config.data_dir.clone())?);
        let provider: Arc<dyn AnalysisProvider> =
            Arc::new(OpenAiProvider::new(config.llm.clone())?);
        Self::with_parts(config, db, provider, Arc::new(StooqSource::new()?))
    }

    /// Assembly seam for tests and alternative providers.
    pub fn with_parts(
        config: AppConfig,
        db: Arc<Database>,
        provider: Arc<dyn AnalysisProvider>,
        returns: Arc<dyn ReturnSource>,
    ) -> Result<Self> {
        let pipeline = IntelPipeline::new(Arc::clone(&db), provider, &config);
        Ok(Self {
            config,
            db,
            pipeline,
            returns,
        })
    }
}
