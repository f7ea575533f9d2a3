use std::sync::Arc;

use crate::adapters;
use crate::config::AppConfig;
use crate::core::catalog::DriveCatalog;
use crate::core::orchestrator::{WipeOptions, WipeOrchestrator};
use crate::core::space::PlatformSpaceProbe;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub catalog: Arc<DriveCatalog>,
    pub orchestrator: Arc<WipeOrchestrator>,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Self {
        let adapter = adapters::get_adapter(config.simulation);
        let options = WipeOptions {
            file_pace: config.file_pace(),
        };
        Self {
            config: Arc::new(config),
            catalog: Arc::new(DriveCatalog::new(adapter)),
            orchestrator: Arc::new(WipeOrchestrator::new(Arc::new(PlatformSpaceProbe), options)),
        }
    }
}
