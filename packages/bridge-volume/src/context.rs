//! Shared, read-only dependencies of a run

use std::sync::Arc;

use crate::chains::ChainRegistry;
use crate::config::Config;
use crate::funding::Funding;
use crate::pacing::Sleeper;

/// Everything the bridge legs and the orchestrator need besides the wallet itself
#[derive(Clone)]
pub struct BotContext {
    pub config: Arc<Config>,
    pub registry: Arc<ChainRegistry>,
    pub funding: Arc<Funding>,
    pub sleeper: Arc<dyn Sleeper>,
}

impl BotContext {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<ChainRegistry>,
        funding: Arc<Funding>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            config,
            registry,
            funding,
            sleeper,
        }
    }

    pub fn sleeper(&self) -> &dyn Sleeper {
        self.sleeper.as_ref()
    }
}
