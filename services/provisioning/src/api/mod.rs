use std::sync::Arc;

pub mod handlers;
pub mod router;
pub mod types;

pub use router::create_router;
pub use types::*;

use crate::config::ProvisioningConfig;
use crate::quota::QuotaEngine;
use crate::storage::ProvisioningDatabase;

pub struct ApiState {
    pub quota_engine: Arc<QuotaEngine>,
    pub database: Arc<ProvisioningDatabase>,
    pub config: Arc<ProvisioningConfig>,
}

impl ApiState {
    pub fn new(
        quota_engine: Arc<QuotaEngine>,
        database: Arc<ProvisioningDatabase>,
        config: ProvisioningConfig,
    ) -> Self {
        Self {
            quota_engine,
            database,
            config: Arc::new(config),
        }
    }
}
