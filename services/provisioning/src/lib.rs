pub mod api;
pub mod config;
pub mod quota;
pub mod storage;

use std::sync::Arc;

pub use api::{create_router, ApiState, ErrorResponse};
pub use config::ProvisioningConfig;
pub use quota::{QuotaEngine, QuotaError};
pub use storage::{ProvisioningDatabase, StorageError};

use quota::{builtin_resources, DriverContext, DriverFactory, QuotaStore};

/// Builds the quota engine used by the service: configured driver kind,
/// built-in driver constructors and the built-in resource catalog.
pub fn build_quota_engine(
    config: &ProvisioningConfig,
    database: Arc<ProvisioningDatabase>,
) -> QuotaEngine {
    let store: Arc<dyn QuotaStore> = database.clone();
    let context = DriverContext::new(store, config.quota_flags());
    let mut engine =
        QuotaEngine::from_factory(config.quota_driver, DriverFactory::default(), context);
    engine.register_resources(builtin_resources(database));
    engine
}
