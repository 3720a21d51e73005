use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use super::driver::QuotaDriver;
use super::error::QuotaError;
use super::factory::{DriverContext, DriverFactory, QuotaDriverKind};
use super::resource::{CountArgs, Resource, ResourceRegistry};

enum DriverSource {
    Instance(Arc<dyn QuotaDriver>),
    Configured {
        kind: QuotaDriverKind,
        factory: DriverFactory,
        context: DriverContext,
    },
}

/// Set of recognised quota resources plus the driver enforcing them.
///
/// Resources are registered during startup through `&mut self`; once the
/// engine is shared the registry is read-only. The driver is resolved on
/// the first call that needs it and cached for the engine's lifetime.
pub struct QuotaEngine {
    resources: ResourceRegistry,
    source: DriverSource,
    driver: Mutex<Option<Arc<dyn QuotaDriver>>>,
}

impl QuotaEngine {
    pub fn with_driver(driver: Arc<dyn QuotaDriver>) -> Self {
        Self {
            resources: ResourceRegistry::new(),
            source: DriverSource::Instance(driver),
            driver: Mutex::new(None),
        }
    }

    pub fn from_factory(
        kind: QuotaDriverKind,
        factory: DriverFactory,
        context: DriverContext,
    ) -> Self {
        Self {
            resources: ResourceRegistry::new(),
            source: DriverSource::Configured {
                kind,
                factory,
                context,
            },
            driver: Mutex::new(None),
        }
    }

    pub fn register_resource(&mut self, resource: Resource) {
        debug!(resource = resource.name(), "registering quota resource");
        self.resources.register(resource);
    }

    pub fn register_resources<I>(&mut self, resources: I)
    where
        I: IntoIterator<Item = Resource>,
    {
        for resource in resources {
            self.register_resource(resource);
        }
    }

    /// Registered resource names in sorted order.
    pub fn resources(&self) -> Vec<String> {
        self.resources.names()
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Counts a countable resource. Simple resources are reported as
    /// unknown, just like unregistered ones.
    pub fn count(&self, resource: &str, args: &CountArgs) -> Result<i64, QuotaError> {
        let counted = self
            .resources
            .get(resource)
            .and_then(|res| res.count(args))
            .ok_or_else(|| QuotaError::ResourceUnknown(vec![resource.to_string()]))?;
        Ok(counted?)
    }

    pub fn get_defaults(&self) -> Result<BTreeMap<String, i64>, QuotaError> {
        self.driver()?.get_defaults(&self.resources)
    }

    pub fn get_project_quotas(
        &self,
        project_id: &str,
    ) -> Result<BTreeMap<String, i64>, QuotaError> {
        self.driver()?
            .get_project_quotas(&self.resources, project_id)
    }

    /// Checks proposed values for simple limits. Fails with `OverQuota`
    /// listing the offending resources, or `ResourceUnknown` for names that
    /// are not registered simple resources.
    pub fn limit_check(
        &self,
        project_id: Option<&str>,
        user_id: Option<&str>,
        values: &BTreeMap<String, i64>,
    ) -> Result<(), QuotaError> {
        self.driver()?
            .limit_check(&self.resources, values, project_id, user_id)
    }

    /// Checks that growing countable resources by `deltas` keeps the
    /// project within its limits.
    pub fn usage_check(
        &self,
        project_id: Option<&str>,
        user_id: Option<&str>,
        deltas: &BTreeMap<String, i64>,
    ) -> Result<(), QuotaError> {
        let args = CountArgs::for_project(project_id, user_id);
        self.driver()?.usage_check(&self.resources, deltas, &args)
    }

    fn driver(&self) -> Result<Arc<dyn QuotaDriver>, QuotaError> {
        let mut slot = self
            .driver
            .lock()
            .map_err(|_| QuotaError::DriverUnavailable("driver lock poisoned".into()))?;

        if let Some(driver) = slot.as_ref() {
            return Ok(Arc::clone(driver));
        }

        let driver = match &self.source {
            DriverSource::Instance(driver) => Arc::clone(driver),
            DriverSource::Configured {
                kind,
                factory,
                context,
            } => {
                let driver = factory.build(*kind, context)?;
                info!(driver = %kind, "quota driver resolved");
                driver
            }
        };

        *slot = Some(Arc::clone(&driver));
        Ok(driver)
    }
}
