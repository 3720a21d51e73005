use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::storage::StorageError;

use super::error::QuotaError;
use super::resource::{CountArgs, QuotaFlags, ResourceRegistry};
use super::UNLIMITED;

/// Read side of the persisted quota overrides.
pub trait QuotaStore: Send + Sync {
    /// Hard limits of the `"default"` quota class, keyed by resource name.
    fn get_default_quota_class(&self) -> Result<HashMap<String, i64>, StorageError>;

    /// Per-project hard limit overrides, keyed by resource name.
    fn get_project_quotas(&self, project_id: &str) -> Result<HashMap<String, i64>, StorageError>;
}

/// Strategy resolving limits and checking proposed values against them.
///
/// Limits use `-1` for unlimited. Every check reports offending resource
/// names in ascending order.
pub trait QuotaDriver: Send + Sync {
    fn get_defaults(
        &self,
        resources: &ResourceRegistry,
    ) -> Result<BTreeMap<String, i64>, QuotaError>;

    fn get_project_quotas(
        &self,
        resources: &ResourceRegistry,
        project_id: &str,
    ) -> Result<BTreeMap<String, i64>, QuotaError>;

    /// Checks proposed values of simple (non-countable) resources.
    fn limit_check(
        &self,
        resources: &ResourceRegistry,
        values: &BTreeMap<String, i64>,
        project_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<(), QuotaError>;

    /// Checks that adding `deltas` to the current usage of countable
    /// resources stays within their limits.
    fn usage_check(
        &self,
        resources: &ResourceRegistry,
        deltas: &BTreeMap<String, i64>,
        args: &CountArgs,
    ) -> Result<(), QuotaError>;
}

pub struct DatabaseDriver {
    store: Arc<dyn QuotaStore>,
    flags: QuotaFlags,
}

impl DatabaseDriver {
    pub fn new(store: Arc<dyn QuotaStore>, flags: QuotaFlags) -> Self {
        Self { store, flags }
    }

    fn effective_limits(
        &self,
        resources: &ResourceRegistry,
        project_id: Option<&str>,
    ) -> Result<BTreeMap<String, i64>, QuotaError> {
        match project_id {
            Some(project_id) => self.get_project_quotas(resources, project_id),
            None => self.get_defaults(resources),
        }
    }
}

impl QuotaDriver for DatabaseDriver {
    fn get_defaults(
        &self,
        resources: &ResourceRegistry,
    ) -> Result<BTreeMap<String, i64>, QuotaError> {
        let default_quotas = self.store.get_default_quota_class()?;

        let quotas = resources
            .iter()
            .map(|resource| {
                let limit = default_quotas
                    .get(resource.name())
                    .copied()
                    .unwrap_or_else(|| resource.default_limit(&self.flags));
                (resource.name().to_string(), limit)
            })
            .collect();

        Ok(quotas)
    }

    fn get_project_quotas(
        &self,
        resources: &ResourceRegistry,
        project_id: &str,
    ) -> Result<BTreeMap<String, i64>, QuotaError> {
        let mut quotas = self.get_defaults(resources)?;
        let overrides = self.store.get_project_quotas(project_id)?;

        for (name, limit) in quotas.iter_mut() {
            if let Some(hard_limit) = overrides.get(name) {
                *limit = *hard_limit;
            }
        }

        debug!(project_id, overrides = overrides.len(), "resolved project quotas");
        Ok(quotas)
    }

    fn limit_check(
        &self,
        resources: &ResourceRegistry,
        values: &BTreeMap<String, i64>,
        project_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<(), QuotaError> {
        ensure_known(resources, values, false)?;
        let limits = self.effective_limits(resources, project_id)?;

        debug!(
            project_id = project_id.unwrap_or("-"),
            user_id = user_id.unwrap_or("-"),
            checked = values.len(),
            "checking quota limits"
        );
        ensure_within(values.iter().map(|(name, value)| (name, *value)), &limits)
    }

    fn usage_check(
        &self,
        resources: &ResourceRegistry,
        deltas: &BTreeMap<String, i64>,
        args: &CountArgs,
    ) -> Result<(), QuotaError> {
        ensure_known(resources, deltas, true)?;
        let limits = self.effective_limits(resources, args.project_id.as_deref())?;

        let mut proposed = Vec::with_capacity(deltas.len());
        for (name, delta) in deltas {
            let current = match resources.get(name).and_then(|resource| resource.count(args)) {
                Some(count) => count?,
                None => return Err(QuotaError::ResourceUnknown(vec![name.clone()])),
            };
            debug!(resource = %name, current, delta, "counted resource usage");
            proposed.push((name, current.saturating_add(*delta)));
        }

        ensure_within(proposed.into_iter(), &limits)
    }
}

/// Treats every resource as unlimited.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDriver;

impl NoopDriver {
    fn unlimited(resources: &ResourceRegistry) -> BTreeMap<String, i64> {
        resources
            .iter()
            .map(|resource| (resource.name().to_string(), UNLIMITED))
            .collect()
    }
}

impl QuotaDriver for NoopDriver {
    fn get_defaults(
        &self,
        resources: &ResourceRegistry,
    ) -> Result<BTreeMap<String, i64>, QuotaError> {
        Ok(Self::unlimited(resources))
    }

    fn get_project_quotas(
        &self,
        resources: &ResourceRegistry,
        _project_id: &str,
    ) -> Result<BTreeMap<String, i64>, QuotaError> {
        Ok(Self::unlimited(resources))
    }

    fn limit_check(
        &self,
        resources: &ResourceRegistry,
        values: &BTreeMap<String, i64>,
        _project_id: Option<&str>,
        _user_id: Option<&str>,
    ) -> Result<(), QuotaError> {
        ensure_known(resources, values, false)?;
        ensure_within(
            values.iter().map(|(name, value)| (name, *value)),
            &Self::unlimited(resources),
        )
    }

    fn usage_check(
        &self,
        resources: &ResourceRegistry,
        deltas: &BTreeMap<String, i64>,
        _args: &CountArgs,
    ) -> Result<(), QuotaError> {
        ensure_known(resources, deltas, true)
    }
}

/// Rejects keys that are not registered resources of the requested kind.
fn ensure_known(
    resources: &ResourceRegistry,
    values: &BTreeMap<String, i64>,
    countable: bool,
) -> Result<(), QuotaError> {
    let unknown: Vec<String> = values
        .keys()
        .filter(|name| {
            resources
                .get(name)
                .map_or(true, |resource| resource.is_countable() != countable)
        })
        .cloned()
        .collect();

    if unknown.is_empty() {
        Ok(())
    } else {
        Err(QuotaError::ResourceUnknown(unknown))
    }
}

fn ensure_within<'a, I>(proposed: I, limits: &BTreeMap<String, i64>) -> Result<(), QuotaError>
where
    I: Iterator<Item = (&'a String, i64)>,
{
    let mut overs: Vec<String> = proposed
        .filter(|(name, value)| {
            let limit = limits.get(*name).copied().unwrap_or(UNLIMITED);
            limit >= 0 && *value > limit
        })
        .map(|(name, _)| name.clone())
        .collect();

    if overs.is_empty() {
        return Ok(());
    }
    overs.sort();
    Err(QuotaError::OverQuota(overs))
}
