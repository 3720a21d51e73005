use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::storage::StorageError;

use super::UNLIMITED;

/// Arguments handed verbatim to a resource's counting function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountArgs {
    pub project_id: Option<String>,
    pub user_id: Option<String>,
    pub filters: BTreeMap<String, String>,
}

impl CountArgs {
    pub fn for_project(project_id: Option<&str>, user_id: Option<&str>) -> Self {
        Self {
            project_id: project_id.map(str::to_string),
            user_id: user_id.map(str::to_string),
            filters: BTreeMap::new(),
        }
    }
}

pub type CountFn = Arc<dyn Fn(&CountArgs) -> Result<i64, StorageError> + Send + Sync>;

/// Configured values of the quota flags, e.g. `quota_domains = 1`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotaFlags(HashMap<String, i64>);

impl QuotaFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, flag: &str, value: i64) -> Self {
        self.0.insert(flag.to_string(), value);
        self
    }

    pub fn get(&self, flag: &str) -> Option<i64> {
        self.0.get(flag).copied()
    }
}

/// A single quota-controlled dimension. Resources carrying a counter are
/// countable; the rest are simple limits.
#[derive(Clone)]
pub struct Resource {
    name: String,
    flag: Option<String>,
    counter: Option<CountFn>,
}

impl Resource {
    pub fn new(name: impl Into<String>, flag: Option<&str>) -> Self {
        Self {
            name: name.into(),
            flag: flag.map(str::to_string),
            counter: None,
        }
    }

    pub fn countable<F>(name: impl Into<String>, flag: Option<&str>, count: F) -> Self
    where
        F: Fn(&CountArgs) -> Result<i64, StorageError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            flag: flag.map(str::to_string),
            counter: Some(Arc::new(count)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flag(&self) -> Option<&str> {
        self.flag.as_deref()
    }

    pub fn is_countable(&self) -> bool {
        self.counter.is_some()
    }

    /// Built-in default limit: the configured flag value, or unlimited when
    /// the resource has no flag.
    pub fn default_limit(&self, flags: &QuotaFlags) -> i64 {
        self.flag
            .as_deref()
            .and_then(|flag| flags.get(flag))
            .unwrap_or(UNLIMITED)
    }

    /// Runs the counting function. `None` for simple resources.
    pub fn count(&self, args: &CountArgs) -> Option<Result<i64, StorageError>> {
        self.counter.as_ref().map(|count| count(args))
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("name", &self.name)
            .field("flag", &self.flag)
            .field("countable", &self.is_countable())
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    resources: HashMap<String, Resource>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last registration of a name wins.
    pub fn register(&mut self, resource: Resource) {
        self.resources.insert(resource.name.clone(), resource);
    }

    pub fn register_many<I>(&mut self, resources: I)
    where
        I: IntoIterator<Item = Resource>,
    {
        for resource in resources {
            self.register(resource);
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.resources.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get(&self, name: &str) -> Option<&Resource> {
        self.resources.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
