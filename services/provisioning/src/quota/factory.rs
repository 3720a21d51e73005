use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use super::driver::{DatabaseDriver, NoopDriver, QuotaDriver, QuotaStore};
use super::error::QuotaError;
use super::resource::QuotaFlags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaDriverKind {
    #[default]
    Database,
    Noop,
}

impl QuotaDriverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaDriverKind::Database => "database",
            QuotaDriverKind::Noop => "noop",
        }
    }
}

impl fmt::Display for QuotaDriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuotaDriverKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "database" | "db" => Ok(QuotaDriverKind::Database),
            "noop" => Ok(QuotaDriverKind::Noop),
            other => Err(format!("unknown quota driver '{other}'")),
        }
    }
}

/// Collaborators handed to driver constructors.
#[derive(Clone)]
pub struct DriverContext {
    pub store: Arc<dyn QuotaStore>,
    pub flags: QuotaFlags,
}

impl DriverContext {
    pub fn new(store: Arc<dyn QuotaStore>, flags: QuotaFlags) -> Self {
        Self { store, flags }
    }
}

pub type DriverConstructor =
    Box<dyn Fn(&DriverContext) -> Arc<dyn QuotaDriver> + Send + Sync>;

/// Maps driver kinds to their constructors. `Default` registers the
/// built-in database and noop drivers.
pub struct DriverFactory {
    constructors: HashMap<QuotaDriverKind, DriverConstructor>,
}

impl DriverFactory {
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, kind: QuotaDriverKind, constructor: F)
    where
        F: Fn(&DriverContext) -> Arc<dyn QuotaDriver> + Send + Sync + 'static,
    {
        self.constructors.insert(kind, Box::new(constructor));
    }

    pub fn build(
        &self,
        kind: QuotaDriverKind,
        context: &DriverContext,
    ) -> Result<Arc<dyn QuotaDriver>, QuotaError> {
        let constructor = self.constructors.get(&kind).ok_or_else(|| {
            QuotaError::DriverUnavailable(format!("no constructor registered for '{kind}'"))
        })?;
        Ok(constructor(context))
    }
}

impl Default for DriverFactory {
    fn default() -> Self {
        let mut factory = Self::empty();
        factory.register(
            QuotaDriverKind::Database,
            |context: &DriverContext| -> Arc<dyn QuotaDriver> {
                Arc::new(DatabaseDriver::new(
                    Arc::clone(&context.store),
                    context.flags.clone(),
                ))
            },
        );
        factory.register(
            QuotaDriverKind::Noop,
            |_: &DriverContext| -> Arc<dyn QuotaDriver> { Arc::new(NoopDriver) },
        );
        factory
    }
}
