pub mod catalog;
pub mod driver;
pub mod engine;
pub mod error;
pub mod factory;
pub mod resource;

pub use catalog::builtin_resources;
pub use driver::{DatabaseDriver, NoopDriver, QuotaDriver, QuotaStore};
pub use engine::QuotaEngine;
pub use error::QuotaError;
pub use factory::{DriverContext, DriverFactory, QuotaDriverKind};
pub use resource::{CountArgs, CountFn, QuotaFlags, Resource, ResourceRegistry};

/// Limit value meaning "no limit".
pub const UNLIMITED: i64 = -1;

pub const DOMAINS_RESOURCE: &str = "domains";
pub const SUBSCRIBERS_RESOURCE: &str = "subscribers";
pub const DOMAINS_FLAG: &str = "quota_domains";
pub const SUBSCRIBERS_FLAG: &str = "quota_subscribers";
