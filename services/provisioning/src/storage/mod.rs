pub mod database;
pub mod error;
pub mod schema;

pub use database::{
    DomainRecord, DomainUpdate, NewSubscriber, ProvisioningDatabase, SubscriberRecord,
    SubscriberUpdate,
};
pub use error::StorageError;

pub const PROVISIONING_DB_FILENAME: &str = "provisioning.db";
pub const DEFAULT_QUOTA_CLASS: &str = "default";
