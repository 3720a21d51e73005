use std::sync::Arc;

use crate::storage::ProvisioningDatabase;

use super::resource::Resource;
use super::{DOMAINS_FLAG, DOMAINS_RESOURCE, SUBSCRIBERS_FLAG, SUBSCRIBERS_RESOURCE};

/// Resources registered at startup. Both count rows owned by the project
/// in the count arguments, or every row when no project is given.
pub fn builtin_resources(database: Arc<ProvisioningDatabase>) -> Vec<Resource> {
    let domains_db = Arc::clone(&database);
    let subscribers_db = database;

    vec![
        Resource::countable(DOMAINS_RESOURCE, Some(DOMAINS_FLAG), move |args| {
            domains_db.count_domains(args.project_id.as_deref())
        }),
        Resource::countable(SUBSCRIBERS_RESOURCE, Some(SUBSCRIBERS_FLAG), move |args| {
            subscribers_db.count_subscribers(args.project_id.as_deref())
        }),
    ]
}
