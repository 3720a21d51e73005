use serde::{Deserialize, Serialize};

use crate::storage::{DomainUpdate, NewSubscriber, SubscriberUpdate};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDomainRequest {
    pub name: String,
    pub user_id: Option<String>,
}

/// A domain stays with the project that created it, so `project_id` is
/// rejected here rather than ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateDomainRequest {
    pub name: Option<String>,
    pub user_id: Option<String>,
    pub disabled: Option<bool>,
}

impl From<UpdateDomainRequest> for DomainUpdate {
    fn from(request: UpdateDomainRequest) -> Self {
        DomainUpdate {
            name: request.name,
            user_id: request.user_id,
            disabled: request.disabled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscriberRequest {
    pub username: String,
    pub domain_id: String,
    #[serde(default)]
    pub email_address: String,
    #[serde(default)]
    pub rpid: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub disabled: bool,
    pub user_id: Option<String>,
}

impl CreateSubscriberRequest {
    pub fn into_new_subscriber(self, project_id: &str) -> NewSubscriber {
        NewSubscriber {
            username: self.username,
            domain_id: self.domain_id,
            email_address: self.email_address,
            rpid: self.rpid,
            description: self.description,
            disabled: self.disabled,
            project_id: Some(project_id.to_string()),
            user_id: self.user_id,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSubscriberRequest {
    pub email_address: Option<String>,
    pub rpid: Option<String>,
    pub description: Option<String>,
    pub disabled: Option<bool>,
}

impl From<UpdateSubscriberRequest> for SubscriberUpdate {
    fn from(request: UpdateSubscriberRequest) -> Self {
        SubscriberUpdate {
            email_address: request.email_address,
            rpid: request.rpid,
            description: request.description,
            disabled: request.disabled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub details: Option<serde_json::Value>,
}
