use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::{error, info, warn};

use crate::quota::{QuotaError, DOMAINS_RESOURCE, SUBSCRIBERS_RESOURCE};
use crate::storage::{DomainRecord, StorageError, SubscriberRecord, DEFAULT_QUOTA_CLASS};

use super::types::{
    CreateDomainRequest, CreateSubscriberRequest, ErrorResponse, UpdateDomainRequest,
    UpdateSubscriberRequest,
};
use super::ApiState;

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

pub async fn get_quota_defaults(
    State(state): State<Arc<ApiState>>,
    Path(_project_id): Path<String>,
) -> ApiResult<BTreeMap<String, i64>> {
    let defaults = state.quota_engine.get_defaults().map_err(quota_error)?;
    Ok(Json(defaults))
}

pub async fn get_project_quotas(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<String>,
) -> ApiResult<BTreeMap<String, i64>> {
    let quotas = state
        .quota_engine
        .get_project_quotas(&project_id)
        .map_err(quota_error)?;
    Ok(Json(quotas))
}

pub async fn set_project_quotas(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<String>,
    Json(limits): Json<BTreeMap<String, i64>>,
) -> ApiResult<BTreeMap<String, i64>> {
    ensure_registered(&state, &limits)?;

    state
        .database
        .set_project_quotas(&project_id, &limits)
        .map_err(storage_error)?;
    info!(project_id = %project_id, updated = limits.len(), "project quotas updated");

    let quotas = state
        .quota_engine
        .get_project_quotas(&project_id)
        .map_err(quota_error)?;
    Ok(Json(quotas))
}

pub async fn set_default_quota_class(
    State(state): State<Arc<ApiState>>,
    Json(limits): Json<BTreeMap<String, i64>>,
) -> ApiResult<BTreeMap<String, i64>> {
    ensure_registered(&state, &limits)?;

    state
        .database
        .set_quota_class_limits(DEFAULT_QUOTA_CLASS, &limits)
        .map_err(storage_error)?;
    info!(updated = limits.len(), "default quota class updated");

    let defaults = state.quota_engine.get_defaults().map_err(quota_error)?;
    Ok(Json(defaults))
}

pub async fn list_domains(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<String>,
) -> ApiResult<Vec<DomainRecord>> {
    let domains = state
        .database
        .list_domains(Some(project_id.as_str()))
        .map_err(storage_error)?;
    Ok(Json(domains))
}

pub async fn create_domain(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<String>,
    Json(request): Json<CreateDomainRequest>,
) -> ApiResult<DomainRecord> {
    if request.name.trim().is_empty() {
        return Err(bad_request("invalid_name", "name cannot be empty"));
    }

    state
        .quota_engine
        .usage_check(
            Some(project_id.as_str()),
            request.user_id.as_deref(),
            &single_delta(DOMAINS_RESOURCE),
        )
        .map_err(quota_error)?;

    let domain = state
        .database
        .create_domain(&request.name, Some(project_id.as_str()), request.user_id.as_deref())
        .map_err(storage_error)?;

    info!(project_id = %project_id, uuid = %domain.uuid, name = %domain.name, "domain created");
    Ok(Json(domain))
}

pub async fn get_domain(
    State(state): State<Arc<ApiState>>,
    Path(uuid): Path<String>,
) -> ApiResult<DomainRecord> {
    let domain = state.database.get_domain(&uuid).map_err(storage_error)?;
    Ok(Json(domain))
}

pub async fn update_domain(
    State(state): State<Arc<ApiState>>,
    Path(uuid): Path<String>,
    Json(request): Json<UpdateDomainRequest>,
) -> ApiResult<DomainRecord> {
    if matches!(request.name.as_deref(), Some(name) if name.trim().is_empty()) {
        return Err(bad_request("invalid_name", "name cannot be empty"));
    }

    let domain = state
        .database
        .update_domain(&uuid, &request.into())
        .map_err(storage_error)?;
    Ok(Json(domain))
}

pub async fn delete_domain(
    State(state): State<Arc<ApiState>>,
    Path(uuid): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.database.delete_domain(&uuid).map_err(storage_error)?;
    info!(uuid = %uuid, "domain deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_subscribers(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<String>,
) -> ApiResult<Vec<SubscriberRecord>> {
    let subscribers = state
        .database
        .list_subscribers(Some(project_id.as_str()))
        .map_err(storage_error)?;
    Ok(Json(subscribers))
}

pub async fn create_subscriber(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<String>,
    Json(request): Json<CreateSubscriberRequest>,
) -> ApiResult<SubscriberRecord> {
    if request.username.trim().is_empty() {
        return Err(bad_request("invalid_username", "username cannot be empty"));
    }

    state
        .quota_engine
        .usage_check(
            Some(project_id.as_str()),
            request.user_id.as_deref(),
            &single_delta(SUBSCRIBERS_RESOURCE),
        )
        .map_err(quota_error)?;

    let subscriber = state
        .database
        .create_subscriber(&request.into_new_subscriber(&project_id))
        .map_err(storage_error)?;

    info!(
        project_id = %project_id,
        uuid = %subscriber.uuid,
        username = %subscriber.username,
        "subscriber created"
    );
    Ok(Json(subscriber))
}

pub async fn get_subscriber(
    State(state): State<Arc<ApiState>>,
    Path(uuid): Path<String>,
) -> ApiResult<SubscriberRecord> {
    let subscriber = state.database.get_subscriber(&uuid).map_err(storage_error)?;
    Ok(Json(subscriber))
}

pub async fn update_subscriber(
    State(state): State<Arc<ApiState>>,
    Path(uuid): Path<String>,
    Json(request): Json<UpdateSubscriberRequest>,
) -> ApiResult<SubscriberRecord> {
    let subscriber = state
        .database
        .update_subscriber(&uuid, &request.into())
        .map_err(storage_error)?;
    Ok(Json(subscriber))
}

pub async fn delete_subscriber(
    State(state): State<Arc<ApiState>>,
    Path(uuid): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .database
        .delete_subscriber(&uuid)
        .map_err(storage_error)?;
    info!(uuid = %uuid, "subscriber deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn health_check(State(state): State<Arc<ApiState>>) -> ApiResult<serde_json::Value> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": "sip-provisioning",
        "quota_driver": state.config.quota_driver,
    })))
}

fn single_delta(resource: &str) -> BTreeMap<String, i64> {
    BTreeMap::from([(resource.to_string(), 1)])
}

fn ensure_registered(state: &ApiState, limits: &BTreeMap<String, i64>) -> Result<(), ApiError> {
    let registry = state.quota_engine.registry();
    let unknown: Vec<String> = limits
        .keys()
        .filter(|name| registry.get(name).is_none())
        .cloned()
        .collect();

    if unknown.is_empty() {
        Ok(())
    } else {
        Err(quota_error(QuotaError::ResourceUnknown(unknown)))
    }
}

fn quota_error(err: QuotaError) -> ApiError {
    match err {
        QuotaError::ResourceUnknown(names) => error_response(
            StatusCode::NOT_FOUND,
            "quota_resource_unknown",
            &format!("unknown quota resources {names:?}"),
            Some(serde_json::json!({ "resources": names })),
        ),
        QuotaError::OverQuota(names) => {
            warn!(resources = ?names, "request rejected over quota");
            error_response(
                StatusCode::FORBIDDEN,
                "over_quota",
                "quota exceeded",
                Some(serde_json::json!({ "resources": names })),
            )
        }
        QuotaError::Storage(err) => storage_error(err),
        other => internal_error(other),
    }
}

fn storage_error(err: StorageError) -> ApiError {
    match err {
        StorageError::DomainNotFound(_) => {
            error_response(StatusCode::NOT_FOUND, "domain_not_found", &err.to_string(), None)
        }
        StorageError::SubscriberNotFound(_) => error_response(
            StatusCode::NOT_FOUND,
            "subscriber_not_found",
            &err.to_string(),
            None,
        ),
        StorageError::DomainAlreadyExists(_) => error_response(
            StatusCode::CONFLICT,
            "domain_already_exists",
            &err.to_string(),
            None,
        ),
        StorageError::SubscriberAlreadyExists { .. } => error_response(
            StatusCode::CONFLICT,
            "subscriber_already_exists",
            &err.to_string(),
            None,
        ),
        StorageError::DomainInUse(_) => {
            error_response(StatusCode::CONFLICT, "domain_in_use", &err.to_string(), None)
        }
        StorageError::InvalidQuotaValue(_) => bad_request("invalid_limit", &err.to_string()),
        other => internal_error(other),
    }
}

fn bad_request(code: &str, message: &str) -> ApiError {
    error_response(StatusCode::BAD_REQUEST, code, message, None)
}

fn error_response(
    status: StatusCode,
    code: &str,
    message: &str,
    details: Option<serde_json::Value>,
) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
            code: code.to_string(),
            details,
        }),
    )
}

fn internal_error<E: std::fmt::Display>(err: E) -> ApiError {
    error!(error = %err, "provisioning API internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "internal server error".to_string(),
            code: "internal_error".to_string(),
            details: Some(serde_json::json!({ "message": err.to_string() })),
        }),
    )
}
