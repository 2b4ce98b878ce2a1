//! Node endpoints
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/v1/nodes` | GET, POST | list (brief), enroll |
//! | `/v1/nodes/detail` | GET | list with every field |
//! | `/v1/nodes/:ident` | GET, PATCH, DELETE | one node |
//! | `/v1/nodes/:ident/states` | GET | state summary |
//! | `/v1/nodes/:ident/states/provision` | PUT | provisioning action |
//! | `/v1/nodes/:ident/states/power` | PUT | power change |
//! | `/v1/nodes/:ident/maintenance` | PUT, DELETE | maintenance overlay |
//! | `/v1/nodes/:ident/management/boot_device` | GET, PUT | boot device |
//! | `/v1/nodes/:ident/management/boot_device/supported` | GET | supported devices |

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::ApiResult;
use super::{base_url, views, AppState};
use crate::error::ProvisionError;
use crate::node::NewNode;
use crate::patch::PatchOperation;
use crate::registry::NodeFilter;
use crate::states::{BootDevice, PowerTarget, ProvisionAction, ProvisionState};
use crate::version::{ApiVersion, Feature};

// ════════════════════════════════════════════════════════════════════════════
// REQUEST TYPES
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct ProvisionRequest {
    target: String,
}

#[derive(Debug, Deserialize)]
struct PowerRequest {
    target: String,
}

#[derive(Debug, Default, Deserialize)]
struct MaintenanceRequest {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BootDeviceRequest {
    boot_device: String,
    #[serde(default)]
    persistent: bool,
}

/// Decode a JSON body, reporting problems in the API's error format.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ProvisionError> {
    serde_json::from_slice(body)
        .map_err(|e| ProvisionError::validation(format!("Invalid request body: {}", e)))
}

fn parse_target<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, ProvisionError> {
    raw.parse()
        .map_err(|_| ProvisionError::validation(format!("\"{}\" is not a valid {}", raw, what)))
}

fn parse_bool(raw: &str) -> Result<bool, ProvisionError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ProvisionError::validation(format!(
            "\"{}\" is not a valid boolean",
            raw
        ))),
    }
}

fn node_location(base: &str, uuid: &uuid::Uuid, suffix: &str) -> String {
    format!("{}/v1/nodes/{}{}", base, uuid, suffix)
}

// ════════════════════════════════════════════════════════════════════════════
// COLLECTION
// ════════════════════════════════════════════════════════════════════════════

fn list_filter(params: &HashMap<String, String>, version: ApiVersion) -> Result<NodeFilter, ProvisionError> {
    let mut filter = NodeFilter::default();
    if let Some(raw) = params.get("maintenance") {
        filter.maintenance = Some(parse_bool(raw)?);
    }
    if let Some(raw) = params.get("provision_state") {
        if !version.supports(Feature::ProvisionStateFilter) {
            return Err(ProvisionError::not_acceptable(
                "The provision_state filter",
                version,
                Feature::ProvisionStateFilter.min_version(),
            ));
        }
        filter.provision_state = Some(parse_target::<ProvisionState>(raw, "provision state")?);
    }
    if let Some(driver) = params.get("driver") {
        filter.driver = Some(driver.clone());
    }
    Ok(filter)
}

/// GET /v1/nodes
pub async fn list_nodes(
    State(state): State<AppState>,
    Extension(version): Extension<ApiVersion>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let filter = list_filter(&params, version)?;
    let fields = params
        .get("fields")
        .map(|raw| views::parse_fields(raw, version))
        .transpose()?;
    let base = base_url(&headers);

    let nodes: Vec<Value> = state
        .conductor
        .list_nodes(&filter)
        .iter()
        .map(|node| match &fields {
            Some(fields) => views::node_detail(node, version, Some(fields.as_slice()), &base),
            None => views::node_summary(node, version, &base),
        })
        .collect();
    Ok(Json(json!({ "nodes": nodes })))
}

/// GET /v1/nodes/detail
pub async fn list_nodes_detail(
    State(state): State<AppState>,
    Extension(version): Extension<ApiVersion>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    if params.contains_key("fields") {
        return Err(ProvisionError::validation("The fields parameter can not be used with detail").into());
    }
    let filter = list_filter(&params, version)?;
    let base = base_url(&headers);
    let nodes: Vec<Value> = state
        .conductor
        .list_nodes(&filter)
        .iter()
        .map(|node| views::node_detail(node, version, None, &base))
        .collect();
    Ok(Json(json!({ "nodes": nodes })))
}

/// POST /v1/nodes
pub async fn create_node(
    State(state): State<AppState>,
    Extension(version): Extension<ApiVersion>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let req: NewNode = parse_body(&body)?;
    let node = state.conductor.create_node(req, version)?;
    let base = base_url(&headers);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, node_location(&base, &node.uuid, ""))],
        Json(views::node_detail(&node, version, None, &base)),
    )
        .into_response())
}

// ════════════════════════════════════════════════════════════════════════════
// SINGLE NODE
// ════════════════════════════════════════════════════════════════════════════

/// GET /v1/nodes/:ident
pub async fn get_node(
    State(state): State<AppState>,
    Extension(version): Extension<ApiVersion>,
    Path(ident): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let fields = params
        .get("fields")
        .map(|raw| views::parse_fields(raw, version))
        .transpose()?;
    let node = state.conductor.get_node(&ident, version)?;
    Ok(Json(views::node_detail(
        &node,
        version,
        fields.as_deref(),
        &base_url(&headers),
    )))
}

/// PATCH /v1/nodes/:ident
pub async fn patch_node(
    State(state): State<AppState>,
    Extension(version): Extension<ApiVersion>,
    Path(ident): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let operations: Vec<PatchOperation> = parse_body(&body)?;
    let node = state.conductor.patch_node(&ident, &operations, version)?;
    Ok(Json(views::node_detail(&node, version, None, &base_url(&headers))))
}

/// DELETE /v1/nodes/:ident
pub async fn delete_node(
    State(state): State<AppState>,
    Extension(version): Extension<ApiVersion>,
    Path(ident): Path<String>,
) -> ApiResult<StatusCode> {
    state.conductor.delete_node(&ident, version)?;
    Ok(StatusCode::NO_CONTENT)
}

// ════════════════════════════════════════════════════════════════════════════
// STATES
// ════════════════════════════════════════════════════════════════════════════

/// GET /v1/nodes/:ident/states
pub async fn get_states(
    State(state): State<AppState>,
    Extension(version): Extension<ApiVersion>,
    Path(ident): Path<String>,
) -> ApiResult<Json<Value>> {
    let node = state.conductor.get_node(&ident, version)?;
    Ok(Json(views::node_states(&node, version)))
}

/// PUT /v1/nodes/:ident/states/provision
pub async fn set_provision_state(
    State(state): State<AppState>,
    Extension(version): Extension<ApiVersion>,
    Path(ident): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let req: ProvisionRequest = parse_body(&body)?;
    let action: ProvisionAction = parse_target(&req.target, "provision action")?;
    let node = state.conductor.do_provision_action(&ident, action, version)?;
    let location = node_location(&base_url(&headers), &node.uuid, "/states");
    Ok((StatusCode::ACCEPTED, [(header::LOCATION, location)]).into_response())
}

/// PUT /v1/nodes/:ident/states/power
pub async fn set_power_state(
    State(state): State<AppState>,
    Extension(version): Extension<ApiVersion>,
    Path(ident): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let req: PowerRequest = parse_body(&body)?;
    let target: PowerTarget = parse_target(&req.target, "power state")?;
    let node = state.conductor.set_power_state(&ident, target, version)?;
    let location = node_location(&base_url(&headers), &node.uuid, "/states");
    Ok((StatusCode::ACCEPTED, [(header::LOCATION, location)]).into_response())
}

// ════════════════════════════════════════════════════════════════════════════
// MAINTENANCE
// ════════════════════════════════════════════════════════════════════════════

/// PUT /v1/nodes/:ident/maintenance
pub async fn set_maintenance(
    State(state): State<AppState>,
    Extension(version): Extension<ApiVersion>,
    Path(ident): Path<String>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let req: MaintenanceRequest = if body.is_empty() {
        MaintenanceRequest::default()
    } else {
        parse_body(&body)?
    };
    state.conductor.set_maintenance(&ident, req.reason, version)?;
    Ok(StatusCode::ACCEPTED)
}

/// DELETE /v1/nodes/:ident/maintenance
pub async fn clear_maintenance(
    State(state): State<AppState>,
    Extension(version): Extension<ApiVersion>,
    Path(ident): Path<String>,
) -> ApiResult<StatusCode> {
    state.conductor.clear_maintenance(&ident, version)?;
    Ok(StatusCode::ACCEPTED)
}

// ════════════════════════════════════════════════════════════════════════════
// MANAGEMENT
// ════════════════════════════════════════════════════════════════════════════

/// GET /v1/nodes/:ident/management/boot_device
pub async fn get_boot_device(
    State(state): State<AppState>,
    Extension(version): Extension<ApiVersion>,
    Path(ident): Path<String>,
) -> ApiResult<Json<Value>> {
    let info = state.conductor.get_boot_device(&ident, version).await?;
    Ok(Json(json!(info)))
}

/// PUT /v1/nodes/:ident/management/boot_device
pub async fn set_boot_device(
    State(state): State<AppState>,
    Extension(version): Extension<ApiVersion>,
    Path(ident): Path<String>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let req: BootDeviceRequest = parse_body(&body)?;
    let device: BootDevice = parse_target(&req.boot_device, "boot device")?;
    state
        .conductor
        .set_boot_device(&ident, device, req.persistent, version)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/nodes/:ident/management/boot_device/supported
pub async fn supported_boot_devices(
    State(state): State<AppState>,
    Extension(version): Extension<ApiVersion>,
    Path(ident): Path<String>,
) -> ApiResult<Json<Value>> {
    let devices = state.conductor.supported_boot_devices(&ident, version)?;
    Ok(Json(json!({ "supported_boot_devices": devices })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_list_filter_parsing() {
        let filter = list_filter(
            &params(&[("maintenance", "true"), ("provision_state", "inspect failed")]),
            ApiVersion::MAX,
        )
        .unwrap();
        assert_eq!(filter.maintenance, Some(true));
        assert_eq!(filter.provision_state, Some(ProvisionState::InspectFail));
    }

    #[test]
    fn test_provision_state_filter_is_gated() {
        let result = list_filter(&params(&[("provision_state", "active")]), ApiVersion::new(1, 8));
        assert!(matches!(result, Err(ProvisionError::NotAcceptable { .. })));
    }

    #[test]
    fn test_bad_filter_values() {
        assert!(list_filter(&params(&[("maintenance", "maybe")]), ApiVersion::MAX).is_err());
        assert!(list_filter(&params(&[("provision_state", "bogus")]), ApiVersion::MAX).is_err());
    }

    #[test]
    fn test_parse_target() {
        let action: ProvisionAction = parse_target("deleted", "provision action").unwrap();
        assert_eq!(action, ProvisionAction::Deleted);
        let power: PowerTarget = parse_target("rebooting", "power state").unwrap();
        assert_eq!(power, PowerTarget::Reboot);
        assert!(parse_target::<ProvisionAction>("explode", "provision action").is_err());
    }

    #[test]
    fn test_parse_body_errors_are_validation() {
        let result: Result<ProvisionRequest, _> = parse_body(&Bytes::from_static(b"{"));
        assert!(matches!(result, Err(ProvisionError::Validation(_))));
    }
}
