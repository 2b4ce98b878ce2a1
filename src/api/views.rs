//! Version-aware JSON rendering of nodes
//!
//! Which fields a client sees depends on the negotiated version. The state
//! strings themselves are never gated, except that `available` renders as
//! `null` at 1.1.

use serde_json::{json, Map, Value};

use crate::error::{ProvisionError, Result};
use crate::node::Node;
use crate::states::ProvisionState;
use crate::version::{ApiVersion, Feature};

/// Every node field with the feature that introduced it.
const NODE_FIELDS: &[(&str, Option<Feature>)] = &[
    ("uuid", None),
    ("name", Some(Feature::LogicalNames)),
    ("driver", None),
    ("provision_state", None),
    ("target_provision_state", None),
    ("provision_updated_at", None),
    ("power_state", None),
    ("target_power_state", None),
    ("maintenance", None),
    ("maintenance_reason", None),
    ("last_error", None),
    ("reservation", None),
    ("properties", None),
    ("driver_info", None),
    ("driver_internal_info", Some(Feature::DriverInternalInfo)),
    ("instance_info", None),
    ("extra", None),
    ("clean_step", Some(Feature::CleanStep)),
    ("inspection_started_at", Some(Feature::Inspection)),
    ("inspection_finished_at", Some(Feature::Inspection)),
    ("created_at", None),
    ("updated_at", None),
];

/// Fields of the brief list view.
const SUMMARY_FIELDS: &[&str] = &["uuid", "name", "power_state", "provision_state", "maintenance"];

/// Fields of the `/states` view.
const STATE_FIELDS: &[&str] = &[
    "power_state",
    "target_power_state",
    "provision_state",
    "target_provision_state",
    "provision_updated_at",
    "last_error",
];

fn visible(field: &str, version: ApiVersion) -> bool {
    NODE_FIELDS
        .iter()
        .find(|(name, _)| *name == field)
        .is_some_and(|(_, feature)| feature.is_none_or(|f| version.supports(f)))
}

/// Render a provision state for `version`.
pub fn state_value(state: Option<ProvisionState>, version: ApiVersion) -> Value {
    match state {
        Some(ProvisionState::Available) if !version.supports(Feature::AvailableState) => Value::Null,
        Some(state) => Value::String(state.to_string()),
        None => Value::Null,
    }
}

fn field_value(node: &Node, field: &str, version: ApiVersion) -> Value {
    match field {
        "uuid" => json!(node.uuid),
        "name" => json!(node.name),
        "driver" => json!(node.driver),
        "provision_state" => state_value(Some(node.provision_state()), version),
        "target_provision_state" => state_value(node.target_provision_state(), version),
        "provision_updated_at" => json!(node.provision_updated_at),
        "power_state" => json!(node.power_state),
        "target_power_state" => json!(node.target_power_state),
        "maintenance" => json!(node.maintenance),
        "maintenance_reason" => json!(node.maintenance_reason),
        "last_error" => json!(node.last_error),
        "reservation" => json!(node.reservation),
        "properties" => Value::Object(node.properties.clone()),
        "driver_info" => Value::Object(node.driver_info.clone()),
        "driver_internal_info" => Value::Object(node.driver_internal_info.clone()),
        "instance_info" => Value::Object(node.instance_info.clone()),
        "extra" => Value::Object(node.extra.clone()),
        "clean_step" => match &node.clean_step {
            Some(step) => json!(step),
            None => json!({}),
        },
        "inspection_started_at" => json!(node.inspection_started_at),
        "inspection_finished_at" => json!(node.inspection_finished_at),
        "created_at" => json!(node.created_at),
        "updated_at" => json!(node.updated_at),
        _ => Value::Null,
    }
}

/// Self and bookmark links for a resource path such as `nodes/<uuid>`.
pub fn links(base: &str, path: &str) -> Value {
    json!([
        {"href": format!("{}/v1/{}", base, path), "rel": "self"},
        {"href": format!("{}/{}", base, path), "rel": "bookmark"},
    ])
}

fn render(node: &Node, fields: &[&str], version: ApiVersion) -> Map<String, Value> {
    fields
        .iter()
        .filter(|field| visible(field, version))
        .map(|field| (field.to_string(), field_value(node, field, version)))
        .collect()
}

fn with_links(mut object: Map<String, Value>, node: &Node, base: &str) -> Value {
    object.insert("links".into(), links(base, &format!("nodes/{}", node.uuid)));
    Value::Object(object)
}

/// Parse and check a `fields` query value for `version`.
///
/// # Errors
///
/// - `NotAcceptable` before field selection was introduced
/// - `Validation` for unknown or hidden fields
pub fn parse_fields(raw: &str, version: ApiVersion) -> Result<Vec<String>> {
    if !version.supports(Feature::FieldSelection) {
        return Err(ProvisionError::not_acceptable(
            "The fields parameter",
            version,
            Feature::FieldSelection.min_version(),
        ));
    }
    let fields: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();
    let invalid: Vec<&str> = fields
        .iter()
        .map(String::as_str)
        .filter(|f| !visible(f, version))
        .collect();
    if !invalid.is_empty() {
        return Err(ProvisionError::validation(format!(
            "Field(s) \"{}\" are not valid",
            invalid.join(", ")
        )));
    }
    Ok(fields)
}

/// Full node document, or `uuid` plus the chosen `fields` when given.
pub fn node_detail(node: &Node, version: ApiVersion, fields: Option<&[String]>, base: &str) -> Value {
    let names: Vec<&str> = match fields {
        Some(fields) => std::iter::once("uuid")
            .chain(fields.iter().map(String::as_str).filter(|f| *f != "uuid"))
            .collect(),
        None => NODE_FIELDS.iter().map(|(name, _)| *name).collect(),
    };
    with_links(render(node, &names, version), node, base)
}

/// Brief node document used by the plain list.
pub fn node_summary(node: &Node, version: ApiVersion, base: &str) -> Value {
    with_links(render(node, SUMMARY_FIELDS, version), node, base)
}

/// State summary served by `/v1/nodes/<ident>/states`.
pub fn node_states(node: &Node, version: ApiVersion) -> Value {
    Value::Object(render(node, STATE_FIELDS, version))
}
