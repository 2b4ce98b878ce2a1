//! JSON-patch updates of node fields
//!
//! Supports the `add`, `replace` and `remove` operations of RFC 6902 on the
//! writable parts of a node: `/name`, `/driver`, and the free-form objects
//! `/properties`, `/driver_info`, `/instance_info` and `/extra` (whole or one
//! key deep). State fields are only ever changed through actions.

use serde::Deserialize;
use serde_json::Value;
use strum::{Display, EnumString};

use crate::error::{ProvisionError, Result};
use crate::node::{validate_name, JsonObject, Node};
use crate::version::{ApiVersion, Feature};

/// Patch verbs accepted on nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum PatchOp {
    Add,
    Replace,
    Remove,
}

/// One element of a patch document, as received.
#[derive(Debug, Clone, Deserialize)]
pub struct PatchOperation {
    pub op: String,
    pub path: String,
    #[serde(default)]
    pub value: Option<Value>,
}

/// Free-form object fields a patch may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
enum ObjectField {
    Properties,
    DriverInfo,
    InstanceInfo,
    Extra,
}

impl ObjectField {
    fn of(self, node: &mut Node) -> &mut JsonObject {
        match self {
            Self::Properties => &mut node.properties,
            Self::DriverInfo => &mut node.driver_info,
            Self::InstanceInfo => &mut node.instance_info,
            Self::Extra => &mut node.extra,
        }
    }
}

/// Decoded patch target.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Name,
    Driver,
    Object(ObjectField),
    Key(ObjectField, String),
}

/// Fields clients can read but never patch.
const READ_ONLY: &[&str] = &[
    "uuid",
    "provision_state",
    "target_provision_state",
    "power_state",
    "target_power_state",
    "maintenance",
    "maintenance_reason",
    "last_error",
    "reservation",
    "driver_internal_info",
    "clean_step",
    "inspection_started_at",
    "inspection_finished_at",
    "provision_updated_at",
    "created_at",
    "updated_at",
];

/// Undo JSON pointer escaping (`~1` is `/`, `~0` is `~`).
fn unescape(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

fn parse_path(path: &str) -> Result<Target> {
    let rest = path
        .strip_prefix('/')
        .ok_or_else(|| ProvisionError::invalid_patch(format!("'{}' is not a valid path", path)))?;
    let (field, key) = match rest.split_once('/') {
        Some((field, key)) => (field, Some(key)),
        None => (rest, None),
    };

    if READ_ONLY.contains(&field) {
        return Err(ProvisionError::invalid_patch(format!(
            "'/{}' is a read-only attribute",
            field
        )));
    }

    match (field, key) {
        ("name", None) => Ok(Target::Name),
        ("driver", None) => Ok(Target::Driver),
        (field, key) => {
            let object: ObjectField = field.parse().map_err(|_| {
                ProvisionError::invalid_patch(format!("'{}' is not a valid path", path))
            })?;
            match key {
                None => Ok(Target::Object(object)),
                Some(key) if key.is_empty() || key.contains('/') => Err(
                    ProvisionError::invalid_patch(format!("'{}' is nested too deeply", path)),
                ),
                Some(key) => Ok(Target::Key(object, unescape(key))),
            }
        }
    }
}

fn required_value(operation: &PatchOperation) -> Result<Value> {
    operation.value.clone().ok_or_else(|| {
        ProvisionError::invalid_patch(format!("'{}' requires a value", operation.path))
    })
}

fn apply_one(node: &mut Node, operation: &PatchOperation, version: ApiVersion) -> Result<()> {
    let op: PatchOp = operation.op.parse().map_err(|_| {
        ProvisionError::invalid_patch(format!("unsupported operation '{}'", operation.op))
    })?;
    let target = parse_path(&operation.path)?;

    match (target, op) {
        (Target::Name, _) if !version.supports(Feature::LogicalNames) => {
            Err(ProvisionError::not_acceptable(
                "Logical node names",
                version,
                Feature::LogicalNames.min_version(),
            ))
        }
        (Target::Name, PatchOp::Remove) => {
            node.name = None;
            Ok(())
        }
        (Target::Name, _) => match required_value(operation)? {
            Value::Null => {
                node.name = None;
                Ok(())
            }
            Value::String(name) => {
                validate_name(&name, version)?;
                node.name = Some(name);
                Ok(())
            }
            other => Err(ProvisionError::invalid_patch(format!(
                "name must be a string, got {}",
                other
            ))),
        },

        (Target::Driver, PatchOp::Remove) => Err(ProvisionError::invalid_patch(
            "'/driver' is a mandatory attribute and can not be removed",
        )),
        (Target::Driver, _) => match required_value(operation)? {
            Value::String(driver) if !driver.trim().is_empty() => {
                node.driver = driver;
                Ok(())
            }
            other => Err(ProvisionError::invalid_patch(format!(
                "driver must be a non-empty string, got {}",
                other
            ))),
        },

        (Target::Object(field), PatchOp::Remove) => {
            field.of(node).clear();
            Ok(())
        }
        (Target::Object(field), _) => match required_value(operation)? {
            Value::Object(map) => {
                *field.of(node) = map;
                Ok(())
            }
            other => Err(ProvisionError::invalid_patch(format!(
                "{} must be an object, got {}",
                field, other
            ))),
        },

        (Target::Key(field, key), PatchOp::Remove) => {
            field.of(node).remove(&key).map(|_| ()).ok_or_else(|| {
                ProvisionError::invalid_patch(format!("'{}' does not exist", operation.path))
            })
        }
        (Target::Key(field, key), PatchOp::Replace) => {
            let value = required_value(operation)?;
            let object = field.of(node);
            if !object.contains_key(&key) {
                return Err(ProvisionError::invalid_patch(format!(
                    "'{}' does not exist",
                    operation.path
                )));
            }
            object.insert(key, value);
            Ok(())
        }
        (Target::Key(field, key), PatchOp::Add) => {
            let value = required_value(operation)?;
            field.of(node).insert(key, value);
            Ok(())
        }
    }
}

/// Apply every operation in order.
///
/// Operates on the given node in place; callers pass a scratch copy so a
/// failing document leaves the stored node untouched.
pub fn apply(node: &mut Node, operations: &[PatchOperation], version: ApiVersion) -> Result<()> {
    if operations.is_empty() {
        return Err(ProvisionError::invalid_patch("patch document is empty"));
    }
    for operation in operations {
        apply_one(node, operation, version)?;
    }
    node.touch();
    Ok(())
}
