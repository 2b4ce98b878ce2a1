//! Node entity
//!
//! A `Node` is one managed bare-metal machine. Its provisioning position is
//! only ever changed through [`Node::apply_event`], which routes through the
//! transition table in [`crate::fsm`].

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{ProvisionError, Result};
use crate::fsm::{ProvisionMachine, Transition, TransitionError};
use crate::states::{Event, PowerState, ProvisionState};
use crate::version::{ApiVersion, Feature};

/// Free-form JSON object field.
pub type JsonObject = Map<String, Value>;

/// Hostname-safe names (accepted before 1.10)
static HOSTNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9\-]{0,61}[a-z0-9])?$").expect("hostname regex is valid")
});

/// RFC 3986 unreserved characters (accepted from 1.10)
static UNRESERVED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9\-._~]+$").expect("unreserved regex is valid"));

const MAX_NAME_LEN: usize = 255;

/// Check a logical name against the rules of `version`.
///
/// Names that parse as UUIDs are refused since lookups try UUIDs first.
pub fn validate_name(name: &str, version: ApiVersion) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN || Uuid::parse_str(name).is_ok() {
        return Err(ProvisionError::InvalidName(name.to_string()));
    }
    let re = if version.supports(Feature::Rfc3986Names) {
        &*UNRESERVED_RE
    } else {
        &*HOSTNAME_RE
    };
    if !re.is_match(name) {
        return Err(ProvisionError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// One step of a cleaning run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanStep {
    /// Driver interface the step belongs to (e.g. `deploy`, `management`)
    pub interface: String,
    pub step: String,
    /// Steps run in descending priority; 0 disables the step
    pub priority: u32,
    #[serde(default)]
    pub args: JsonObject,
}

impl CleanStep {
    pub fn new(interface: &str, step: &str, priority: u32) -> Self {
        Self {
            interface: interface.to_string(),
            step: step.to_string(),
            priority,
            args: JsonObject::new(),
        }
    }
}

/// Enrollment request body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewNode {
    pub driver: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Client-chosen UUID; generated when absent
    #[serde(default)]
    pub uuid: Option<Uuid>,
    #[serde(default)]
    pub properties: JsonObject,
    #[serde(default)]
    pub driver_info: JsonObject,
    #[serde(default)]
    pub instance_info: JsonObject,
    #[serde(default)]
    pub extra: JsonObject,
}

/// A managed bare-metal machine.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub uuid: Uuid,
    pub name: Option<String>,
    pub driver: String,

    provision_state: ProvisionState,
    target_provision_state: Option<ProvisionState>,
    pub provision_updated_at: Option<DateTime<Utc>>,

    pub power_state: Option<PowerState>,
    pub target_power_state: Option<PowerState>,

    pub maintenance: bool,
    pub maintenance_reason: Option<String>,
    pub last_error: Option<String>,
    /// Conductor host holding the node lock
    pub reservation: Option<String>,

    pub properties: JsonObject,
    pub driver_info: JsonObject,
    pub driver_internal_info: JsonObject,
    pub instance_info: JsonObject,
    pub extra: JsonObject,

    /// Step currently (or most recently, on failure) being cleaned
    pub clean_step: Option<CleanStep>,

    pub inspection_started_at: Option<DateTime<Utc>>,
    pub inspection_finished_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Node {
    /// Build a node from an enrollment request.
    ///
    /// The initial state depends on the negotiated version: `enroll` from
    /// 1.11, `available` before.
    pub fn enroll(req: NewNode, version: ApiVersion) -> Result<Self> {
        if req.driver.trim().is_empty() {
            return Err(ProvisionError::validation("driver is required"));
        }
        if let Some(name) = &req.name {
            if !version.supports(Feature::LogicalNames) {
                return Err(ProvisionError::not_acceptable(
                    "Logical node names",
                    version,
                    Feature::LogicalNames.min_version(),
                ));
            }
            validate_name(name, version)?;
        }

        let initial = initial_state(version);
        Ok(Self {
            uuid: req.uuid.unwrap_or_else(Uuid::new_v4),
            name: req.name,
            driver: req.driver,
            provision_state: initial,
            target_provision_state: None,
            provision_updated_at: None,
            power_state: None,
            target_power_state: None,
            maintenance: false,
            maintenance_reason: None,
            last_error: None,
            reservation: None,
            properties: req.properties,
            driver_info: req.driver_info,
            driver_internal_info: JsonObject::new(),
            instance_info: req.instance_info,
            extra: req.extra,
            clean_step: None,
            inspection_started_at: None,
            inspection_finished_at: None,
            created_at: Utc::now(),
            updated_at: None,
        })
    }

    #[inline]
    pub fn provision_state(&self) -> ProvisionState {
        self.provision_state
    }

    #[inline]
    pub fn target_provision_state(&self) -> Option<ProvisionState> {
        self.target_provision_state
    }

    /// Fire a state machine event on this node.
    ///
    /// On error the node is unchanged.
    pub fn apply_event(&mut self, event: Event) -> std::result::Result<Transition, TransitionError> {
        let mut machine =
            ProvisionMachine::resume(self.provision_state, self.target_provision_state);
        let transition = machine.process_event(event)?;

        let now = Utc::now();
        self.provision_state = machine.current();
        self.target_provision_state = machine.target();
        self.provision_updated_at = Some(now);
        self.updated_at = Some(now);
        Ok(transition)
    }

    /// Set the maintenance overlay with an optional reason.
    pub fn set_maintenance(&mut self, reason: Option<String>) {
        self.maintenance = true;
        self.maintenance_reason = reason;
        self.touch();
    }

    /// Clear the maintenance overlay and its reason.
    pub fn clear_maintenance(&mut self) {
        self.maintenance = false;
        self.maintenance_reason = None;
        self.touch();
    }

    /// True if the node may be deregistered right now.
    pub fn is_deletable(&self) -> bool {
        self.reservation.is_none() && (self.maintenance || self.provision_state.allows_delete())
    }

    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}

/// Provision state a freshly enrolled node starts in.
pub fn initial_state(version: ApiVersion) -> ProvisionState {
    if version.supports(Feature::EnrollDefault) {
        ProvisionState::Enroll
    } else {
        ProvisionState::Available
    }
}
