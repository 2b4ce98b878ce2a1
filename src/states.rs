//! Provision and power state vocabulary
//!
//! These enums replace the stringly-typed state names used on the wire with
//! proper Rust types. The `strum` serializations ARE the wire strings, so
//! `to_string()` and `parse()` are the only conversions the API layer needs.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Position of a node in its provisioning lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
pub enum ProvisionState {
    /// Freshly registered; hardware control not yet verified
    #[strum(serialize = "enroll")]
    #[serde(rename = "enroll")]
    Enroll,

    /// Hardware control credentials are being checked
    #[strum(serialize = "verifying")]
    #[serde(rename = "verifying")]
    Verifying,

    /// Verified and under operator control, not offered for deployment
    #[strum(serialize = "manageable")]
    #[serde(rename = "manageable")]
    Manageable,

    /// Hardware introspection in progress
    #[strum(serialize = "inspecting")]
    #[serde(rename = "inspecting")]
    Inspecting,

    #[strum(serialize = "inspect failed")]
    #[serde(rename = "inspect failed")]
    InspectFail,

    /// Clean steps are running
    #[strum(serialize = "cleaning")]
    #[serde(rename = "cleaning")]
    Cleaning,

    #[strum(serialize = "clean failed")]
    #[serde(rename = "clean failed")]
    CleanFail,

    /// Clean and ready to be deployed
    #[strum(serialize = "available")]
    #[serde(rename = "available")]
    Available,

    /// Image is being written to the node
    #[strum(serialize = "deploying")]
    #[serde(rename = "deploying")]
    Deploying,

    #[strum(serialize = "deploy failed")]
    #[serde(rename = "deploy failed")]
    DeployFail,

    /// Deployed and running a workload
    #[strum(serialize = "active")]
    #[serde(rename = "active")]
    Active,

    /// Instance is being torn down
    #[strum(serialize = "deleting")]
    #[serde(rename = "deleting")]
    Deleting,

    /// Tear down failed; operator must rebuild or delete again
    #[strum(serialize = "error")]
    #[serde(rename = "error")]
    Error,
}

impl ProvisionState {
    /// Returns true for states in which the node rests until an operator acts.
    pub const fn is_stable(self) -> bool {
        matches!(
            self,
            Self::Enroll
                | Self::Manageable
                | Self::Available
                | Self::Active
                | Self::InspectFail
                | Self::CleanFail
                | Self::DeployFail
                | Self::Error
        )
    }

    /// Returns true for states that record a failed action.
    pub const fn is_failure(self) -> bool {
        matches!(
            self,
            Self::InspectFail | Self::CleanFail | Self::DeployFail | Self::Error
        )
    }

    /// Stable state a transitional state is heading towards.
    ///
    /// `None` for stable states.
    pub const fn target(self) -> Option<Self> {
        match self {
            Self::Verifying | Self::Inspecting => Some(Self::Manageable),
            Self::Cleaning | Self::Deleting => Some(Self::Available),
            Self::Deploying => Some(Self::Active),
            _ => None,
        }
    }

    /// States in which a node may be deregistered without maintenance mode.
    pub const fn allows_delete(self) -> bool {
        matches!(
            self,
            Self::Enroll
                | Self::Manageable
                | Self::Available
                | Self::InspectFail
                | Self::CleanFail
        )
    }
}

/// Operator-visible provisioning verbs, as sent in `{"target": ...}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProvisionAction {
    Manage,
    Provide,
    Inspect,
    /// Deploy the node
    Active,
    Rebuild,
    /// Tear the deployment down
    Deleted,
}

impl ProvisionAction {
    /// The state machine event this action fires.
    pub const fn event(self) -> Event {
        match self {
            Self::Manage => Event::Manage,
            Self::Provide => Event::Provide,
            Self::Inspect => Event::Inspect,
            Self::Active => Event::Deploy,
            Self::Rebuild => Event::Rebuild,
            Self::Deleted => Event::Delete,
        }
    }

    /// Actions refused while the node is in maintenance.
    pub const fn blocked_by_maintenance(self) -> bool {
        matches!(
            self,
            Self::Provide | Self::Inspect | Self::Active | Self::Rebuild
        )
    }
}

/// Inputs to the provision state machine.
///
/// Operator actions map onto the first six; `Done` and `Fail` are fired by
/// the conductor when background work finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Event {
    Manage,
    Provide,
    Inspect,
    Deploy,
    Rebuild,
    Delete,
    Done,
    Fail,
}

/// Reported power state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
pub enum PowerState {
    #[strum(serialize = "power on")]
    #[serde(rename = "power on")]
    PowerOn,
    #[strum(serialize = "power off")]
    #[serde(rename = "power off")]
    PowerOff,
}

/// Requested power change, as sent in `{"target": ...}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
pub enum PowerTarget {
    #[strum(serialize = "power on")]
    #[serde(rename = "power on")]
    PowerOn,
    #[strum(serialize = "power off")]
    #[serde(rename = "power off")]
    PowerOff,
    #[strum(serialize = "rebooting")]
    #[serde(rename = "rebooting")]
    Reboot,
}

impl PowerTarget {
    /// Power state the node ends up in once the request completes.
    pub const fn resulting_state(self) -> PowerState {
        match self {
            Self::PowerOn | Self::Reboot => PowerState::PowerOn,
            Self::PowerOff => PowerState::PowerOff,
        }
    }
}

/// Boot devices a backend may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BootDevice {
    Pxe,
    Disk,
    Cdrom,
    Bios,
    Safe,
}
