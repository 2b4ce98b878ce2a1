//! Hardware-control backends
//!
//! The conductor never talks to hardware directly. Everything that touches a
//! machine (power, boot device, cleaning, inspection, deploy, tear down) goes
//! through the [`HardwareBackend`] trait, selected by the node's `driver`.
//!
//! # Contract
//!
//! - Calls are blocking; the conductor runs them on the blocking pool and
//!   bounds them with a timeout.
//! - Calls receive a snapshot of the node; they never mutate registry state.
//! - A returned error is recorded as the node's `last_error` and fires the
//!   state machine's `fail` event.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use strum::{Display, EnumString};
use thiserror::Error;
use uuid::Uuid;

use crate::node::{CleanStep, JsonObject, Node};
use crate::states::{BootDevice, PowerState, PowerTarget};

/// Driver names this build knows how to construct.
pub const KNOWN_DRIVERS: &[&str] = &["fake"];

/// Operations a backend performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    Verify,
    Power,
    BootDevice,
    Clean,
    Inspect,
    Deploy,
    TearDown,
}

/// Errors reported by a backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("{operation} failed: {reason}")]
    OperationFailed { operation: String, reason: String },

    #[error("{operation} timed out after {secs} seconds")]
    Timeout { operation: String, secs: u64 },

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl BackendError {
    pub fn failed(operation: Operation, reason: impl Into<String>) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }
}

/// Current boot device as reported by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BootDeviceInfo {
    pub boot_device: Option<BootDevice>,
    pub persistent: Option<bool>,
}

/// Hardware facts discovered by inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectedProperties {
    pub cpus: u32,
    pub memory_mb: u64,
    pub local_gb: u64,
    pub cpu_arch: String,
}

impl InspectedProperties {
    /// Merge the discovered facts into a node's `properties`.
    pub fn merge_into(&self, properties: &mut JsonObject) {
        properties.insert("cpus".into(), self.cpus.into());
        properties.insert("memory_mb".into(), self.memory_mb.into());
        properties.insert("local_gb".into(), self.local_gb.into());
        properties.insert("cpu_arch".into(), self.cpu_arch.clone().into());
    }
}

/// Hardware-control seam for one driver.
pub trait HardwareBackend: Send + Sync {
    /// Driver name this backend serves.
    fn name(&self) -> &str;

    /// Check that the node's driver_info is sufficient to control power.
    fn validate_power(&self, node: &Node) -> Result<(), BackendError>;

    fn get_power_state(&self, node: &Node) -> Result<PowerState, BackendError>;

    /// Apply a power change and return the resulting state.
    fn set_power_state(&self, node: &Node, target: PowerTarget)
        -> Result<PowerState, BackendError>;

    fn supported_boot_devices(&self, node: &Node) -> Vec<BootDevice>;

    fn get_boot_device(&self, node: &Node) -> Result<BootDeviceInfo, BackendError>;

    fn set_boot_device(
        &self,
        node: &Node,
        device: BootDevice,
        persistent: bool,
    ) -> Result<(), BackendError>;

    /// Clean steps offered for this node, in any order.
    fn clean_steps(&self, node: &Node) -> Vec<CleanStep>;

    fn execute_clean_step(&self, node: &Node, step: &CleanStep) -> Result<(), BackendError>;

    fn inspect(&self, node: &Node) -> Result<InspectedProperties, BackendError>;

    fn deploy(&self, node: &Node) -> Result<(), BackendError>;

    fn tear_down(&self, node: &Node) -> Result<(), BackendError>;
}

/// Enabled drivers, keyed by name.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: BTreeMap<String, Arc<dyn HardwareBackend>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry for the configured driver names.
    ///
    /// Unknown names are rejected; config validation catches them first.
    pub fn from_names(names: &[String], fake: FakeConfig) -> Result<Self, BackendError> {
        let mut registry = Self::new();
        for name in names {
            match name.as_str() {
                "fake" => registry.register(Arc::new(FakeBackend::new(fake.clone()))),
                other => {
                    return Err(BackendError::Unsupported(format!("unknown driver '{}'", other)));
                }
            }
        }
        Ok(registry)
    }

    pub fn register(&mut self, backend: Arc<dyn HardwareBackend>) {
        self.drivers.insert(backend.name().to_string(), backend);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn HardwareBackend>> {
        self.drivers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }

    /// Driver names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.drivers.keys().cloned().collect()
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.names())
            .finish()
    }
}

// ============================================================================
// Fake backend
// ============================================================================

/// Tunables for [`FakeBackend`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct FakeConfig {
    /// Simulated latency of every backend call
    #[serde(default)]
    pub step_delay_ms: u64,
}

/// Per-node state simulated by the fake backend.
#[derive(Debug, Clone, Copy)]
struct FakeMachine {
    power: PowerState,
    boot_device: BootDevice,
    persistent: bool,
}

impl Default for FakeMachine {
    fn default() -> Self {
        Self {
            power: PowerState::PowerOff,
            boot_device: BootDevice::Disk,
            persistent: false,
        }
    }
}

/// In-memory backend that simulates hardware.
///
/// Failures are injected per node through `driver_info.fake_fail`, either a
/// single operation name (`"clean"`) or a list (`["verify", "deploy"]`).
/// Operation names match [`Operation`]'s snake_case strings.
#[derive(Debug, Default)]
pub struct FakeBackend {
    config: FakeConfig,
    machines: Mutex<HashMap<Uuid, FakeMachine>>,
}

impl FakeBackend {
    pub fn new(config: FakeConfig) -> Self {
        Self {
            config,
            machines: Mutex::new(HashMap::new()),
        }
    }

    fn simulate(&self, node: &Node, operation: Operation) -> Result<(), BackendError> {
        if self.config.step_delay_ms > 0 {
            thread::sleep(Duration::from_millis(self.config.step_delay_ms));
        }
        if should_fail(node, operation) {
            tracing::debug!(node = %node.uuid, %operation, "fake backend injecting failure");
            return Err(BackendError::failed(operation, "injected failure"));
        }
        Ok(())
    }

    fn machine(&self, node: &Node) -> FakeMachine {
        self.machines.lock().get(&node.uuid).copied().unwrap_or_default()
    }

    fn update_machine(&self, node: &Node, f: impl FnOnce(&mut FakeMachine)) {
        let mut machines = self.machines.lock();
        f(machines.entry(node.uuid).or_default());
    }
}

/// True if `driver_info.fake_fail` names `operation`.
fn should_fail(node: &Node, operation: Operation) -> bool {
    let wanted = operation.to_string();
    match node.driver_info.get("fake_fail") {
        Some(serde_json::Value::String(op)) => *op == wanted,
        Some(serde_json::Value::Array(ops)) => ops.iter().any(|op| op.as_str() == Some(&wanted)),
        _ => false,
    }
}

impl HardwareBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    fn validate_power(&self, node: &Node) -> Result<(), BackendError> {
        self.simulate(node, Operation::Verify)
    }

    fn get_power_state(&self, node: &Node) -> Result<PowerState, BackendError> {
        Ok(self.machine(node).power)
    }

    fn set_power_state(
        &self,
        node: &Node,
        target: PowerTarget,
    ) -> Result<PowerState, BackendError> {
        self.simulate(node, Operation::Power)?;
        let state = target.resulting_state();
        self.update_machine(node, |m| m.power = state);
        Ok(state)
    }

    fn supported_boot_devices(&self, _node: &Node) -> Vec<BootDevice> {
        vec![BootDevice::Pxe, BootDevice::Disk, BootDevice::Cdrom, BootDevice::Bios]
    }

    fn get_boot_device(&self, node: &Node) -> Result<BootDeviceInfo, BackendError> {
        let machine = self.machine(node);
        Ok(BootDeviceInfo {
            boot_device: Some(machine.boot_device),
            persistent: Some(machine.persistent),
        })
    }

    fn set_boot_device(
        &self,
        node: &Node,
        device: BootDevice,
        persistent: bool,
    ) -> Result<(), BackendError> {
        self.simulate(node, Operation::BootDevice)?;
        self.update_machine(node, |m| {
            m.boot_device = device;
            m.persistent = persistent;
        });
        Ok(())
    }

    fn clean_steps(&self, _node: &Node) -> Vec<CleanStep> {
        vec![
            CleanStep::new("management", "reset_bios_settings", 5),
            CleanStep::new("deploy", "erase_devices", 10),
            CleanStep::new("raid", "delete_configuration", 0),
        ]
    }

    fn execute_clean_step(&self, node: &Node, step: &CleanStep) -> Result<(), BackendError> {
        self.simulate(node, Operation::Clean)
            .map_err(|_| BackendError::failed(Operation::Clean, format!("step {} failed", step.step)))
    }

    fn inspect(&self, node: &Node) -> Result<InspectedProperties, BackendError> {
        self.simulate(node, Operation::Inspect)?;
        Ok(InspectedProperties {
            cpus: 8,
            memory_mb: 16384,
            local_gb: 100,
            cpu_arch: "x86_64".to_string(),
        })
    }

    fn deploy(&self, node: &Node) -> Result<(), BackendError> {
        self.simulate(node, Operation::Deploy)?;
        self.update_machine(node, |m| {
            m.power = PowerState::PowerOn;
            m.boot_device = BootDevice::Disk;
        });
        Ok(())
    }

    fn tear_down(&self, node: &Node) -> Result<(), BackendError> {
        self.simulate(node, Operation::TearDown)?;
        self.update_machine(node, |m| m.power = PowerState::PowerOff);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NewNode;
    use crate::version::ApiVersion;
    use serde_json::json;

    fn node_with_driver_info(info: serde_json::Value) -> Node {
        let driver_info = info.as_object().cloned().unwrap_or_default();
        Node::enroll(
            NewNode {
                driver: "fake".to_string(),
                driver_info,
                ..Default::default()
            },
            ApiVersion::MAX,
        )
        .unwrap()
    }

    #[test]
    fn test_operation_strings() {
        assert_eq!(Operation::TearDown.to_string(), "tear_down");
        assert_eq!("boot_device".parse::<Operation>().unwrap(), Operation::BootDevice);
    }

    #[test]
    fn test_fake_fail_single_and_list() {
        let node = node_with_driver_info(json!({"fake_fail": "clean"}));
        assert!(should_fail(&node, Operation::Clean));
        assert!(!should_fail(&node, Operation::Deploy));

        let node = node_with_driver_info(json!({"fake_fail": ["verify", "deploy"]}));
        assert!(should_fail(&node, Operation::Verify));
        assert!(should_fail(&node, Operation::Deploy));
        assert!(!should_fail(&node, Operation::Inspect));
    }

    #[test]
    fn test_fake_power_round_trip() {
        let backend = FakeBackend::default();
        let node = node_with_driver_info(json!({}));
        assert_eq!(backend.get_power_state(&node).unwrap(), PowerState::PowerOff);
        assert_eq!(
            backend.set_power_state(&node, PowerTarget::Reboot).unwrap(),
            PowerState::PowerOn
        );
        assert_eq!(backend.get_power_state(&node).unwrap(), PowerState::PowerOn);
    }

    #[test]
    fn test_fake_boot_device() {
        let backend = FakeBackend::default();
        let node = node_with_driver_info(json!({}));
        backend.set_boot_device(&node, BootDevice::Pxe, true).unwrap();
        let info = backend.get_boot_device(&node).unwrap();
        assert_eq!(info.boot_device, Some(BootDevice::Pxe));
        assert_eq!(info.persistent, Some(true));
    }

    #[test]
    fn test_fake_injected_failure_message() {
        let backend = FakeBackend::default();
        let node = node_with_driver_info(json!({"fake_fail": "inspect"}));
        let err = backend.inspect(&node).unwrap_err();
        assert_eq!(err.to_string(), "inspect failed: injected failure");
    }

    #[test]
    fn test_inspected_properties_merge() {
        let props = InspectedProperties {
            cpus: 4,
            memory_mb: 2048,
            local_gb: 20,
            cpu_arch: "aarch64".to_string(),
        };
        let mut properties = JsonObject::new();
        properties.insert("rack".into(), json!("r1"));
        props.merge_into(&mut properties);
        assert_eq!(properties["cpus"], json!(4));
        assert_eq!(properties["cpu_arch"], json!("aarch64"));
        assert_eq!(properties["rack"], json!("r1"));
    }

    #[test]
    fn test_registry_from_names() {
        let registry = DriverRegistry::from_names(&["fake".to_string()], FakeConfig::default()).unwrap();
        assert!(registry.contains("fake"));
        assert_eq!(registry.names(), vec!["fake".to_string()]);

        let err = DriverRegistry::from_names(&["ipmi".to_string()], FakeConfig::default());
        assert!(err.is_err());
    }
}
