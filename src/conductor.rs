//! Conductor: drives nodes through the provision state machine
//!
//! The conductor is the only component that fires state machine events. API
//! handlers call it; it validates the request against the node's state and
//! the negotiated version, takes the node's reservation, applies the
//! operator event and hands the long-running part to a tokio task.
//!
//! # Flow of an action
//!
//! ```text
//!   request ──► version gate ──► reserve + maintenance check + table check
//!                                        │
//!                                        ▼
//!                              operator event applied
//!                                        │
//!                 ┌──────────────────────┴───────────────┐
//!                 ▼                                      ▼
//!        stable state reached                  transitional state
//!        (release at once)                     (spawn background work)
//!                                                        │
//!                                                        ▼
//!                                         backend call(s) with timeout
//!                                                        │
//!                                            done / fail + release
//! ```
//!
//! # Design Principles
//!
//! - Request validation happens under the registry lock, so a refused action
//!   never changes the node.
//! - Backend failures never surface as request errors; they are recorded in
//!   `last_error` and fire `fail`.
//! - Nothing retries automatically.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backend::{BackendError, BootDeviceInfo, DriverRegistry, HardwareBackend, Operation};
use crate::config::{ServiceConfig, Timeouts};
use crate::error::{ProvisionError, Result};
use crate::fsm;
use crate::node::{NewNode, Node};
use crate::patch::{self, PatchOperation};
use crate::registry::{NodeFilter, NodeRegistry};
use crate::states::{BootDevice, Event, PowerTarget, ProvisionAction, ProvisionState};
use crate::version::{ApiVersion, Feature};

/// Conductor settings taken from the service configuration.
#[derive(Debug, Clone)]
pub struct ConductorSettings {
    /// Name recorded as the reservation holder
    pub host: String,
    pub automated_clean: bool,
    pub timeouts: Timeouts,
}

impl Default for ConductorSettings {
    fn default() -> Self {
        Self::from(&ServiceConfig::default())
    }
}

impl From<&ServiceConfig> for ConductorSettings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            host: config.host.clone(),
            automated_clean: config.automated_clean,
            timeouts: config.timeouts.clone(),
        }
    }
}

/// Background work started when a node enters a transitional state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Work {
    Verify,
    Clean,
    Inspect,
    Deploy,
    TearDown,
}

impl Work {
    fn for_state(state: ProvisionState) -> Option<Self> {
        match state {
            ProvisionState::Verifying => Some(Self::Verify),
            ProvisionState::Cleaning => Some(Self::Clean),
            ProvisionState::Inspecting => Some(Self::Inspect),
            ProvisionState::Deploying => Some(Self::Deploy),
            ProvisionState::Deleting => Some(Self::TearDown),
            _ => None,
        }
    }
}

/// Feature an action needs, if it is gated by version.
fn required_feature(action: ProvisionAction) -> Option<Feature> {
    match action {
        ProvisionAction::Manage | ProvisionAction::Provide => Some(Feature::ManageableState),
        ProvisionAction::Inspect => Some(Feature::Inspection),
        ProvisionAction::Active | ProvisionAction::Rebuild | ProvisionAction::Deleted => None,
    }
}

/// Shared handle to the conductor. Cloning is cheap.
#[derive(Clone)]
pub struct Conductor {
    registry: Arc<NodeRegistry>,
    drivers: Arc<DriverRegistry>,
    settings: Arc<ConductorSettings>,
    tasks: Arc<Mutex<HashMap<Uuid, JoinHandle<()>>>>,
}

impl std::fmt::Debug for Conductor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conductor")
            .field("host", &self.settings.host)
            .field("drivers", &self.drivers)
            .field("nodes", &self.registry.len())
            .finish()
    }
}

impl Conductor {
    pub fn new(settings: ConductorSettings, drivers: DriverRegistry) -> Self {
        Self {
            registry: Arc::new(NodeRegistry::new()),
            drivers: Arc::new(drivers),
            settings: Arc::new(settings),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Build a conductor with the drivers enabled in `config`.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let drivers = DriverRegistry::from_names(&config.enabled_drivers, config.fake_backend.clone())?;
        Ok(Self::new(ConductorSettings::from(config), drivers))
    }

    pub fn host(&self) -> &str {
        &self.settings.host
    }

    pub fn drivers(&self) -> &DriverRegistry {
        &self.drivers
    }

    /// Nodes currently using `driver`.
    pub fn nodes_using(&self, driver: &str) -> usize {
        self.registry
            .list(&NodeFilter {
                driver: Some(driver.to_string()),
                ..Default::default()
            })
            .len()
    }

    // ========================================================================
    // Node records
    // ========================================================================

    /// Enroll a new node.
    ///
    /// # Errors
    ///
    /// - `DriverNotFound` if the driver is not enabled
    /// - `NotAcceptable`/`InvalidName` for names the version does not allow
    /// - `DuplicateName` if the name is taken
    pub fn create_node(&self, req: NewNode, version: ApiVersion) -> Result<Node> {
        if !self.drivers.contains(&req.driver) {
            return Err(ProvisionError::DriverNotFound(req.driver));
        }
        let node = self.registry.insert(Node::enroll(req, version)?)?;
        tracing::info!(
            node = %node.uuid,
            driver = %node.driver,
            state = %node.provision_state(),
            "node enrolled"
        );
        Ok(node)
    }

    pub fn get_node(&self, ident: &str, version: ApiVersion) -> Result<Node> {
        self.registry.lookup(ident, version)
    }

    pub fn list_nodes(&self, filter: &NodeFilter) -> Vec<Node> {
        self.registry.list(filter)
    }

    /// Apply a JSON-patch document to a node.
    ///
    /// Refused while the node is reserved. The whole document applies or
    /// nothing does.
    pub fn patch_node(
        &self,
        ident: &str,
        operations: &[PatchOperation],
        version: ApiVersion,
    ) -> Result<Node> {
        let uuid = self.registry.resolve(ident, version)?;
        let drivers = &self.drivers;
        let ((), node) = self.registry.update(uuid, true, |node| {
            patch::apply(node, operations, version)?;
            if !drivers.contains(&node.driver) {
                return Err(ProvisionError::DriverNotFound(node.driver.clone()));
            }
            Ok(())
        })?;
        tracing::info!(node = %uuid, "node updated");
        Ok(node)
    }

    /// Deregister a node.
    pub fn delete_node(&self, ident: &str, version: ApiVersion) -> Result<()> {
        let uuid = self.registry.resolve(ident, version)?;
        let node = self.registry.remove(uuid)?;
        tracing::info!(node = %node.uuid, state = %node.provision_state(), "node deleted");
        Ok(())
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Put a node into maintenance. Allowed in every state.
    pub fn set_maintenance(&self, ident: &str, reason: Option<String>, version: ApiVersion) -> Result<Node> {
        let uuid = self.registry.resolve(ident, version)?;
        let ((), node) = self.registry.update(uuid, false, |node| {
            node.set_maintenance(reason);
            Ok(())
        })?;
        tracing::info!(node = %uuid, reason = ?node.maintenance_reason, "maintenance set");
        Ok(node)
    }

    pub fn clear_maintenance(&self, ident: &str, version: ApiVersion) -> Result<Node> {
        let uuid = self.registry.resolve(ident, version)?;
        let ((), node) = self.registry.update(uuid, false, |node| {
            node.clear_maintenance();
            Ok(())
        })?;
        tracing::info!(node = %uuid, "maintenance cleared");
        Ok(node)
    }

    // ========================================================================
    // Provisioning
    // ========================================================================

    /// Start a provisioning action on a node.
    ///
    /// Returns the node as it stands right after the operator event (for
    /// example `verifying` for `manage`); the rest happens in the background.
    ///
    /// # Errors
    ///
    /// - `NotAcceptable` if the action is newer than `version`
    /// - `NodeLocked` if another action is in flight
    /// - `NodeInMaintenance` for actions refused under maintenance
    /// - `InvalidStateRequested` if the table has no edge for the action
    /// - `Validation` when deploying without `instance_info.image_source`
    ///
    /// On any error the node is left untouched.
    pub fn do_provision_action(
        &self,
        ident: &str,
        action: ProvisionAction,
        version: ApiVersion,
    ) -> Result<Node> {
        if let Some(feature) = required_feature(action) {
            if !version.supports(feature) {
                return Err(ProvisionError::not_acceptable(
                    format!("The \"{}\" provision action", action),
                    version,
                    feature.min_version(),
                ));
            }
        }

        let uuid = self.registry.resolve(ident, version)?;
        let (transition, node) = self.registry.reserve(uuid, &self.settings.host, |node| {
            if node.maintenance && action.blocked_by_maintenance() {
                return Err(ProvisionError::NodeInMaintenance { node: uuid, action });
            }
            let state = node.provision_state();
            if fsm::next_state(state, action.event()).is_none() {
                return Err(ProvisionError::invalid_state(uuid, action, state));
            }
            if matches!(action, ProvisionAction::Active | ProvisionAction::Rebuild)
                && !node.instance_info.contains_key("image_source")
            {
                return Err(ProvisionError::validation(format!(
                    "Cannot deploy node {}: instance_info.image_source is not set",
                    uuid
                )));
            }
            let transition = node
                .apply_event(action.event())
                .map_err(|_| ProvisionError::invalid_state(uuid, action, state))?;
            node.last_error = None;
            Ok(transition)
        })?;

        tracing::info!(
            node = %uuid,
            %action,
            from = %transition.from,
            to = %transition.to,
            "provision action accepted"
        );

        match Work::for_state(transition.to) {
            Some(work) => {
                self.spawn(uuid, self.clone().run(uuid, work));
                Ok(node)
            }
            None => {
                let ((), node) = self.registry.release(uuid, |_| Ok(()))?;
                Ok(node)
            }
        }
    }

    // ========================================================================
    // Power and boot device
    // ========================================================================

    /// Request a power change. The change is applied in the background.
    pub fn set_power_state(&self, ident: &str, target: PowerTarget, version: ApiVersion) -> Result<Node> {
        let uuid = self.registry.resolve(ident, version)?;
        let ((), node) = self.registry.reserve(uuid, &self.settings.host, |node| {
            node.target_power_state = Some(target.resulting_state());
            node.last_error = None;
            node.touch();
            Ok(())
        })?;
        tracing::info!(node = %uuid, %target, "power change requested");

        let this = self.clone();
        self.spawn(uuid, async move { this.run_power(uuid, target).await });
        Ok(node)
    }

    /// Boot devices the node's driver can set.
    pub fn supported_boot_devices(&self, ident: &str, version: ApiVersion) -> Result<Vec<BootDevice>> {
        let node = self.registry.lookup(ident, version)?;
        Ok(self.backend_for(&node)?.supported_boot_devices(&node))
    }

    pub async fn get_boot_device(&self, ident: &str, version: ApiVersion) -> Result<BootDeviceInfo> {
        let node = self.registry.lookup(ident, version)?;
        let limit = self.settings.timeouts.power();
        Ok(self
            .call_backend(&node, Operation::BootDevice, limit, |backend, node| {
                backend.get_boot_device(node)
            })
            .await?)
    }

    /// Set the boot device, holding the reservation for the duration.
    ///
    /// The backend call runs on a conductor task that owns the reservation,
    /// so dropping the returned future never leaves the node locked.
    pub async fn set_boot_device(
        &self,
        ident: &str,
        device: BootDevice,
        persistent: bool,
        version: ApiVersion,
    ) -> Result<()> {
        let node = self.registry.lookup(ident, version)?;
        let backend = self.backend_for(&node)?;
        if !backend.supported_boot_devices(&node).contains(&device) {
            return Err(ProvisionError::validation(format!(
                "Boot device {} is not supported by driver {}",
                device, node.driver
            )));
        }

        let uuid = node.uuid;
        let ((), node) = self.registry.reserve(uuid, &self.settings.host, |_| Ok(()))?;
        let limit = self.settings.timeouts.power();

        let (tx, rx) = oneshot::channel();
        let this = self.clone();
        self.spawn(uuid, async move {
            let result = this
                .call_reserved(&node, Operation::BootDevice, limit, move |backend, node| {
                    backend.set_boot_device(node, device, persistent)
                })
                .await;
            this.release_quietly(uuid);
            // nobody is listening if the request was dropped
            let _ = tx.send(result);
        });

        let result = match tokio::time::timeout(limit, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BackendError::failed(
                Operation::BootDevice,
                "backend task ended without a result",
            )),
            Err(_) => Err(timed_out(Operation::BootDevice, limit)),
        };
        result?;
        tracing::info!(node = %uuid, %device, persistent, "boot device set");
        Ok(())
    }

    // ========================================================================
    // Background task bookkeeping
    // ========================================================================

    fn spawn<F>(&self, uuid: Uuid, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        let mut tasks = self.tasks.lock();
        tasks.retain(|_, task| !task.is_finished());
        tasks.insert(uuid, handle);
    }

    /// Wait until the background work for `uuid` (if any) has finished.
    pub async fn wait_for(&self, uuid: Uuid) {
        let handle = self.tasks.lock().remove(&uuid);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(node = %uuid, error = %e, "background task ended abnormally");
            }
        }
    }

    /// Wait for every in-flight background task.
    pub async fn wait_idle(&self) {
        let handles: Vec<(Uuid, JoinHandle<()>)> = self.tasks.lock().drain().collect();
        for (uuid, handle) in handles {
            if let Err(e) = handle.await {
                tracing::warn!(node = %uuid, error = %e, "background task ended abnormally");
            }
        }
    }

    // ========================================================================
    // Background runners
    // ========================================================================

    fn backend_for(&self, node: &Node) -> Result<Arc<dyn HardwareBackend>> {
        self.drivers
            .get(&node.driver)
            .ok_or_else(|| ProvisionError::DriverNotFound(node.driver.clone()))
    }

    /// Start one blocking backend call on the blocking pool.
    fn start_backend<T, F>(
        &self,
        node: &Node,
        operation: Operation,
        call: F,
    ) -> std::result::Result<JoinHandle<BackendResult<T>>, BackendError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn HardwareBackend, &Node) -> BackendResult<T> + Send + 'static,
    {
        let backend = self
            .backend_for(node)
            .map_err(|e| BackendError::failed(operation, e.to_string()))?;
        let snapshot = node.clone();
        tracing::debug!(node = %node.uuid, %operation, "calling backend");
        Ok(tokio::task::spawn_blocking(move || call(backend.as_ref(), &snapshot)))
    }

    /// Run a read-only backend call bounded by `limit`.
    ///
    /// On timeout the blocking call is abandoned; it holds no reservation.
    async fn call_backend<T, F>(
        &self,
        node: &Node,
        operation: Operation,
        limit: Duration,
        call: F,
    ) -> BackendResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn HardwareBackend, &Node) -> BackendResult<T> + Send + 'static,
    {
        let task = self.start_backend(node, operation, call)?;
        match tokio::time::timeout(limit, task).await {
            Ok(joined) => flatten(operation, joined),
            Err(_) => Err(timed_out(operation, limit)),
        }
    }

    /// Run a backend call on a node this conductor holds reserved.
    ///
    /// A call that overruns `limit` cannot be cancelled. The timeout is
    /// written to `last_error` at once, but this only returns (and so the
    /// caller only releases the node) after the blocking call has finished.
    /// Its late result is discarded.
    async fn call_reserved<T, F>(
        &self,
        node: &Node,
        operation: Operation,
        limit: Duration,
        call: F,
    ) -> BackendResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn HardwareBackend, &Node) -> BackendResult<T> + Send + 'static,
    {
        let uuid = node.uuid;
        let mut task = self.start_backend(node, operation, call)?;
        let outcome = tokio::time::timeout(limit, &mut task).await;
        match outcome {
            Ok(joined) => flatten(operation, joined),
            Err(_) => {
                let err = timed_out(operation, limit);
                tracing::warn!(
                    node = %uuid,
                    %operation,
                    "backend call timed out, keeping reservation until it returns"
                );
                let recorded = self.registry.update_reserved(uuid, |node| {
                    node.last_error = Some(err.to_string());
                    node.touch();
                    Ok(())
                });
                if let Err(e) = recorded {
                    tracing::error!(node = %uuid, error = %e, "could not record timeout");
                }
                match task.await {
                    Ok(late) => tracing::info!(
                        node = %uuid,
                        %operation,
                        succeeded = late.is_ok(),
                        "late backend result discarded"
                    ),
                    Err(e) => tracing::warn!(node = %uuid, error = %e, "timed out backend call aborted"),
                }
                Err(err)
            }
        }
    }

    async fn run(self, uuid: Uuid, work: Work) {
        let node = match self.registry.get(uuid) {
            Ok(node) => node,
            Err(e) => {
                tracing::error!(node = %uuid, error = %e, "node vanished before background work");
                return;
            }
        };
        let timeouts = self.settings.timeouts.clone();

        match work {
            Work::Verify => {
                let result = self
                    .call_reserved(&node, Operation::Verify, timeouts.verify(), |backend, node| {
                        backend.validate_power(node)?;
                        backend.get_power_state(node)
                    })
                    .await;
                match result {
                    Ok(power) => self.finish(uuid, |node| node.power_state = Some(power)),
                    Err(e) => self.fail(uuid, &e),
                }
            }
            Work::Clean => self.run_cleaning(node).await,
            Work::Inspect => {
                let started = self.registry.update_reserved(uuid, |node| {
                    node.inspection_started_at = Some(chrono::Utc::now());
                    node.inspection_finished_at = None;
                    Ok(())
                });
                if let Err(e) = started {
                    tracing::error!(node = %uuid, error = %e, "could not record inspection start");
                }
                let result = self
                    .call_reserved(&node, Operation::Inspect, timeouts.inspect(), |backend, node| {
                        backend.inspect(node)
                    })
                    .await;
                let stamp = |node: &mut Node| node.inspection_finished_at = Some(chrono::Utc::now());
                match result {
                    Ok(found) => self.finish(uuid, |node| {
                        found.merge_into(&mut node.properties);
                        stamp(node);
                    }),
                    Err(e) => {
                        let stamped = self.registry.update_reserved(uuid, |node| {
                            stamp(node);
                            Ok(())
                        });
                        if let Err(e) = stamped {
                            tracing::error!(node = %uuid, error = %e, "could not record inspection end");
                        }
                        self.fail(uuid, &e);
                    }
                }
            }
            Work::Deploy => {
                let result = self
                    .call_reserved(&node, Operation::Deploy, timeouts.deploy(), |backend, node| {
                        backend.deploy(node)?;
                        backend.get_power_state(node)
                    })
                    .await;
                match result {
                    Ok(power) => self.finish(uuid, |node| node.power_state = Some(power)),
                    Err(e) => self.fail(uuid, &e),
                }
            }
            Work::TearDown => {
                let result = self
                    .call_reserved(&node, Operation::TearDown, timeouts.deploy(), |backend, node| {
                        backend.tear_down(node)?;
                        backend.get_power_state(node)
                    })
                    .await;
                match result {
                    Ok(power) => {
                        // deleting -> cleaning; the reservation is kept for cleaning
                        let advanced = self.registry.update_reserved(uuid, |node| {
                            node.instance_info.clear();
                            node.power_state = Some(power);
                            Ok(node.apply_event(Event::Done)?)
                        });
                        match advanced {
                            Ok((transition, node)) => {
                                log_transition(uuid, transition.from, transition.to, Event::Done);
                                self.run_cleaning(node).await;
                            }
                            Err(e) => {
                                tracing::error!(node = %uuid, error = %e, "could not leave deleting");
                                self.release_quietly(uuid);
                            }
                        }
                    }
                    Err(e) => self.fail(uuid, &e),
                }
            }
        }
    }

    /// Run automated cleaning and finish the `cleaning` state.
    async fn run_cleaning(&self, node: Node) {
        let uuid = node.uuid;
        if !self.settings.automated_clean {
            tracing::info!(node = %uuid, "automated cleaning disabled, skipping clean steps");
            self.finish(uuid, |_| {});
            return;
        }

        let mut steps = match self.backend_for(&node) {
            Ok(backend) => backend.clean_steps(&node),
            Err(e) => {
                self.fail(uuid, &BackendError::failed(Operation::Clean, e.to_string()));
                return;
            }
        };
        steps.retain(|step| step.priority > 0);
        steps.sort_by(|a, b| b.priority.cmp(&a.priority));

        let limit = self.settings.timeouts.clean();
        for step in steps {
            let current = step.clone();
            let node = match self.registry.update_reserved(uuid, |node| {
                node.clean_step = Some(current);
                Ok(())
            }) {
                Ok(((), node)) => node,
                Err(e) => {
                    tracing::error!(node = %uuid, error = %e, "could not record clean step");
                    self.release_quietly(uuid);
                    return;
                }
            };

            tracing::info!(
                node = %uuid,
                interface = %step.interface,
                step = %step.step,
                priority = step.priority,
                "executing clean step"
            );
            let running = step.clone();
            let result = self
                .call_reserved(&node, Operation::Clean, limit, move |backend, node| {
                    backend.execute_clean_step(node, &running)
                })
                .await;
            if let Err(e) = result {
                // clean_step stays set so operators can see which step failed
                self.fail(uuid, &e);
                return;
            }
        }

        self.finish(uuid, |node| node.clean_step = None);
    }

    async fn run_power(&self, uuid: Uuid, target: PowerTarget) {
        let node = match self.registry.get(uuid) {
            Ok(node) => node,
            Err(e) => {
                tracing::error!(node = %uuid, error = %e, "node vanished before power change");
                return;
            }
        };
        let limit = self.settings.timeouts.power();
        let result = self
            .call_reserved(&node, Operation::Power, limit, move |backend, node| {
                backend.set_power_state(node, target)
            })
            .await;

        let released = self.registry.release(uuid, |node| {
            node.target_power_state = None;
            match &result {
                Ok(state) => node.power_state = Some(*state),
                Err(e) => node.last_error = Some(e.to_string()),
            }
            node.touch();
            Ok(())
        });
        match (&result, released) {
            (Ok(state), Ok(_)) => tracing::info!(node = %uuid, power = %state, "power state changed"),
            (Err(e), Ok(_)) => tracing::warn!(node = %uuid, error = %e, "power change failed"),
            (_, Err(e)) => tracing::error!(node = %uuid, error = %e, "could not record power state"),
        }
    }

    /// Drop the reservation, logging instead of propagating a failure.
    fn release_quietly(&self, uuid: Uuid) {
        if let Err(e) = self.registry.release(uuid, |_| Ok(())) {
            tracing::error!(node = %uuid, error = %e, "could not release reservation");
        }
    }

    /// Apply `done` after running `update`, and drop the reservation.
    fn finish(&self, uuid: Uuid, update: impl FnOnce(&mut Node)) {
        let result = self.registry.release(uuid, |node| {
            update(node);
            Ok(node.apply_event(Event::Done)?)
        });
        match result {
            Ok((transition, _)) => log_transition(uuid, transition.from, transition.to, Event::Done),
            Err(e) => tracing::error!(node = %uuid, error = %e, "could not complete action"),
        }
    }

    /// Record `error`, apply `fail`, and drop the reservation.
    fn fail(&self, uuid: Uuid, error: &BackendError) {
        tracing::warn!(node = %uuid, error = %error, "background action failed");
        let result = self.registry.release(uuid, |node| {
            node.last_error = Some(error.to_string());
            Ok(node.apply_event(Event::Fail)?)
        });
        match result {
            Ok((transition, _)) => log_transition(uuid, transition.from, transition.to, Event::Fail),
            Err(e) => tracing::error!(node = %uuid, error = %e, "could not record failure"),
        }
    }
}

type BackendResult<T> = std::result::Result<T, BackendError>;

fn timed_out(operation: Operation, limit: Duration) -> BackendError {
    BackendError::Timeout {
        operation: operation.to_string(),
        secs: limit.as_secs(),
    }
}

/// Collapse a joined blocking task into the backend's own result.
fn flatten<T>(
    operation: Operation,
    joined: std::result::Result<BackendResult<T>, tokio::task::JoinError>,
) -> BackendResult<T> {
    joined.unwrap_or_else(|e| Err(BackendError::failed(operation, format!("backend task aborted: {}", e))))
}

fn log_transition(uuid: Uuid, from: ProvisionState, to: ProvisionState, event: Event) {
    tracing::info!(node = %uuid, %from, %to, %event, "provision state changed");
}
