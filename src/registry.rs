//! In-memory node registry
//!
//! Holds every enrolled node plus a name index, behind one
//! `parking_lot::RwLock`. Critical sections never await.
//!
//! # Reservations
//!
//! Mutating actions call [`NodeRegistry::reserve`], which atomically checks
//! that nobody holds the node, applies the caller's change and stamps the
//! reservation. The background task that finishes the action calls
//! [`NodeRegistry::release`]. A second `reserve` in between fails with
//! `NodeLocked`, which serializes transitions per node.

use std::collections::HashMap;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{ProvisionError, Result};
use crate::node::Node;
use crate::states::ProvisionState;
use crate::version::{ApiVersion, Feature};

/// Criteria for [`NodeRegistry::list`]. Empty criteria match every node.
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    pub maintenance: Option<bool>,
    pub provision_state: Option<ProvisionState>,
    pub driver: Option<String>,
}

impl NodeFilter {
    fn matches(&self, node: &Node) -> bool {
        self.maintenance.is_none_or(|m| node.maintenance == m)
            && self
                .provision_state
                .is_none_or(|s| node.provision_state() == s)
            && self.driver.as_ref().is_none_or(|d| node.driver == *d)
    }
}

#[derive(Debug, Default)]
struct Inner {
    nodes: HashMap<Uuid, Node>,
    names: HashMap<String, Uuid>,
}

impl Inner {
    fn node(&self, uuid: Uuid) -> Result<&Node> {
        self.nodes
            .get(&uuid)
            .ok_or_else(|| ProvisionError::not_found(uuid.to_string()))
    }

    /// Clone-modify-commit so a failing closure leaves the node untouched.
    fn mutate<T>(&mut self, uuid: Uuid, f: impl FnOnce(&mut Node) -> Result<T>) -> Result<(T, Node)> {
        let mut updated = self.node(uuid)?.clone();
        let old_name = updated.name.clone();
        let value = f(&mut updated)?;

        if updated.name != old_name {
            if let Some(name) = &updated.name {
                if self.names.get(name).is_some_and(|owner| *owner != uuid) {
                    return Err(ProvisionError::DuplicateName(name.clone()));
                }
            }
            if let Some(old) = &old_name {
                self.names.remove(old);
            }
            if let Some(name) = &updated.name {
                self.names.insert(name.clone(), uuid);
            }
        }

        self.nodes.insert(uuid, updated.clone());
        Ok((value, updated))
    }
}

/// Shared node store.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    inner: RwLock<Inner>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a newly enrolled node.
    ///
    /// # Errors
    ///
    /// - `DuplicateName` if another node already uses the name
    /// - `Validation` if the UUID is already registered
    pub fn insert(&self, node: Node) -> Result<Node> {
        let mut inner = self.inner.write();
        if inner.nodes.contains_key(&node.uuid) {
            return Err(ProvisionError::validation(format!(
                "A node with UUID {} already exists.",
                node.uuid
            )));
        }
        if let Some(name) = &node.name {
            if inner.names.contains_key(name) {
                return Err(ProvisionError::DuplicateName(name.clone()));
            }
            inner.names.insert(name.clone(), node.uuid);
        }
        inner.nodes.insert(node.uuid, node.clone());
        Ok(node)
    }

    /// Resolve a UUID or logical name to a node UUID.
    ///
    /// Names are only honoured when the version supports logical names.
    pub fn resolve(&self, ident: &str, version: ApiVersion) -> Result<Uuid> {
        let inner = self.inner.read();
        if let Ok(uuid) = Uuid::parse_str(ident) {
            return inner.node(uuid).map(|n| n.uuid);
        }
        if !version.supports(Feature::LogicalNames) {
            return Err(ProvisionError::validation(format!(
                "Expected a UUID but received {}.",
                ident
            )));
        }
        inner
            .names
            .get(ident)
            .copied()
            .ok_or_else(|| ProvisionError::not_found(ident))
    }

    /// Snapshot of one node.
    pub fn get(&self, uuid: Uuid) -> Result<Node> {
        self.inner.read().node(uuid).cloned()
    }

    /// Snapshot of one node by UUID or name.
    pub fn lookup(&self, ident: &str, version: ApiVersion) -> Result<Node> {
        let uuid = self.resolve(ident, version)?;
        self.get(uuid)
    }

    /// Snapshots of all matching nodes, oldest first.
    pub fn list(&self, filter: &NodeFilter) -> Vec<Node> {
        let inner = self.inner.read();
        let mut nodes: Vec<Node> = inner
            .nodes
            .values()
            .filter(|n| filter.matches(n))
            .cloned()
            .collect();
        nodes.sort_by_key(|n| (n.created_at, n.uuid));
        nodes
    }

    pub fn len(&self) -> usize {
        self.inner.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply a change that does not need the reservation (maintenance,
    /// field patches). Still refused while another host holds the node when
    /// `respect_reservation` is set.
    pub fn update<T>(
        &self,
        uuid: Uuid,
        respect_reservation: bool,
        f: impl FnOnce(&mut Node) -> Result<T>,
    ) -> Result<(T, Node)> {
        let mut inner = self.inner.write();
        if respect_reservation {
            if let Some(holder) = &inner.node(uuid)?.reservation {
                return Err(ProvisionError::NodeLocked {
                    node: uuid,
                    holder: holder.clone(),
                });
            }
        }
        inner.mutate(uuid, f)
    }

    /// Take the node's reservation for `host` and apply `f` atomically.
    ///
    /// # Errors
    ///
    /// - `NodeLocked` if the node is already reserved
    /// - whatever `f` returns; the node is then left unchanged and unreserved
    pub fn reserve<T>(
        &self,
        uuid: Uuid,
        host: &str,
        f: impl FnOnce(&mut Node) -> Result<T>,
    ) -> Result<(T, Node)> {
        let mut inner = self.inner.write();
        if let Some(holder) = &inner.node(uuid)?.reservation {
            return Err(ProvisionError::NodeLocked {
                node: uuid,
                holder: holder.clone(),
            });
        }
        let result = inner.mutate(uuid, |node| {
            let value = f(node)?;
            node.reservation = Some(host.to_string());
            Ok(value)
        });
        if result.is_ok() {
            tracing::debug!(node = %uuid, host, "reservation acquired");
        }
        result
    }

    /// Apply the final change of an action and drop the reservation.
    ///
    /// The reservation is dropped even if `f` fails.
    pub fn release<T>(&self, uuid: Uuid, f: impl FnOnce(&mut Node) -> Result<T>) -> Result<(T, Node)> {
        let mut inner = self.inner.write();
        let result = inner.mutate(uuid, |node| {
            node.reservation = None;
            f(node)
        });
        if result.is_err() {
            if let Some(node) = inner.nodes.get_mut(&uuid) {
                node.reservation = None;
            }
        }
        tracing::debug!(node = %uuid, "reservation released");
        result
    }

    /// Apply an intermediate change while the caller holds the reservation.
    pub fn update_reserved<T>(&self, uuid: Uuid, f: impl FnOnce(&mut Node) -> Result<T>) -> Result<(T, Node)> {
        self.inner.write().mutate(uuid, f)
    }

    /// Deregister a node.
    ///
    /// # Errors
    ///
    /// - `NodeLocked` while reserved
    /// - `InvalidStateRequested` outside the deletable states, unless in maintenance
    pub fn remove(&self, uuid: Uuid) -> Result<Node> {
        let mut inner = self.inner.write();
        let node = inner.node(uuid)?;
        if let Some(holder) = &node.reservation {
            return Err(ProvisionError::NodeLocked {
                node: uuid,
                holder: holder.clone(),
            });
        }
        if !node.is_deletable() {
            return Err(ProvisionError::invalid_state(
                uuid,
                "delete",
                node.provision_state(),
            ));
        }
        let node = inner
            .nodes
            .remove(&uuid)
            .ok_or_else(|| ProvisionError::not_found(uuid.to_string()))?;
        if let Some(name) = &node.name {
            inner.names.remove(name);
        }
        Ok(node)
    }
}
