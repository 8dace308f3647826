//! Device Reconciler - keep device-bound nodes in step with the inventory
//!
//! デバイスIDは再接続で変わることがあるため、IDで見つからなければ
//! 名前で再同定する。名前も見つからなければノードを Unavailable にする
//! （ノードと接続は保持する）。

use super::inventory::{DeviceDirection, DeviceInfo, DeviceInventory};
use crate::graph::{DeviceBinding, GraphStore, Node, NodeId, NodeRole};
use tracing::{debug, info, warn};

/// What changed for one node on an inventory refresh.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Same device id is back after being absent
    Recovered,
    /// Device id changed; matched again by name
    Rebound {
        previous: DeviceBinding,
        device: DeviceInfo,
    },
    /// Neither id nor name is present any more
    Lost,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub node: NodeId,
    pub transition: Transition,
}

pub struct DeviceReconciler<'a> {
    inventory: &'a DeviceInventory,
}

impl<'a> DeviceReconciler<'a> {
    pub fn new(inventory: &'a DeviceInventory) -> Self {
        Self { inventory }
    }

    /// Which side of the inventory a node is matched against, if any.
    pub fn direction(node: &Node) -> Option<DeviceDirection> {
        if !node.is_device_bound() {
            return None;
        }
        match node.role {
            NodeRole::Source(_) => Some(DeviceDirection::Input),
            NodeRole::Sink(_) => Some(DeviceDirection::Output),
            NodeRole::Bus(_) => None,
        }
    }

    /// Decide the transition for one node, or `None` when nothing changes.
    ///
    /// Pure: looks only at the node and the inventory, so nodes can be
    /// classified in any order.
    pub fn classify(&self, node: &Node) -> Option<Transition> {
        let direction = Self::direction(node)?;
        let binding = node.device()?;

        if self
            .inventory
            .find_by_id(direction, binding.device_id)
            .is_some()
        {
            return (!node.available).then_some(Transition::Recovered);
        }

        if let Some(device) = self.inventory.find_by_name(direction, &binding.device_name) {
            return Some(Transition::Rebound {
                previous: binding.clone(),
                device: device.clone(),
            });
        }

        node.available.then_some(Transition::Lost)
    }

    /// Apply a transition to the node in place.
    pub fn apply(node: &mut Node, transition: &Transition) {
        match transition {
            Transition::Recovered => node.available = true,
            Transition::Rebound { device, .. } => {
                if let Some(binding) = node.device_mut() {
                    binding.device_id = device.device_id;
                    binding.transport = device.transport.clone();
                }
                node.available = true;
            }
            Transition::Lost => node.available = false,
        }
    }

    /// Classify and apply in one go; used when a node is created from a saved
    /// record and its availability has to be settled before insertion.
    pub fn settle(&self, node: &mut Node) -> Option<Transition> {
        let transition = self.classify(node)?;
        Self::apply(node, &transition);
        Some(transition)
    }

    /// Reconcile every device-bound node in the store.
    ///
    /// Returns the applied transitions; the caller turns them into engine
    /// commands. Running twice against the same inventory yields nothing the
    /// second time.
    pub fn reconcile(&self, store: &mut GraphStore) -> Vec<Reconciliation> {
        let mut applied = Vec::new();
        for id in store.node_ids() {
            let Some(node) = store.node_mut(id) else {
                continue;
            };
            let Some(transition) = self.settle(node) else {
                continue;
            };
            match &transition {
                Transition::Recovered => {
                    info!(node = %node.label, "[device] device is back");
                }
                Transition::Rebound { previous, device } => {
                    info!(
                        node = %node.label,
                        old_id = previous.device_id,
                        new_id = device.device_id,
                        "[device] rebound by name"
                    );
                }
                Transition::Lost => {
                    warn!(node = %node.label, "[device] device unavailable");
                }
            }
            applied.push(Reconciliation {
                node: id,
                transition,
            });
        }
        if !applied.is_empty() {
            debug!(count = applied.len(), "[device] reconciled");
        }
        applied
    }
}
