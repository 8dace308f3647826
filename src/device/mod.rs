//! Device inventory and reconciliation

mod inventory;
mod reconcile;

pub use inventory::{DeviceDirection, DeviceInfo, DeviceInventory};
pub use reconcile::{DeviceReconciler, Reconciliation, Transition};
