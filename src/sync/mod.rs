//! Pending-sync reconciliation - moves local recordings to the remote store

mod reconcile;

pub use reconcile::{Reconciler, SyncReport};
