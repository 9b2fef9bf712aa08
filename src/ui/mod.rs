//! Notifications shown to the user

pub mod notifications;

pub use notifications::{Notification, Notifier, PortNotifier};
