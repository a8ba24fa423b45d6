//! Threshold alerting
//!
//! - `engine`: pure evaluation of a snapshot against thresholds
//! - `gate`: continuous or edge-triggered raising
//! - `notifier`: forwarding raised alerts to an external channel

mod engine;
mod gate;
mod notifier;

pub use engine::{evaluate, AlertThresholds};
pub use gate::{AlertGate, AlertMode, GateDecision};
pub use notifier::{forward_alerts, LogNotifier, Notifier};
