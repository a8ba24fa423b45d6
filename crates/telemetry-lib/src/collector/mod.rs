//! Periodic metrics collection
//!
//! Each tick reads every registered unit plus the collaborator summaries,
//! aggregates them into one snapshot, persists the samples, KPIs and alerts
//! in a single transaction, and appends the snapshot to the real-time buffer.

mod r#loop;


pub use r#loop::{CollectionConfig, CollectionLoop, CollectionLoopBuilder, TickSummary};
