//! Cluster-facing side of podwright
//!
//! Provisions an execution unit's secrets, control service and pod through
//! the [`client::ClusterClient`] boundary, reclaims them by unit label, and
//! streams pod events to a log sink.

pub mod cleaner;
pub mod client;
pub mod decrypt;
pub mod events;
pub mod orchestrator;
pub mod secrets;

#[cfg(test)]
mod testing;

pub use cleaner::{DeletionSummary, ResourceCleaner};
pub use client::{ClusterClient, KubeClusterClient, PodEvent, ResourceKind};
pub use decrypt::{Base64Decryptor, DecryptedSecret, Decryptor};
pub use events::{EventWatcher, LogSink, TracingLogSink, WatchHandle};
pub use orchestrator::{
    render, CleanupReport, InitReport, Orchestrator, Outcome, PodPlan, Stage,
};
pub use secrets::SecretsProvisioner;
