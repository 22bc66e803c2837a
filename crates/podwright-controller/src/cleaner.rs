//! Reclaims every cluster object labeled with an execution unit
//!
//! Each `delete_*` lists the unit's objects of one kind and deletes them one
//! by one. A failed delete is logged and counted, and the remaining objects
//! are still attempted. Only a failed listing is returned as an error.

use podwright_common::naming::unit_selector;
use podwright_common::{ControllerConfig, Result};
use tracing::{debug, info, warn};

use crate::client::{ClusterClient, ResourceKind};

/// Per-kind deletion tally
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeletionSummary {
    /// Objects deleted (or already gone)
    pub deleted: usize,
    /// Objects whose delete failed
    pub failed: usize,
}

/// Deletes pods, secrets and services by unit label
pub struct ResourceCleaner<'a> {
    client: &'a dyn ClusterClient,
    config: &'a ControllerConfig,
}

impl<'a> ResourceCleaner<'a> {
    pub fn new(client: &'a dyn ClusterClient, config: &'a ControllerConfig) -> Self {
        Self { client, config }
    }

    pub async fn delete_pods(&self, unit_id: &str) -> Result<DeletionSummary> {
        self.delete_all(ResourceKind::Pod, unit_id).await
    }

    pub async fn delete_secrets(&self, unit_id: &str) -> Result<DeletionSummary> {
        self.delete_all(ResourceKind::Secret, unit_id).await
    }

    pub async fn delete_services(&self, unit_id: &str) -> Result<DeletionSummary> {
        self.delete_all(ResourceKind::Service, unit_id).await
    }

    async fn delete_all(&self, kind: ResourceKind, unit_id: &str) -> Result<DeletionSummary> {
        let namespace = &self.config.namespace;
        let selector = unit_selector(&self.config.unit_label_key, unit_id);
        let names = self.client.list(kind, namespace, &selector).await?;
        debug!(unit = %unit_id, kind = %kind, found = names.len(), "listed unit objects");

        let mut summary = DeletionSummary::default();
        for name in &names {
            match self.client.delete(kind, namespace, name).await {
                Ok(()) => summary.deleted += 1,
                Err(e) => {
                    warn!(
                        unit = %unit_id,
                        kind = %kind,
                        name = %name,
                        error = %e,
                        "failed to delete object, continuing"
                    );
                    summary.failed += 1;
                }
            }
        }

        if !names.is_empty() {
            info!(
                unit = %unit_id,
                kind = %kind,
                deleted = summary.deleted,
                failed = summary.failed,
                "deleted unit objects"
            );
        }
        Ok(summary)
    }
}
