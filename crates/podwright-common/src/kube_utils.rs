//! Shared Kubernetes metadata helpers

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Standard recommended label for the managing tool
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of [`LABEL_MANAGED_BY`] on every object podwright creates
pub const LABEL_MANAGED_BY_PODWRIGHT: &str = "podwright";

// =============================================================================
// ObjectMeta - Canonical Kubernetes metadata for all assembled resources
// =============================================================================

/// Standard Kubernetes ObjectMeta for assembled resources.
///
/// Automatically adds the managed-by label on construction; use
/// [`ObjectMeta::for_unit`] to also attach the execution-unit label that
/// cleanup selects on.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Resource name
    pub name: String,
    /// Resource namespace
    pub namespace: String,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// Create new metadata with the managed-by label
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(
            LABEL_MANAGED_BY.to_string(),
            LABEL_MANAGED_BY_PODWRIGHT.to_string(),
        );
        Self {
            name: name.into(),
            namespace: namespace.into(),
            labels,
            annotations: BTreeMap::new(),
        }
    }

    /// Create metadata tagged with the execution-unit label; the unit id is
    /// a validated DNS label and is used as the label value unchanged
    pub fn for_unit(
        name: impl Into<String>,
        namespace: impl Into<String>,
        label_key: &str,
        unit_id: &str,
    ) -> Self {
        Self::new(name, namespace).with_label(label_key, unit_id)
    }

    /// Add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add several labels; existing keys are kept
    pub fn with_labels<'a>(mut self, labels: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        for (k, v) in labels {
            self.labels.entry(k.clone()).or_insert_with(|| v.clone());
        }
        self
    }

    /// Add an annotation
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_metadata_carries_both_labels() {
        let meta = ObjectMeta::for_unit("u1", "ci", "podwright.dev/unit", "u1");
        assert_eq!(meta.labels[LABEL_MANAGED_BY], "podwright");
        assert_eq!(meta.labels["podwright.dev/unit"], "u1");
        assert_eq!(meta.namespace, "ci");
    }

    #[test]
    fn extra_labels_never_replace_the_unit_label() {
        let mut extra = BTreeMap::new();
        extra.insert("podwright.dev/unit".to_string(), "other".to_string());
        extra.insert("team".to_string(), "payments".to_string());

        let meta = ObjectMeta::for_unit("u1", "ci", "podwright.dev/unit", "u1").with_labels(&extra);
        assert_eq!(meta.labels["podwright.dev/unit"], "u1");
        assert_eq!(meta.labels["team"], "payments");
    }

    #[test]
    fn empty_maps_are_not_serialized() {
        let json = serde_json::to_value(ObjectMeta::new("x", "ns")).unwrap();
        assert!(json.get("annotations").is_none());
        assert_eq!(json["name"], "x");
    }
}
