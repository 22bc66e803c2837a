//! Execution-unit declarations
//!
//! A unit is one infrastructure declaration plus its ordered steps. These
//! types are read once at `init` and never mutated afterward.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::naming::{
    image_pull_secret_name, is_dns_label, sanitize_dns_label, step_secret_name, DNS_LABEL_MAX,
    MAX_STEP_ID_LEN, MAX_UNIT_ID_LEN,
};
use crate::Error;

/// Everything needed to provision one execution unit
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnitSpec {
    /// Steps in execution order; port allocation follows this order
    pub steps: Vec<StepSpec>,
    /// Registry credentials, one image-pull secret per entry
    #[serde(default)]
    pub image_pull_secrets: Vec<SecretRef>,
    /// Volumes mounted into every step container
    #[serde(default)]
    pub volumes: Vec<VolumeDecl>,
    /// Resources for the control container
    #[serde(default)]
    pub resources: Option<ResourceRequirements>,
    /// Log-service coordinates stored in the logging secret
    #[serde(default)]
    pub logging: LogServiceSpec,
    /// Addressing of the dispatching service
    #[serde(default)]
    pub dispatch: DispatchSpec,
    /// Feature flags forwarded to the control container
    #[serde(default)]
    pub features: FeatureFlags,
    /// Extra pod labels
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Extra pod annotations
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Node selector for the pod
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,
    /// Service account overriding the controller default
    #[serde(default)]
    pub service_account_name: Option<String>,
}

/// Check that a unit id can be used verbatim as a name root and label value.
///
/// The id must be a DNS label short enough that `<id>-log-service`, the
/// longest fixed-suffix name, is still a DNS label.
pub fn validate_unit_id(unit_id: &str) -> Result<(), Error> {
    if !is_dns_label(unit_id) {
        return Err(Error::validation_for(
            unit_id,
            "unit id must be lowercase alphanumerics or '-', starting and ending alphanumeric",
        ));
    }
    if unit_id.len() > MAX_UNIT_ID_LEN {
        return Err(Error::validation_for(
            unit_id,
            format!("unit id must be at most {MAX_UNIT_ID_LEN} characters"),
        ));
    }
    Ok(())
}

impl UnitSpec {
    /// Check the declaration for configuration errors.
    ///
    /// Step ids must be non-empty, at most [`MAX_STEP_ID_LEN`] characters and
    /// unique after DNS sanitization (container names are derived from
    /// them). Images must be non-empty references without whitespace. Every
    /// derived secret name must fit a DNS label.
    pub fn validate(&self, unit_id: &str) -> Result<(), Error> {
        validate_unit_id(unit_id)?;

        for i in 0..self.image_pull_secrets.len() {
            check_name_fits(
                unit_id,
                format!("imagePullSecrets[{i}]"),
                image_pull_secret_name(unit_id, i),
            )?;
        }

        let mut seen = BTreeSet::new();
        for (i, step) in self.steps.iter().enumerate() {
            let container_name = sanitize_dns_label(&step.id);
            if container_name.is_empty() {
                return Err(Error::validation_for_field(
                    unit_id,
                    format!("steps[{i}].id"),
                    format!("step id '{}' has no usable characters", step.id),
                ));
            }
            if container_name.len() > MAX_STEP_ID_LEN {
                return Err(Error::validation_for_field(
                    unit_id,
                    format!("steps[{i}].id"),
                    format!("step id must be at most {MAX_STEP_ID_LEN} characters"),
                ));
            }
            if !seen.insert(container_name) {
                return Err(Error::validation_for_field(
                    unit_id,
                    format!("steps[{i}].id"),
                    format!("duplicate step id '{}'", step.id),
                ));
            }
            ImageRef::parse(&step.image).map_err(|msg| {
                Error::validation_for_field(unit_id, format!("steps[{i}].image"), msg)
            })?;
            for j in 0..step.secrets.len() {
                check_name_fits(
                    unit_id,
                    format!("steps[{i}].secrets[{j}]"),
                    step_secret_name(unit_id, &step.id, j),
                )?;
            }
        }
        Ok(())
    }
}

fn check_name_fits(unit_id: &str, field: String, name: String) -> Result<(), Error> {
    if name.len() > DNS_LABEL_MAX {
        return Err(Error::validation_for_field(
            unit_id,
            field,
            format!("derived secret name '{name}' exceeds {DNS_LABEL_MAX} characters"),
        ));
    }
    Ok(())
}

/// One container's worth of work
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepSpec {
    /// Step identifier, unique within the unit
    pub id: String,
    /// Container image reference
    pub image: String,
    /// Working directory; ignored when empty
    #[serde(default)]
    pub working_dir: Option<String>,
    /// Environment variables
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Declared resources; replaces the default floor outright
    #[serde(default)]
    pub resources: Option<ResourceRequirements>,
    /// Declared security constraints
    #[serde(default)]
    pub security: Option<SecurityPolicy>,
    /// Encrypted secrets exposed to the step
    #[serde(default)]
    pub secrets: Vec<SecretRef>,
    /// Pull policy override (`Always`, `IfNotPresent`, `Never`)
    #[serde(default)]
    pub image_pull_policy: Option<String>,
}

/// CPU and memory as cluster quantity strings
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    /// CPU request (e.g. "250m"); never turned into a limit
    #[serde(default)]
    pub cpu: Option<String>,
    /// Memory, used as both request and limit (e.g. "512Mi")
    #[serde(default)]
    pub memory: Option<String>,
}

/// Declared container security constraints
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityPolicy {
    pub allow_privilege_escalation: bool,
    pub privileged: bool,
    pub read_only_root_filesystem: bool,
    pub run_as_non_root: bool,
    /// 0 means unset, not root
    pub run_as_user: i64,
    /// 0 means unset, not root
    pub run_as_group: i64,
    pub add_capabilities: Vec<String>,
    pub drop_capabilities: Vec<String>,
    /// `Default` or `Unmasked`
    pub proc_mount: Option<String>,
}

/// Opaque encrypted secret plus what is needed to decrypt it
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    /// Encryption parameters understood by the decryption backend
    pub encryption: EncryptionConfig,
    /// Encrypted key/value records
    pub records: Vec<EncryptedRecord>,
}

/// Parameters for the decryption backend
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionConfig {
    /// Backend identifier (e.g. "base64", "vault")
    pub provider: String,
    /// Provider-specific settings
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

/// One encrypted value and the key it decrypts to
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedRecord {
    pub key: String,
    pub ciphertext: String,
}

/// Abstract volume declaration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum VolumeDecl {
    /// Scratch space living as long as the pod
    #[serde(rename_all = "camelCase")]
    EmptyDir {
        name: String,
        mount_path: String,
        #[serde(default)]
        medium: Option<String>,
        #[serde(default)]
        size_limit: Option<String>,
    },
    /// Directory on the node
    #[serde(rename_all = "camelCase")]
    HostPath {
        name: String,
        mount_path: String,
        host_path: String,
        #[serde(default)]
        path_type: Option<String>,
    },
    /// Existing persistent volume claim
    #[serde(rename_all = "camelCase")]
    PersistentClaim {
        name: String,
        mount_path: String,
        claim_name: String,
        #[serde(default)]
        read_only: bool,
    },
    /// Any kind this controller does not know how to materialize
    #[serde(other)]
    Unsupported,
}

/// Log-service coordinates for the logging secret
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogServiceSpec {
    pub endpoint: String,
    pub token: String,
    /// Prefix prepended to every log key
    pub key_prefix: String,
}

/// Where the control container reports back to
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSpec {
    pub endpoint: String,
    pub service_id: String,
    pub account_id: String,
}

/// Runtime feature flags for the control container
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureFlags {
    pub indirect_log_upload: bool,
    pub status_over_rest: bool,
}

/// Parsed container image reference
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRef {
    /// Registry host, when the reference names one
    pub registry: Option<String>,
    /// Repository path without registry, tag or digest
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageRef {
    /// Parse `[registry/]repository[:tag][@digest]`
    pub fn parse(reference: &str) -> Result<Self, String> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err("image must not be empty".to_string());
        }
        if reference.chars().any(char::is_whitespace) {
            return Err(format!("image '{reference}' contains whitespace"));
        }

        let (rest, digest) = match reference.split_once('@') {
            Some((r, d)) => (r, Some(d.to_string())),
            None => (reference, None),
        };
        let last_slash = rest.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (path, tag) = match rest[last_slash..].rfind(':') {
            Some(i) => (
                &rest[..last_slash + i],
                Some(rest[last_slash + i + 1..].to_string()),
            ),
            None => (rest, None),
        };

        // A first component with a dot, a port, or "localhost" is a registry host
        let (registry, repository) = match path.split_once('/') {
            Some((first, remainder))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (Some(first.to_string()), remainder.to_string())
            }
            _ => (None, path.to_string()),
        };
        if repository.is_empty() || tag.as_deref() == Some("") {
            return Err(format!("image '{reference}' is malformed"));
        }

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Repository name with Docker Hub's implicit prefixes removed
    pub fn canonical_name(&self) -> &str {
        let hub = matches!(
            self.registry.as_deref(),
            None | Some("docker.io") | Some("index.docker.io")
        );
        if hub {
            self.repository
                .strip_prefix("library/")
                .unwrap_or(&self.repository)
        } else {
            &self.repository
        }
    }

    /// True for `:latest` or untagged, undigested references
    pub fn is_floating(&self) -> bool {
        self.digest.is_none() && matches!(self.tag.as_deref(), None | Some("latest"))
    }
}
