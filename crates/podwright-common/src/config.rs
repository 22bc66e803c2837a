//! Controller configuration
//!
//! Every image name, port, path and resource floor the builders use lives in
//! [`ControllerConfig`]. Components receive it by reference at construction
//! time, so tests can swap images or ports without touching component code.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Error;

/// Default namespace for execution-unit pods
pub const DEFAULT_NAMESPACE: &str = "podwright";

/// Reserved port for the control container, outside the step range
pub const DEFAULT_CONTROL_PORT: u16 = 20001;

/// First port handed to steps
pub const DEFAULT_STEP_PORT_BASE: u16 = 20002;

/// Number of ports in the step range
pub const DEFAULT_STEP_PORT_CAPACITY: u16 = 1000;

/// CPU request applied when a step declares no resources
pub const DEFAULT_CPU: &str = "100m";

/// Memory request and limit applied when a step declares no resources
pub const DEFAULT_MEMORY: &str = "100Mi";

/// Pod lifetime ceiling (24h)
pub const DEFAULT_ACTIVE_DEADLINE_SECONDS: i64 = 24 * 60 * 60;

/// Label that ties every cluster object to its execution unit
pub const DEFAULT_UNIT_LABEL_KEY: &str = "podwright.dev/unit";

/// Watches must time out before the API server's own 295s limit
pub const MAX_WATCH_TIMEOUT_SECONDS: u32 = 295;

/// Images that only work in privileged mode (Docker-in-Docker builders)
pub const DEFAULT_PRIVILEGED_IMAGES: &[&str] = &[
    "plugins/docker",
    "plugins/ecr",
    "plugins/gcr",
    "plugins/acr",
    "plugins/heroku",
];

/// What the orchestrator does with errors raised during `init` and `cleanup`
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FailurePolicy {
    /// Cluster-API errors are logged and reported as an abandoned outcome;
    /// every other error propagates
    #[default]
    SwallowClusterErrors,
    /// Every error propagates to the caller
    PropagateAll,
}

/// Immutable configuration shared by every component
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ControllerConfig {
    /// Namespace all objects are created in
    pub namespace: String,
    /// Image of the control container
    pub control_image: String,
    /// Image of the bootstrap (init) container that stages tooling
    pub bootstrap_image: String,
    /// Location of the step-runner binary inside the bootstrap image
    pub step_runner_source: String,
    /// Mount path of the shared tooling volume
    pub tooling_mount_path: String,
    /// Mount path of the shared working-directory volume
    pub workspace_path: String,
    /// Reserved control-container port
    pub control_port: u16,
    /// First step port
    pub step_port_base: u16,
    /// Number of step ports available
    pub step_port_capacity: u16,
    /// CPU floor for steps without declared resources
    pub default_cpu: String,
    /// Memory floor for steps without declared resources
    pub default_memory: String,
    /// `activeDeadlineSeconds` for every pod
    pub active_deadline_seconds: i64,
    /// Image names (without registry or tag) that force privileged mode
    pub privileged_images: Vec<String>,
    /// Label key carrying the execution-unit id
    pub unit_label_key: String,
    /// Service account for pods when the unit names none
    pub service_account_name: Option<String>,
    /// Swallow-vs-propagate policy for orchestrator errors
    pub failure_policy: FailurePolicy,
    /// Server-side timeout for event watches
    pub watch_timeout_seconds: u32,
    /// How long `EventWatcher::stop` waits for the forwarding task
    pub watch_stop_grace_millis: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            control_image: "podwright/control:latest".to_string(),
            bootstrap_image: "podwright/bootstrap:latest".to_string(),
            step_runner_source: "/usr/local/bin/step-runner".to_string(),
            tooling_mount_path: "/podwright/tools".to_string(),
            workspace_path: "/podwright/workspace".to_string(),
            control_port: DEFAULT_CONTROL_PORT,
            step_port_base: DEFAULT_STEP_PORT_BASE,
            step_port_capacity: DEFAULT_STEP_PORT_CAPACITY,
            default_cpu: DEFAULT_CPU.to_string(),
            default_memory: DEFAULT_MEMORY.to_string(),
            active_deadline_seconds: DEFAULT_ACTIVE_DEADLINE_SECONDS,
            privileged_images: DEFAULT_PRIVILEGED_IMAGES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            unit_label_key: DEFAULT_UNIT_LABEL_KEY.to_string(),
            service_account_name: None,
            failure_policy: FailurePolicy::default(),
            watch_timeout_seconds: 290,
            watch_stop_grace_millis: 5_000,
        }
    }
}

impl ControllerConfig {
    /// Parse a YAML document; absent fields keep their defaults
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("invalid controller config: {e}")))
    }

    /// Load configuration from an optional file, then apply environment
    /// overrides and validate the result
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .map_err(|e| Error::config(format!("reading {}: {e}", p.display())))?;
                Self::from_yaml(&raw)?
            }
            None => Self::default(),
        };
        let config = config.with_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `PODWRIGHT_*` overrides using the given variable lookup
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(ns) = lookup("PODWRIGHT_NAMESPACE") {
            debug!(namespace = %ns, "namespace overridden from environment");
            self.namespace = ns;
        }
        if let Some(image) = lookup("PODWRIGHT_CONTROL_IMAGE") {
            self.control_image = image;
        }
        if let Some(image) = lookup("PODWRIGHT_BOOTSTRAP_IMAGE") {
            self.bootstrap_image = image;
        }
        if let Some(sa) = lookup("PODWRIGHT_SERVICE_ACCOUNT") {
            self.service_account_name = Some(sa);
        }
        self
    }

    /// Reject configurations the builders cannot honor
    pub fn validate(&self) -> Result<(), Error> {
        if self.namespace.is_empty() {
            return Err(Error::config("namespace must not be empty"));
        }
        if self.control_image.trim().is_empty() || self.bootstrap_image.trim().is_empty() {
            return Err(Error::config("control and bootstrap images must be set"));
        }
        let end = u32::from(self.step_port_base) + u32::from(self.step_port_capacity);
        if end > u32::from(u16::MAX) + 1 {
            return Err(Error::config(format!(
                "step port range {}+{} overflows the port space",
                self.step_port_base, self.step_port_capacity
            )));
        }
        let control = u32::from(self.control_port);
        if control >= u32::from(self.step_port_base) && control < end {
            return Err(Error::config(format!(
                "control port {} lies inside the step port range",
                self.control_port
            )));
        }
        if self.active_deadline_seconds <= 0 {
            return Err(Error::config("active deadline must be positive"));
        }
        if !(1..MAX_WATCH_TIMEOUT_SECONDS).contains(&self.watch_timeout_seconds) {
            return Err(Error::config(format!(
                "watch timeout must be between 1 and {} seconds",
                MAX_WATCH_TIMEOUT_SECONDS - 1
            )));
        }
        Ok(())
    }
}
