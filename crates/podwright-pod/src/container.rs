//! Container specs for the three container roles of a unit pod
//!
//! - step containers run the staged step-runner with their assigned port
//! - the bootstrap init container stages the step-runner into the tooling volume
//! - the control container coordinates the steps on the reserved port

use podwright_common::naming::step_container_name;
use podwright_common::{
    ControllerConfig, ImageRef, SecurityPolicy, StepSpec, UnitSpec, ENV_ACCOUNT_ID,
    ENV_DISPATCH_ENDPOINT, ENV_DISPATCH_ID, ENV_INDIRECT_LOG_UPLOAD, ENV_STATUS_OVER_REST,
    ENV_WORKSPACE,
};

use crate::k8s::{
    Capabilities, Container, ContainerPort, K8sSecurityContext, ResourceRequirements, VolumeMount,
};

/// Name of the bootstrap init container
pub const BOOTSTRAP_CONTAINER_NAME: &str = "bootstrap";

/// Name of the control container
pub const CONTROL_CONTAINER_NAME: &str = "control";

/// Shared working-directory volume, present in every pod
pub const WORKDIR_VOLUME_NAME: &str = "workdir";

/// Volume the bootstrap container stages tooling into
pub const TOOLING_VOLUME_NAME: &str = "tooling";

/// Pull policy for images that move under the same reference
const PULL_ALWAYS: &str = "Always";
const PULL_IF_NOT_PRESENT: &str = "IfNotPresent";

/// Determine image pull policy based on tag.
///
/// `:latest`, untagged, and unparseable references are pulled every time.
pub fn image_pull_policy(image: &str) -> &'static str {
    match ImageRef::parse(image) {
        Ok(r) if !r.is_floating() => PULL_IF_NOT_PRESENT,
        _ => PULL_ALWAYS,
    }
}

/// True when the image is on the configured privileged list
pub fn is_privileged_image(config: &ControllerConfig, image: &str) -> bool {
    ImageRef::parse(image).is_ok_and(|r| {
        config
            .privileged_images
            .iter()
            .any(|p| p.as_str() == r.canonical_name())
    })
}

/// Builds container specs from steps and built-in roles
#[derive(Clone, Copy, Debug)]
pub struct ContainerSpecBuilder<'a> {
    config: &'a ControllerConfig,
}

impl<'a> ContainerSpecBuilder<'a> {
    /// Builder over the given configuration
    pub fn new(config: &'a ControllerConfig) -> Self {
        Self { config }
    }

    /// Path the step-runner is staged to inside every container
    pub fn step_runner_path(&self) -> String {
        let binary = self
            .config
            .step_runner_source
            .rsplit('/')
            .next()
            .unwrap_or(&self.config.step_runner_source);
        format!("{}/{}", self.config.tooling_mount_path.trim_end_matches('/'), binary)
    }

    /// Container for one step listening on `port`
    pub fn step(&self, step: &StepSpec, port: u16) -> Container {
        let resources = match &step.resources {
            Some(declared) => ResourceRequirements::from(declared),
            None => self.resource_floor(),
        };
        let pull_policy = step
            .image_pull_policy
            .clone()
            .unwrap_or_else(|| image_pull_policy(&step.image).to_string());
        let working_dir = step
            .working_dir
            .as_deref()
            .filter(|dir| !dir.is_empty())
            .map(str::to_string);

        let container = Container {
            name: step_container_name(&step.id),
            image: step.image.clone(),
            image_pull_policy: Some(pull_policy),
            command: Some(vec![self.step_runner_path()]),
            args: Some(vec![port.to_string()]),
            working_dir,
            env: Vec::new(),
            env_from: Vec::new(),
            ports: vec![ContainerPort::tcp(port)],
            resources: Some(resources),
            volume_mounts: self.shared_mounts(),
            security_context: self.security_context(step),
        };
        step.env
            .iter()
            .fold(container, |c, (name, value)| c.with_env(name, value))
    }

    /// Init container that stages the step-runner into the tooling volume
    pub fn bootstrap(&self) -> Container {
        let target = self.step_runner_path();
        let script = format!(
            "cp {src} {target} && chmod 0755 {target}",
            src = self.config.step_runner_source,
        );
        Container {
            name: BOOTSTRAP_CONTAINER_NAME.to_string(),
            image: self.config.bootstrap_image.clone(),
            image_pull_policy: Some(PULL_ALWAYS.to_string()),
            command: Some(vec!["sh".to_string(), "-c".to_string()]),
            args: Some(vec![script]),
            resources: Some(self.resource_floor()),
            volume_mounts: vec![VolumeMount::new(
                TOOLING_VOLUME_NAME,
                &self.config.tooling_mount_path,
            )],
            ..Default::default()
        }
    }

    /// Control container for the unit, listening on the reserved port
    pub fn control(&self, unit: &UnitSpec) -> Container {
        Container {
            name: CONTROL_CONTAINER_NAME.to_string(),
            image: self.config.control_image.clone(),
            image_pull_policy: Some(image_pull_policy(&self.config.control_image).to_string()),
            ports: vec![ContainerPort::tcp(self.config.control_port)],
            resources: unit.resources.as_ref().map(ResourceRequirements::from),
            volume_mounts: vec![VolumeMount::new(
                WORKDIR_VOLUME_NAME,
                &self.config.workspace_path,
            )],
            ..Default::default()
        }
        .with_env(ENV_WORKSPACE, &self.config.workspace_path)
        .with_env(
            ENV_INDIRECT_LOG_UPLOAD,
            unit.features.indirect_log_upload.to_string(),
        )
        .with_env(ENV_STATUS_OVER_REST, unit.features.status_over_rest.to_string())
        .with_env(ENV_DISPATCH_ENDPOINT, &unit.dispatch.endpoint)
        .with_env(ENV_DISPATCH_ID, &unit.dispatch.service_id)
        .with_env(ENV_ACCOUNT_ID, &unit.dispatch.account_id)
    }

    fn resource_floor(&self) -> ResourceRequirements {
        ResourceRequirements::from(&podwright_common::ResourceRequirements {
            cpu: Some(self.config.default_cpu.clone()),
            memory: Some(self.config.default_memory.clone()),
        })
    }

    fn shared_mounts(&self) -> Vec<VolumeMount> {
        vec![
            VolumeMount::new(WORKDIR_VOLUME_NAME, &self.config.workspace_path),
            VolumeMount::new(TOOLING_VOLUME_NAME, &self.config.tooling_mount_path),
        ]
    }

    /// Declared policy with the privileged-image rule applied. Images on the
    /// privileged list get a context even when the step declares none.
    fn security_context(&self, step: &StepSpec) -> Option<K8sSecurityContext> {
        let image_privileged = is_privileged_image(self.config, &step.image);
        match &step.security {
            Some(policy) => Some(from_policy(policy, image_privileged)),
            None if image_privileged => Some(K8sSecurityContext {
                privileged: Some(true),
                ..Default::default()
            }),
            None => None,
        }
    }
}

fn from_policy(policy: &SecurityPolicy, image_privileged: bool) -> K8sSecurityContext {
    let capabilities = (!policy.add_capabilities.is_empty()
        || !policy.drop_capabilities.is_empty())
    .then(|| Capabilities {
        add: non_empty(&policy.add_capabilities),
        drop: non_empty(&policy.drop_capabilities),
    });

    K8sSecurityContext {
        capabilities,
        privileged: Some(policy.privileged || image_privileged),
        read_only_root_filesystem: Some(policy.read_only_root_filesystem),
        run_as_non_root: Some(policy.run_as_non_root),
        run_as_user: (policy.run_as_user != 0).then_some(policy.run_as_user),
        run_as_group: (policy.run_as_group != 0).then_some(policy.run_as_group),
        allow_privilege_escalation: Some(policy.allow_privilege_escalation),
        proc_mount: policy.proc_mount.clone().filter(|m| !m.is_empty()),
    }
}

fn non_empty(values: &[String]) -> Option<Vec<String>> {
    (!values.is_empty()).then(|| values.to_vec())
}
