//! Pod and service assembly for one execution unit
//!
//! Assembly is a fixed sequence of stages. Each stage takes the pod built so
//! far and returns it with its own additions; no stage removes or replaces
//! what an earlier one added.

use std::collections::BTreeMap;

use podwright_common::kube_utils::ObjectMeta;
use podwright_common::naming::{
    image_pull_secret_name, logging_secret_name, pod_name, service_name, step_port_env_var,
    step_secret_name,
};
use podwright_common::{ControllerConfig, Error, Result, UnitSpec};
use tracing::debug;

use crate::container::{ContainerSpecBuilder, TOOLING_VOLUME_NAME, WORKDIR_VOLUME_NAME};
use crate::k8s::{LocalObjectReference, Pod, PodSpec, Service, Volume};
use crate::ports::PortAssignment;
use crate::volumes::ResolvedVolumes;

/// Restart policy of every unit pod; steps run once
const RESTART_POLICY: &str = "Never";

/// Names of the secrets provisioned for a unit
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProvisionedSecrets {
    /// Registry-credential secrets, by infra index
    pub image_pull: Vec<String>,
    /// Generic secrets grouped by step id
    pub per_step: BTreeMap<String, Vec<String>>,
    /// Log-service credentials
    pub logging: String,
}

impl ProvisionedSecrets {
    /// Names provisioning creates for `unit`, derived without any lookup
    pub fn planned(unit_id: &str, unit: &UnitSpec) -> Self {
        Self {
            image_pull: (0..unit.image_pull_secrets.len())
                .map(|i| image_pull_secret_name(unit_id, i))
                .collect(),
            per_step: unit
                .steps
                .iter()
                .map(|step| {
                    let names = (0..step.secrets.len())
                        .map(|i| step_secret_name(unit_id, &step.id, i))
                        .collect();
                    (step.id.clone(), names)
                })
                .collect(),
            logging: logging_secret_name(unit_id),
        }
    }

    /// Every per-step secret, grouped by step id
    pub fn step_secrets(&self) -> impl Iterator<Item = &str> {
        self.per_step.values().flatten().map(String::as_str)
    }

    /// Total number of secrets, the logging secret included
    pub fn count(&self) -> usize {
        self.image_pull.len() + self.per_step.values().map(Vec::len).sum::<usize>() + 1
    }
}

/// Everything the assembler composes into a pod
#[derive(Clone, Copy, Debug)]
pub struct PodInputs<'a> {
    pub unit_id: &'a str,
    pub unit: &'a UnitSpec,
    pub ports: &'a PortAssignment,
    pub volumes: &'a ResolvedVolumes,
    pub secrets: &'a ProvisionedSecrets,
}

/// Composes unit pods and their control services
#[derive(Clone, Copy, Debug)]
pub struct PodAssembler<'a> {
    config: &'a ControllerConfig,
    containers: ContainerSpecBuilder<'a>,
}

impl<'a> PodAssembler<'a> {
    pub fn new(config: &'a ControllerConfig) -> Self {
        Self {
            config,
            containers: ContainerSpecBuilder::new(config),
        }
    }

    /// Assemble the submit-ready pod
    pub fn assemble(&self, inputs: &PodInputs<'_>) -> Result<Pod> {
        let pod = self.base(inputs);
        let pod = self.with_bootstrap(pod);
        let pod = self.with_control(pod, inputs);
        let pod = self.with_steps(pod, inputs)?;
        let pod = with_unit_volumes(pod, inputs.volumes);
        let pod = with_image_pull_secrets(pod, inputs.secrets);

        debug!(
            unit = %inputs.unit_id,
            pod = %pod.name(),
            containers = pod.spec.containers.len(),
            volumes = pod.spec.volumes.len(),
            "assembled pod"
        );
        Ok(pod)
    }

    /// Cluster-local service exposing the control port of the unit pod
    pub fn service(&self, unit_id: &str) -> Service {
        let selector = BTreeMap::from([(self.config.unit_label_key.clone(), unit_id.to_string())]);
        Service::cluster_ip(
            self.metadata(service_name(unit_id), unit_id),
            selector,
            self.config.control_port,
        )
    }

    /// Metadata carrying the unit label, for any object owned by the unit
    pub fn metadata(&self, name: String, unit_id: &str) -> ObjectMeta {
        ObjectMeta::for_unit(
            name,
            &self.config.namespace,
            &self.config.unit_label_key,
            unit_id,
        )
    }

    fn base(&self, inputs: &PodInputs<'_>) -> Pod {
        let unit = inputs.unit;
        let metadata = unit.annotations.iter().fold(
            self.metadata(pod_name(inputs.unit_id), inputs.unit_id)
                .with_labels(&unit.labels),
            |meta, (k, v)| meta.with_annotation(k, v),
        );
        let service_account_name = unit
            .service_account_name
            .clone()
            .or_else(|| self.config.service_account_name.clone());

        Pod::new(
            metadata,
            PodSpec {
                restart_policy: Some(RESTART_POLICY.to_string()),
                active_deadline_seconds: Some(self.config.active_deadline_seconds),
                automount_service_account_token: Some(true),
                service_account_name,
                node_selector: unit.node_selector.clone(),
                volumes: vec![Volume::from_empty_dir(WORKDIR_VOLUME_NAME, None, None)],
                ..Default::default()
            },
        )
    }

    fn with_bootstrap(&self, mut pod: Pod) -> Pod {
        pod.spec.init_containers.push(self.containers.bootstrap());
        pod.spec
            .volumes
            .push(Volume::from_empty_dir(TOOLING_VOLUME_NAME, None, None));
        pod
    }

    fn with_control(&self, mut pod: Pod, inputs: &PodInputs<'_>) -> Pod {
        let control = inputs.ports.iter().fold(
            self.containers
                .control(inputs.unit)
                .with_secret_env_sources([inputs.secrets.logging.as_str()]),
            |c, (step_id, port)| c.with_env(step_port_env_var(step_id), port.to_string()),
        );
        pod.spec.containers.push(control);
        pod
    }

    fn with_steps(&self, mut pod: Pod, inputs: &PodInputs<'_>) -> Result<Pod> {
        for step in &inputs.unit.steps {
            let port = inputs.ports.get(&step.id).ok_or_else(|| {
                Error::internal_with_context(
                    "pod-assembler",
                    format!("no port assigned to step '{}'", step.id),
                )
            })?;
            let container = self
                .containers
                .step(step, port)
                .with_volume_mounts(&inputs.volumes.mounts)
                .with_secret_env_sources(inputs.secrets.step_secrets());
            pod.spec.containers.push(container);
        }
        Ok(pod)
    }
}

fn with_unit_volumes(mut pod: Pod, volumes: &ResolvedVolumes) -> Pod {
    pod.spec.volumes.extend(volumes.volumes.iter().cloned());
    pod
}

fn with_image_pull_secrets(mut pod: Pod, secrets: &ProvisionedSecrets) -> Pod {
    pod.spec.image_pull_secrets.extend(
        secrets
            .image_pull
            .iter()
            .map(|name| LocalObjectReference { name: name.clone() }),
    );
    pod
}
