//! Lifecycle controller for one execution unit at a time
//!
//! `init` provisions secrets, the control service and the pod; `cleanup`
//! reclaims everything carrying the unit label. Which errors are reported
//! as an abandoned outcome instead of an error is decided by the configured
//! [`FailurePolicy`].

use std::fmt;
use std::sync::Arc;

use podwright_common::{
    validate_unit_id, ControllerConfig, Error, FailurePolicy, Result, StepSpec, UnitSpec,
};
use podwright_pod::k8s::{Pod, Service};
use podwright_pod::pod::PodInputs;
use podwright_pod::{
    resolve_volumes, PodAssembler, PortAllocator, PortAssignment, ProvisionedSecrets,
    ResolvedVolumes,
};
use tracing::{error, info, warn};

use crate::cleaner::{DeletionSummary, ResourceCleaner};
use crate::client::ClusterClient;
use crate::decrypt::Decryptor;
use crate::secrets::SecretsProvisioner;

/// Where in `init` or `cleanup` a failure happened
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Validate,
    Secrets,
    Volumes,
    Service,
    Ports,
    Assemble,
    SubmitPod,
    DeletePods,
    DeleteSecrets,
    DeleteServices,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validate => "validate",
            Stage::Secrets => "secrets",
            Stage::Volumes => "volumes",
            Stage::Service => "service",
            Stage::Ports => "ports",
            Stage::Assemble => "assemble",
            Stage::SubmitPod => "submit-pod",
            Stage::DeletePods => "delete-pods",
            Stage::DeleteSecrets => "delete-secrets",
            Stage::DeleteServices => "delete-services",
        };
        f.write_str(name)
    }
}

/// Result of an operation that may stop early without failing the caller
#[derive(Debug)]
pub enum Outcome<T> {
    /// Every stage ran
    Completed(T),
    /// A cluster-API error stopped the operation and the failure policy
    /// chose to report it rather than fail. The unit may be partially
    /// provisioned; follow up with `cleanup`.
    Abandoned { stage: Stage, error: Error },
}

impl<T> Outcome<T> {
    /// Completed value, if any
    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            Outcome::Abandoned { .. } => None,
        }
    }
}

/// What `init` created
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InitReport {
    pub pod: String,
    pub service: String,
    pub secrets: ProvisionedSecrets,
    pub ports: PortAssignment,
}

/// What `cleanup` deleted, per kind
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub pods: DeletionSummary,
    pub secrets: DeletionSummary,
    pub services: DeletionSummary,
}

impl CleanupReport {
    /// Objects deleted across all kinds
    pub fn total_deleted(&self) -> usize {
        self.pods.deleted + self.secrets.deleted + self.services.deleted
    }

    /// Objects whose delete failed across all kinds
    pub fn total_failed(&self) -> usize {
        self.pods.failed + self.secrets.failed + self.services.failed
    }
}

/// A pod and its control service, ready to submit
#[derive(Clone, Debug, PartialEq)]
pub struct PodPlan {
    pub service: Service,
    pub pod: Pod,
    pub ports: PortAssignment,
}

struct StageError {
    stage: Stage,
    error: Error,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageError>;
}

impl<T> AtStage<T> for Result<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageError> {
        self.map_err(|error| StageError { stage, error })
    }
}

/// Top-level controller
///
/// Holds only immutable configuration and shared collaborators, so one
/// instance can serve distinct units concurrently.
#[derive(Clone)]
pub struct Orchestrator {
    client: Arc<dyn ClusterClient>,
    decryptor: Arc<dyn Decryptor>,
    config: Arc<ControllerConfig>,
}

impl Orchestrator {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        decryptor: Arc<dyn Decryptor>,
        config: Arc<ControllerConfig>,
    ) -> Self {
        Self {
            client,
            decryptor,
            config,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Provision the unit: secrets, control service, then the pod
    pub async fn init(&self, unit_id: &str, unit: &UnitSpec) -> Result<Outcome<InitReport>> {
        info!(unit = %unit_id, steps = unit.steps.len(), "initializing execution unit");
        match self.try_init(unit_id, unit).await {
            Ok(report) => {
                info!(unit = %unit_id, pod = %report.pod, "execution unit initialized");
                Ok(Outcome::Completed(report))
            }
            Err(e) => self.settle(unit_id, e),
        }
    }

    async fn try_init(
        &self,
        unit_id: &str,
        unit: &UnitSpec,
    ) -> std::result::Result<InitReport, StageError> {
        unit.validate(unit_id).at(Stage::Validate)?;
        let volumes = resolve_volumes(unit_id, &unit.volumes, &self.config).at(Stage::Volumes)?;

        let secrets = SecretsProvisioner::new(&*self.client, &*self.decryptor, &self.config)
            .provision(unit_id, unit)
            .await
            .at(Stage::Secrets)?;

        let plan = plan(&self.config, unit_id, unit, &volumes, &secrets)?;

        self.client
            .create_service(&plan.service)
            .await
            .at(Stage::Service)?;
        self.client.create_pod(&plan.pod).await.at(Stage::SubmitPod)?;

        Ok(InitReport {
            pod: plan.pod.metadata.name,
            service: plan.service.metadata.name,
            secrets,
            ports: plan.ports,
        })
    }

    /// Build the pod and service `init` would submit, without touching the
    /// cluster
    pub fn render(&self, unit_id: &str, unit: &UnitSpec) -> Result<PodPlan> {
        render(&self.config, unit_id, unit)
    }

    /// Steps are driven by the control container inside the pod
    pub async fn execute(&self, unit_id: &str, _steps: &[StepSpec]) -> Result<()> {
        warn!(unit = %unit_id, "execute called; steps are run by the control container");
        Err(Error::unsupported("execute"))
    }

    /// Delete the unit's pods, then secrets, then services
    pub async fn cleanup(&self, unit_id: &str) -> Result<Outcome<CleanupReport>> {
        info!(unit = %unit_id, "cleaning up execution unit");
        match self.try_cleanup(unit_id).await {
            Ok(report) => {
                info!(
                    unit = %unit_id,
                    deleted = report.total_deleted(),
                    failed = report.total_failed(),
                    "execution unit cleaned up"
                );
                Ok(Outcome::Completed(report))
            }
            Err(e) => self.settle(unit_id, e),
        }
    }

    async fn try_cleanup(&self, unit_id: &str) -> std::result::Result<CleanupReport, StageError> {
        // an id that is not a valid label value could select another unit
        validate_unit_id(unit_id).at(Stage::Validate)?;
        let cleaner = ResourceCleaner::new(&*self.client, &self.config);
        let pods = cleaner.delete_pods(unit_id).await.at(Stage::DeletePods)?;
        let secrets = cleaner
            .delete_secrets(unit_id)
            .await
            .at(Stage::DeleteSecrets)?;
        let services = cleaner
            .delete_services(unit_id)
            .await
            .at(Stage::DeleteServices)?;
        Ok(CleanupReport {
            pods,
            secrets,
            services,
        })
    }

    /// Apply the failure policy to a stage failure
    fn settle<T>(&self, unit_id: &str, failure: StageError) -> Result<Outcome<T>> {
        let StageError { stage, error } = failure;
        let swallow = self.config.failure_policy == FailurePolicy::SwallowClusterErrors
            && error.is_cluster_api();
        if swallow {
            warn!(
                unit = %unit_id,
                stage = %stage,
                error = %error,
                retryable = error.is_retryable(),
                "cluster API error, abandoning operation"
            );
            Ok(Outcome::Abandoned { stage, error })
        } else {
            error!(
                unit = %unit_id,
                stage = %stage,
                error = %error,
                retryable = error.is_retryable(),
                "operation failed"
            );
            Err(error)
        }
    }
}

/// Build a unit's pod and control service from configuration alone.
///
/// Secret names are the ones provisioning would create.
pub fn render(config: &ControllerConfig, unit_id: &str, unit: &UnitSpec) -> Result<PodPlan> {
    unit.validate(unit_id)?;
    let volumes = resolve_volumes(unit_id, &unit.volumes, config)?;
    let secrets = ProvisionedSecrets::planned(unit_id, unit);
    plan(config, unit_id, unit, &volumes, &secrets).map_err(|e| e.error)
}

fn plan(
    config: &ControllerConfig,
    unit_id: &str,
    unit: &UnitSpec,
    volumes: &ResolvedVolumes,
    secrets: &ProvisionedSecrets,
) -> std::result::Result<PodPlan, StageError> {
    let assembler = PodAssembler::new(config);
    let service = assembler.service(unit_id);

    let step_ids: Vec<&str> = unit.steps.iter().map(|s| s.id.as_str()).collect();
    let ports = PortAllocator::from_config(config)
        .allocate(&step_ids)
        .at(Stage::Ports)?;

    let pod = assembler
        .assemble(&PodInputs {
            unit_id,
            unit,
            ports: &ports,
            volumes,
            secrets,
        })
        .at(Stage::Assemble)?;

    Ok(PodPlan {
        service,
        pod,
        ports,
    })
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;

    use super::*;
    use crate::client::{api_error, MockClusterClient, ResourceKind};
    use crate::decrypt::{DecryptedSecret, MockDecryptor};
    use crate::testing::FakeCluster;
    use podwright_common::{EncryptedRecord, EncryptionConfig, SecretRef, VolumeDecl};

    fn unit() -> UnitSpec {
        UnitSpec {
            steps: ["build", "test"]
                .iter()
                .map(|id| StepSpec {
                    id: id.to_string(),
                    image: "golang:1.22".to_string(),
                    ..Default::default()
                })
                .collect(),
            image_pull_secrets: vec![SecretRef {
                encryption: EncryptionConfig {
                    provider: "kms".to_string(),
                    ..Default::default()
                },
                records: vec![EncryptedRecord {
                    key: ".dockerconfigjson".to_string(),
                    ciphertext: "opaque".to_string(),
                }],
            }],
            volumes: vec![VolumeDecl::EmptyDir {
                name: "cache".to_string(),
                mount_path: "/cache".to_string(),
                medium: None,
                size_limit: None,
            }],
            ..Default::default()
        }
    }

    fn decryptor() -> MockDecryptor {
        let mut decryptor = MockDecryptor::new();
        decryptor.expect_decrypt().returning(|_, _| {
            let mut secret = DecryptedSecret::new();
            secret.insert(".dockerconfigjson", "{\"auths\":{}}".to_string());
            Ok(secret)
        });
        decryptor
    }

    fn orchestrator(client: Arc<dyn ClusterClient>, policy: FailurePolicy) -> Orchestrator {
        let config = ControllerConfig {
            failure_policy: policy,
            ..Default::default()
        };
        Orchestrator::new(client, Arc::new(decryptor()), Arc::new(config))
    }

    /// Story: a two-step unit is provisioned and then fully reclaimed;
    /// a second cleanup finds nothing left
    #[tokio::test]
    async fn story_init_then_cleanup_twice() {
        let cluster = Arc::new(FakeCluster::default());
        let orch = orchestrator(cluster.clone(), FailurePolicy::SwallowClusterErrors);

        let report = orch
            .init("u1", &unit())
            .await
            .unwrap()
            .completed()
            .expect("init should complete");

        assert_eq!(report.pod, "u1");
        assert_eq!(report.service, "u1-control");
        assert_eq!(report.secrets.image_pull, ["u1-image-0"]);
        assert_eq!(report.secrets.per_step.len(), 2);
        assert_eq!(report.ports.get("build"), Some(20002));
        assert_eq!(report.ports.get("test"), Some(20003));

        let services = cluster.services();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].spec.ports[0].port, 20001);

        let pods = cluster.pods();
        assert_eq!(pods.len(), 1);
        let pod = &pods[0];
        assert_eq!(pod.spec.init_containers.len(), 1);
        assert_eq!(pod.spec.containers.len(), 3);
        assert_eq!(pod.spec.containers[0].name, "control");
        assert_eq!(pod.spec.containers[1].ports[0].container_port, 20002);
        assert_eq!(pod.spec.containers[2].ports[0].container_port, 20003);
        let volumes: Vec<&str> = pod.spec.volumes.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(volumes, ["workdir", "tooling", "cache"]);

        assert_eq!(
            cluster.names(ResourceKind::Secret),
            ["u1-image-0", "u1-log-service"]
        );

        let cleanup = orch.cleanup("u1").await.unwrap().completed().unwrap();
        assert_eq!(cleanup.pods.deleted, 1);
        assert_eq!(cleanup.secrets.deleted, 2);
        assert_eq!(cleanup.services.deleted, 1);
        assert_eq!(cleanup.total_failed(), 0);
        assert_eq!(
            cluster.deleted(),
            [
                (ResourceKind::Pod, "u1".to_string()),
                (ResourceKind::Secret, "u1-image-0".to_string()),
                (ResourceKind::Secret, "u1-log-service".to_string()),
                (ResourceKind::Service, "u1-control".to_string()),
            ]
        );

        let again = orch.cleanup("u1").await.unwrap().completed().unwrap();
        assert_eq!(again.total_deleted(), 0);
        assert_eq!(again, CleanupReport::default());
    }

    /// Story: cleanup of one unit never touches another unit's objects
    #[tokio::test]
    async fn story_cleanup_is_scoped_to_the_unit() {
        let cluster = Arc::new(FakeCluster::default());
        let orch = orchestrator(cluster.clone(), FailurePolicy::SwallowClusterErrors);
        orch.init("u1", &unit()).await.unwrap();
        orch.init("u2", &unit()).await.unwrap();

        orch.cleanup("u1").await.unwrap();
        assert_eq!(cluster.names(ResourceKind::Pod), ["u2"]);
        assert_eq!(cluster.names(ResourceKind::Service), ["u2-control"]);
    }

    /// Story: a failing pod delete is logged, the rest of cleanup proceeds
    #[tokio::test]
    async fn story_failed_delete_does_not_abort_cleanup() {
        let cluster = Arc::new(FakeCluster::default());
        let orch = orchestrator(cluster.clone(), FailurePolicy::SwallowClusterErrors);
        orch.init("u1", &unit()).await.unwrap();
        cluster.fail_delete_of("u1");

        let report = orch.cleanup("u1").await.unwrap().completed().unwrap();
        assert_eq!(report.pods, DeletionSummary { deleted: 0, failed: 1 });
        assert_eq!(report.secrets.deleted, 2);
        assert_eq!(report.services.deleted, 1);
        assert_eq!(cluster.names(ResourceKind::Pod), ["u1"]);
    }

    #[tokio::test]
    async fn cluster_error_on_pod_submit_is_swallowed_by_default() {
        let cluster = Arc::new(FakeCluster::default());
        cluster.fail_create_of("u1");
        let orch = orchestrator(cluster.clone(), FailurePolicy::SwallowClusterErrors);

        match orch.init("u1", &unit()).await.unwrap() {
            Outcome::Abandoned { stage, error } => {
                assert_eq!(stage, Stage::SubmitPod);
                assert!(error.is_cluster_api());
            }
            other => panic!("Expected Abandoned, got {other:?}"),
        }
        // the service was created before the failure
        assert_eq!(cluster.names(ResourceKind::Service), ["u1-control"]);
    }

    #[tokio::test]
    async fn cluster_error_propagates_under_propagate_all() {
        let cluster = Arc::new(FakeCluster::default());
        cluster.fail_create_of("u1-control");
        let orch = orchestrator(cluster.clone(), FailurePolicy::PropagateAll);

        let err = orch.init("u1", &unit()).await.unwrap_err();
        assert!(err.is_cluster_api());
        assert!(cluster.pods().is_empty());
    }

    #[tokio::test]
    async fn secret_failure_is_fatal_under_either_policy() {
        for policy in [FailurePolicy::SwallowClusterErrors, FailurePolicy::PropagateAll] {
            let cluster = Arc::new(FakeCluster::default());
            cluster.fail_create_of("u1-image-0");
            let orch = orchestrator(cluster.clone(), policy);

            let err = orch.init("u1", &unit()).await.unwrap_err();
            assert!(matches!(err, Error::SecretProvisioning { .. }));
            assert!(cluster.services().is_empty());
            assert!(cluster.pods().is_empty());
        }
    }

    #[tokio::test]
    async fn configuration_errors_are_never_swallowed() {
        let cluster = Arc::new(FakeCluster::default());
        let orch = orchestrator(cluster.clone(), FailurePolicy::SwallowClusterErrors);

        let mut bad_image = unit();
        bad_image.steps[1].image = String::new();
        let err = orch.init("u1", &bad_image).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(cluster.names(ResourceKind::Secret).is_empty());

        let mut bad_volume = unit();
        bad_volume.volumes.push(VolumeDecl::Unsupported);
        let err = orch.init("u1", &bad_volume).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedVolumeKind { index: 1 }));
        assert!(cluster.names(ResourceKind::Secret).is_empty());
        assert!(cluster.pods().is_empty());
    }

    #[tokio::test]
    async fn volume_shadowing_the_workspace_is_rejected_before_any_create() {
        let cluster = Arc::new(FakeCluster::default());
        let orch = orchestrator(cluster.clone(), FailurePolicy::SwallowClusterErrors);

        let mut shadowing = unit();
        shadowing.volumes.push(VolumeDecl::EmptyDir {
            name: "workdir".to_string(),
            mount_path: "/scratch".to_string(),
            medium: None,
            size_limit: None,
        });
        match orch.init("u1", &shadowing).await.unwrap_err() {
            Error::Validation { field, .. } => {
                assert_eq!(field.as_deref(), Some("volumes[1].name"))
            }
            other => panic!("Expected Validation, got {other:?}"),
        }
        assert!(cluster.names(ResourceKind::Secret).is_empty());
        assert!(cluster.services().is_empty());
        assert!(cluster.pods().is_empty());
    }

    /// Story: unit ids are never rewritten, so a malformed id cannot
    /// select the objects of a unit whose id it sanitizes to
    #[tokio::test]
    async fn story_malformed_cleanup_id_leaves_other_units_alone() {
        let cluster = Arc::new(FakeCluster::default());
        let orch = orchestrator(cluster.clone(), FailurePolicy::SwallowClusterErrors);
        orch.init("u-1", &unit()).await.unwrap().completed().unwrap();

        let err = orch.cleanup("u/1").await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(orch.init("u/1", &unit()).await.is_err());

        assert!(cluster.deleted().is_empty());
        assert_eq!(cluster.names(ResourceKind::Pod), ["u-1"]);
        assert_eq!(cluster.names(ResourceKind::Service), ["u-1-control"]);
        assert_eq!(
            cluster.names(ResourceKind::Secret),
            ["u-1-image-0", "u-1-log-service"]
        );
    }

    #[tokio::test]
    async fn listing_failure_during_cleanup_follows_policy() {
        let mut client = MockClusterClient::new();
        client
            .expect_list()
            .with(eq(ResourceKind::Pod), eq("podwright"), eq("podwright.dev/unit=u1"))
            .returning(|_, _, _| Err(api_error(503, "unavailable")));
        let client: Arc<dyn ClusterClient> = Arc::new(client);

        let orch = orchestrator(client.clone(), FailurePolicy::SwallowClusterErrors);
        match orch.cleanup("u1").await.unwrap() {
            Outcome::Abandoned { stage, .. } => assert_eq!(stage, Stage::DeletePods),
            other => panic!("Expected Abandoned, got {other:?}"),
        }

        let orch = orchestrator(client, FailurePolicy::PropagateAll);
        assert!(orch.cleanup("u1").await.is_err());
    }

    #[tokio::test]
    async fn execute_is_unsupported() {
        let orch = orchestrator(
            Arc::new(FakeCluster::default()),
            FailurePolicy::SwallowClusterErrors,
        );
        let err = orch.execute("u1", &unit().steps).await.unwrap_err();
        assert!(matches!(err, Error::Unsupported { .. }));
    }

    #[test]
    fn render_matches_what_init_submits() {
        let orch = orchestrator(
            Arc::new(FakeCluster::default()),
            FailurePolicy::SwallowClusterErrors,
        );
        let plan = orch.render("u1", &unit()).unwrap();
        assert_eq!(plan.pod.spec.image_pull_secrets[0].name, "u1-image-0");
        assert_eq!(plan.service.metadata.name, "u1-control");
        assert_eq!(
            plan.pod.spec.containers[0].env_from[0].secret_ref.name,
            "u1-log-service"
        );
    }
}
