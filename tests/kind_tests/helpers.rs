//! Shared fixtures for cluster tests

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use kube::Client;

use podwright::common::{
    ControllerConfig, EncryptedRecord, EncryptionConfig, SecretRef, StepSpec, UnitSpec,
};
use podwright::controller::{Base64Decryptor, KubeClusterClient, Orchestrator};

/// Namespace the tests provision into
pub const TEST_NAMESPACE: &str = "podwright-e2e";

/// Connect with the ambient kubeconfig
pub async fn test_client() -> Arc<KubeClusterClient> {
    let client = Client::try_default()
        .await
        .expect("a reachable cluster is required for kind tests");
    Arc::new(KubeClusterClient::new(client))
}

pub fn test_config() -> Arc<ControllerConfig> {
    Arc::new(ControllerConfig {
        namespace: TEST_NAMESPACE.to_string(),
        watch_timeout_seconds: 10,
        ..Default::default()
    })
}

pub fn test_orchestrator(client: Arc<KubeClusterClient>) -> Orchestrator {
    Orchestrator::new(client, Arc::new(Base64Decryptor), test_config())
}

/// Unit id that will not collide with earlier runs
pub fn unique_unit_id(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    format!("{prefix}-{nanos:x}")
}

fn base64_secret(key: &str, value: &str) -> SecretRef {
    use base64::Engine;
    SecretRef {
        encryption: EncryptionConfig {
            provider: "base64".to_string(),
            ..Default::default()
        },
        records: vec![EncryptedRecord {
            key: key.to_string(),
            ciphertext: base64::engine::general_purpose::STANDARD.encode(value),
        }],
    }
}

/// Two-step unit with one registry credential and one step secret
pub fn sample_unit() -> UnitSpec {
    let step = |id: &str| StepSpec {
        id: id.to_string(),
        image: "busybox:1.36".to_string(),
        ..Default::default()
    };
    let mut unit = UnitSpec {
        steps: vec![step("build"), step("test")],
        image_pull_secrets: vec![base64_secret(".dockerconfigjson", r#"{"auths":{}}"#)],
        ..Default::default()
    };
    unit.steps[1]
        .secrets
        .push(base64_secret("API_TOKEN", "s3cr3t"));
    unit
}
