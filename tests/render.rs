//! Rendering a unit declaration file into the objects `init` submits
//!
//! Needs no cluster: the declaration is parsed the way the CLI parses it and
//! rendered from configuration alone.

use podwright::common::naming::{pod_name, service_name};
use podwright::common::{ControllerConfig, UnitSpec};
use podwright::controller::render;

const UNIT_YAML: &str = r#"
steps:
  - id: compile
    image: rust:1.80
    workingDir: /workspace/src
    env:
      CARGO_TERM_COLOR: never
    resources:
      cpu: "2"
      memory: 2Gi
  - id: docker build
    image: plugins/docker:20
volumes:
  - kind: emptyDir
    name: cache
    mountPath: /cache
nodeSelector:
  pool: builders
labels:
  team: infra
"#;

fn parse() -> UnitSpec {
    serde_yaml::from_str(UNIT_YAML).expect("declaration should parse")
}

/// Story: a two-step declaration renders to one pod with a bootstrap init
/// container, the control container and a container per step
#[test]
fn story_declaration_renders_to_pod_and_service() {
    let config = ControllerConfig::default();
    let plan = render(&config, "ci-42", &parse()).expect("render should succeed");

    assert_eq!(plan.pod.metadata.name, pod_name("ci-42"));
    assert_eq!(plan.service.metadata.name, service_name("ci-42"));
    assert_eq!(plan.pod.metadata.labels.get("team").map(String::as_str), Some("infra"));

    let spec = &plan.pod.spec;
    assert_eq!(spec.init_containers.len(), 1);
    let names: Vec<&str> = spec.containers.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["control", "step-compile", "step-docker-build"]);
    assert_eq!(spec.node_selector.get("pool").map(String::as_str), Some("builders"));

    // Ports follow step order, right after the control port
    assert_eq!(plan.ports.get("compile"), Some(config.step_port_base));
    assert_eq!(plan.ports.get("docker build"), Some(config.step_port_base + 1));
}

#[test]
fn privileged_image_step_runs_privileged() {
    let plan = render(&ControllerConfig::default(), "ci-42", &parse()).unwrap();
    let dind = plan
        .pod
        .spec
        .containers
        .iter()
        .find(|c| c.name == "step-docker-build")
        .unwrap();
    let security = dind.security_context.as_ref().unwrap();
    assert_eq!(security.privileged, Some(true));
}

#[test]
fn rendered_pod_serializes_as_a_kubernetes_manifest() {
    let plan = render(&ControllerConfig::default(), "ci-42", &parse()).unwrap();
    let yaml = serde_yaml::to_string(&plan.pod).unwrap();

    assert!(yaml.contains("kind: Pod"));
    assert!(yaml.contains("restartPolicy: Never"));
    assert!(yaml.contains("initContainers:"));
}

#[test]
fn invalid_declaration_is_rejected_before_rendering() {
    let mut unit = parse();
    unit.steps[1].id = "compile".to_string();
    let err = render(&ControllerConfig::default(), "ci-42", &unit).unwrap_err();
    assert!(!err.is_cluster_api());
}
