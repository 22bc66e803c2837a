//! Pure builders for execution-unit pods
//!
//! Nothing here talks to the cluster: given a unit declaration, its
//! provisioned secret names and the controller configuration, these modules
//! produce the exact pod and service the controller submits.

pub mod container;
pub mod k8s;
pub mod pod;
pub mod ports;
pub mod volumes;

pub use container::ContainerSpecBuilder;
pub use pod::{PodAssembler, PodInputs, ProvisionedSecrets};
pub use ports::{PortAllocator, PortAssignment};
pub use volumes::{resolve as resolve_volumes, ResolvedVolumes};
