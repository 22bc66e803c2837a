//! Common types for podwright: execution-unit declarations, configuration,
//! naming, errors and telemetry

pub mod config;
pub mod error;
pub mod kube_utils;
pub mod naming;
pub mod telemetry;
pub mod unit;

pub use config::{ControllerConfig, FailurePolicy};
pub use error::Error;
pub use unit::{
    DispatchSpec, EncryptedRecord, EncryptionConfig, FeatureFlags, ImageRef, LogServiceSpec,
    validate_unit_id, ResourceRequirements, SecretRef, SecurityPolicy, StepSpec, UnitSpec,
    VolumeDecl,
};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Control-container environment
// =============================================================================

/// Workspace path shared by every container
pub const ENV_WORKSPACE: &str = "PODWRIGHT_WORKSPACE";
/// Upload logs through the dispatch service instead of directly
pub const ENV_INDIRECT_LOG_UPLOAD: &str = "PODWRIGHT_INDIRECT_LOG_UPLOAD";
/// Report step status over REST instead of gRPC
pub const ENV_STATUS_OVER_REST: &str = "PODWRIGHT_STATUS_OVER_REST";
/// Endpoint of the dispatching service
pub const ENV_DISPATCH_ENDPOINT: &str = "PODWRIGHT_DISPATCH_ENDPOINT";
/// Identifier of the dispatching service
pub const ENV_DISPATCH_ID: &str = "PODWRIGHT_DISPATCH_ID";
/// Account that owns the unit
pub const ENV_ACCOUNT_ID: &str = "PODWRIGHT_ACCOUNT_ID";

// =============================================================================
// Logging secret keys
// =============================================================================

/// Log-service endpoint key in the logging secret
pub const LOG_SERVICE_ENDPOINT_KEY: &str = "PODWRIGHT_LOG_SERVICE_ENDPOINT";
/// Log-service token key in the logging secret
pub const LOG_SERVICE_TOKEN_KEY: &str = "PODWRIGHT_LOG_SERVICE_TOKEN";
/// Log-line prefix key in the logging secret
pub const LOG_KEY_PREFIX_KEY: &str = "PODWRIGHT_LOG_KEY_PREFIX";
