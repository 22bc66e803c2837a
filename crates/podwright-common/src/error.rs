//! Error types for podwright
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant carries the context an operator needs to act on it: the
//! execution unit, the secret or field involved, and the underlying cause.

use thiserror::Error;

/// Main error type for podwright operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Invalid execution-unit or controller configuration
    #[error("validation error for {unit}: {message}")]
    Validation {
        /// Execution unit with the invalid declaration
        unit: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "steps[1].image")
        field: Option<String>,
    },

    /// A volume declaration of a kind the resolver cannot materialize
    #[error("unsupported volume kind at volumes[{index}]")]
    UnsupportedVolumeKind {
        /// Position of the offending declaration
        index: usize,
    },

    /// More steps than the step-port range can hold
    #[error("port range exhausted: {requested} steps requested, capacity {capacity}")]
    PortRangeExhausted {
        /// Number of steps that needed a port
        requested: usize,
        /// Number of ports in the step range
        capacity: u16,
    },

    /// The decryption backend rejected a secret
    #[error("decryption failed for {secret}: {message}")]
    Decryption {
        /// Name of the secret being provisioned
        secret: String,
        /// Description of what failed
        message: String,
    },

    /// Any failure while provisioning a cluster secret.
    ///
    /// Wraps cluster-API errors too, so a failed secret never reads as a
    /// swallowable cluster-API error.
    #[error("failed to provision secret {secret}: {source}")]
    SecretProvisioning {
        /// Name of the secret being provisioned
        secret: String,
        /// The underlying failure
        source: Box<Error>,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Operation deliberately not provided by this controller
    #[error("operation not supported: {operation}")]
    Unsupported {
        /// Operation name
        operation: String,
    },

    /// Controller configuration could not be loaded or is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Description of what's wrong
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "watcher", "cleaner")
        context: String,
    },
}

impl Error {
    /// Create a validation error with unit context
    pub fn validation_for(unit: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            unit: unit.into(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with unit context and field path
    pub fn validation_for_field(
        unit: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            unit: unit.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a decryption error for a named secret
    pub fn decryption(secret: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Decryption {
            secret: secret.into(),
            message: msg.into(),
        }
    }

    /// Wrap a failure that happened while provisioning `secret`
    pub fn secret_provisioning(secret: impl Into<String>, source: Error) -> Self {
        Self::SecretProvisioning {
            secret: secret.into(),
            source: Box::new(source),
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an unsupported-operation error
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// True when this error came straight from the cluster API.
    ///
    /// Only bare `Kube` errors qualify; secret-provisioning failures wrap
    /// their cause and never count.
    pub fn is_cluster_api(&self) -> bool {
        matches!(self, Error::Kube { .. })
    }

    /// True when the cluster API reported that the object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::Kube {
                source: kube::Error::Api(ae)
            } if ae.code == 404
        )
    }

    /// Check if this error is retryable
    ///
    /// Configuration-class errors (validation, unsupported volume kinds,
    /// exhausted port ranges) need a corrected declaration and are never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::SecretProvisioning { source, .. } => source.is_retryable(),
            Error::Validation { .. }
            | Error::UnsupportedVolumeKind { .. }
            | Error::PortRangeExhausted { .. }
            | Error::Decryption { .. }
            | Error::Serialization { .. }
            | Error::Unsupported { .. }
            | Error::Config { .. } => false,
            Error::Internal { .. } => true,
        }
    }
}

#[cfg(test)]
pub(crate) fn api_error(code: u16, message: &str) -> Error {
    Error::from(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: "Test".to_string(),
        code,
    }))
}
