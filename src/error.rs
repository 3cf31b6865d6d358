//! Error types for the bucket provisioner
//!
//! Store failures keep "not found" and "already exists" distinguishable so the
//! reconciler can treat them as benign signals. Every failure that leaves a
//! provisioning step is wrapped in [`Error::Reconcile`] with the step and claim
//! that produced it.

use thiserror::Error;

use crate::provisioner::ProvisionerError;

/// Main error type for bucket provisioner operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error that is neither "not found" nor "already exists"
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Record is absent from the store
    #[error("{kind} {key} not found")]
    NotFound {
        /// Record kind (ObjectBucketClaim, Secret, ...)
        kind: String,
        /// Namespace/name or cluster-scoped name of the record
        key: String,
    },

    /// Record already exists in the store
    #[error("{kind} {key} already exists")]
    AlreadyExists {
        /// Record kind
        kind: String,
        /// Namespace/name or cluster-scoped name of the record
        key: String,
    },

    /// Generic persistence failure
    #[error("store error during {operation}: {message}")]
    Store {
        /// Store operation that failed (e.g., "create secret")
        operation: String,
        /// Description of what failed
        message: String,
    },

    /// The provisioner plugin failed
    #[error("provisioner error {operation} bucket {bucket:?}: {source}")]
    Provisioner {
        /// Plugin operation (provisioning, granting access to, deleting, revoking access to)
        operation: String,
        /// Bucket the operation targeted
        bucket: String,
        /// Error reported by the plugin
        source: ProvisionerError,
    },

    /// The provisioner plugin returned a result that cannot be used
    #[error("provisioner contract violation: {0}")]
    ContractViolation(String),

    /// Missing or inconsistent configuration (storage class, names, options)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A reconciliation step failed for a claim
    #[error("{step} failed for claim {claim}: {source}")]
    Reconcile {
        /// Step of the provisioning or deprovisioning flow
        step: &'static str,
        /// Namespace/name of the claim
        claim: String,
        /// Underlying failure
        source: Box<Error>,
    },
}

impl Error {
    /// Create a not-found error for a record kind and key
    pub fn not_found(kind: impl Into<String>, key: impl ToString) -> Self {
        Self::NotFound {
            kind: kind.into(),
            key: key.to_string(),
        }
    }

    /// Create an already-exists error for a record kind and key
    pub fn already_exists(kind: impl Into<String>, key: impl ToString) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            key: key.to_string(),
        }
    }

    /// Create a store error for the given operation
    pub fn store(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            message: msg.into(),
        }
    }

    /// Wrap a plugin failure with the operation and bucket it concerned
    pub fn provisioner(
        operation: impl Into<String>,
        bucket: impl Into<String>,
        source: ProvisionerError,
    ) -> Self {
        Self::Provisioner {
            operation: operation.into(),
            bucket: bucket.into(),
            source,
        }
    }

    /// Create a contract violation error with the given message
    pub fn contract_violation(msg: impl Into<String>) -> Self {
        Self::ContractViolation(msg.into())
    }

    /// Create a configuration error with the given message
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Attach step and claim context to an error
    pub fn reconcile(step: &'static str, claim: impl ToString, source: Error) -> Self {
        Self::Reconcile {
            step,
            claim: claim.to_string(),
            source: Box::new(source),
        }
    }

    /// The innermost error, looking through reconcile context
    pub fn root(&self) -> &Error {
        match self {
            Self::Reconcile { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns true if the record was absent
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::NotFound { .. })
    }

    /// Returns true if the failure is a benign "already exists" race signal,
    /// from either the store or the provisioner plugin
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self.root(),
            Self::AlreadyExists { .. }
                | Self::Provisioner {
                    source: ProvisionerError::BucketExists(_),
                    ..
                }
        )
    }

    /// Returns true if running the pass again may succeed
    ///
    /// Contract violations and configuration errors need a fix outside the
    /// reconciler and are not retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self.root(),
            Self::ContractViolation(_) | Self::Configuration(_)
        )
    }
}
