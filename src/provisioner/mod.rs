//! Provisioner plugin contract
//!
//! A provisioner owns the mechanics of a bucket backend (S3, Ceph RGW,
//! MinIO, ...). The reconciler drives it through four operations and owns all
//! of the Kubernetes bookkeeping around them:
//!
//! - [`Provisioner::provision`] creates a brand-new bucket (dynamic mode)
//! - [`Provisioner::grant`] authorizes access to an existing bucket (static mode)
//! - [`Provisioner::delete`] destroys a bucket created by `provision`
//! - [`Provisioner::revoke`] removes access created by `grant`

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::crd::{ObjectBucket, ObjectBucketClaim, ReclaimPolicy};

/// Errors a provisioner reports back to the reconciler
#[derive(Debug, Error)]
pub enum ProvisionerError {
    /// The bucket already exists in the backend
    ///
    /// Treated as a benign race: the reconciler will not delete the bucket
    /// while cleaning up after this error.
    #[error("bucket {0} already exists")]
    BucketExists(String),

    /// Any other backend failure
    #[error("{0}")]
    Failed(String),
}

impl ProvisionerError {
    /// Create a generic backend failure
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Everything a provisioner needs to create or grant a bucket
#[derive(Clone, Debug)]
pub struct BucketOptions {
    /// Reclaim policy of the StorageClass
    pub reclaim_policy: ReclaimPolicy,
    /// Bucket name to create or grant access to
    pub bucket_name: String,
    /// Snapshot of the claim being provisioned
    pub claim: ObjectBucketClaim,
    /// StorageClass parameters
    pub parameters: BTreeMap<String, String>,
}

/// Bucket backend implemented by the integrator
///
/// Implementations must be safe to call once per distinct bucket name;
/// the reconciler derives bucket names deterministically so a retried pass
/// asks for the same bucket again.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Create a new bucket and return its endpoint and credentials
    async fn provision(&self, options: &BucketOptions) -> Result<ObjectBucket, ProvisionerError>;

    /// Grant access to the existing bucket named in `options`
    async fn grant(&self, options: &BucketOptions) -> Result<ObjectBucket, ProvisionerError>;

    /// Destroy a bucket previously created by [`Provisioner::provision`]
    async fn delete(&self, bucket: &ObjectBucket) -> Result<(), ProvisionerError>;

    /// Remove access previously created by [`Provisioner::grant`]
    async fn revoke(&self, bucket: &ObjectBucket) -> Result<(), ProvisionerError>;
}
