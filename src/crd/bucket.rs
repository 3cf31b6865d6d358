//! ObjectBucket Custom Resource Definition
//!
//! An ObjectBucket is the cluster-scoped binding between a claim and the
//! bucket a provisioner created or granted access to. Its name is derived
//! from the claim identity, and it carries a finalizer until the provisioner
//! confirms the bucket was deleted or access was revoked.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Authentication, ClaimRef, Endpoint, ReclaimPolicy};
use crate::BUCKET_FINALIZER;

/// Specification for an ObjectBucket
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "objectbucket.io",
    version = "v1alpha1",
    kind = "ObjectBucket",
    plural = "objectbuckets",
    shortname = "ob",
    printcolumn = r#"{"name":"StorageClass","type":"string","jsonPath":".spec.storageClassName"}"#,
    printcolumn = r#"{"name":"Claim-Namespace","type":"string","jsonPath":".spec.claimRef.namespace"}"#,
    printcolumn = r#"{"name":"Claim-Name","type":"string","jsonPath":".spec.claimRef.name"}"#,
    printcolumn = r#"{"name":"Reclaim-Policy","type":"string","jsonPath":".spec.reclaimPolicy"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ObjectBucketSpec {
    /// StorageClass the bucket was provisioned from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    /// Claim this bucket is bound to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_ref: Option<ClaimRef>,

    /// Copy of the StorageClass reclaim policy
    #[serde(default)]
    pub reclaim_policy: ReclaimPolicy,

    /// Connection details for the bucket
    #[serde(default)]
    pub endpoint: Endpoint,

    /// Credentials for the bucket
    #[serde(default)]
    pub authentication: Authentication,
}

impl ObjectBucket {
    /// Build an unnamed ObjectBucket, as returned by a provisioner
    pub fn from_parts(endpoint: Endpoint, authentication: Authentication) -> Self {
        Self::new(
            "",
            ObjectBucketSpec {
                endpoint,
                authentication,
                ..Default::default()
            },
        )
    }

    /// Returns true if a provisioner result describes a usable bucket
    ///
    /// A bucket must at least name itself and the host serving it.
    pub fn is_valid(&self) -> bool {
        !self.spec.endpoint.bucket_name.trim().is_empty()
            && !self.spec.endpoint.bucket_host.trim().is_empty()
    }

    /// Returns true if the deprovisioning finalizer is present
    pub fn has_finalizer(&self) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|name| name == BUCKET_FINALIZER))
    }
}
