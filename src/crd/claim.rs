//! ObjectBucketClaim Custom Resource Definition
//!
//! An ObjectBucketClaim is a user's request for a bucket. The reconciler
//! either provisions a new bucket or grants access to an existing one, then
//! records the binding on the claim.

use std::collections::BTreeMap;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::ClaimPhase;
use crate::SKIP_PROVISIONING_ANNOTATION;

/// Specification for an ObjectBucketClaim
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "objectbucket.io",
    version = "v1alpha1",
    kind = "ObjectBucketClaim",
    plural = "objectbucketclaims",
    shortname = "obc",
    status = "ObjectBucketClaimStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"StorageClass","type":"string","jsonPath":".spec.storageClassName"}"#,
    printcolumn = r#"{"name":"Bucket","type":"string","jsonPath":".spec.bucketName"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ObjectBucketClaimSpec {
    /// StorageClass that selects the provisioner and its parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    /// Explicit bucket name; set by the reconciler once provisioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_name: Option<String>,

    /// Prefix for a generated bucket name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_bucket_name: Option<String>,

    /// Name of the bound ObjectBucket; set by the reconciler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_bucket_name: Option<String>,

    /// Extra settings passed through to the provisioner
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_config: BTreeMap<String, String>,
}

/// Status for an ObjectBucketClaim
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectBucketClaimStatus {
    /// Current phase of the claim
    #[serde(default)]
    pub phase: ClaimPhase,
}

impl ObjectBucketClaimStatus {
    /// Create a new status with the given phase
    pub fn with_phase(phase: ClaimPhase) -> Self {
        Self { phase }
    }
}

impl ObjectBucketClaim {
    /// Current phase, defaulting to Pending when no status was written yet
    pub fn phase(&self) -> ClaimPhase {
        self.status
            .as_ref()
            .map(|s| s.phase)
            .unwrap_or(ClaimPhase::Pending)
    }

    /// Referenced StorageClass, if any
    pub fn storage_class_name(&self) -> Option<&str> {
        self.spec
            .storage_class_name
            .as_deref()
            .filter(|name| !name.is_empty())
    }

    /// Returns true if the reconciler still has to provision for this claim
    ///
    /// A claim is done once it names its ObjectBucket or reached Bound; it is
    /// never provisioned without a StorageClass or when the skip annotation is set.
    pub fn requests_provisioning(&self) -> bool {
        if self
            .spec
            .object_bucket_name
            .as_deref()
            .is_some_and(|name| !name.is_empty())
        {
            tracing::debug!("provisioning already completed");
            return false;
        }
        if self.phase() == ClaimPhase::Bound {
            tracing::debug!("claim already bound");
            return false;
        }
        if self.storage_class_name().is_none() {
            tracing::debug!("claim has no storage class");
            return false;
        }
        let skip = self
            .annotations()
            .get(SKIP_PROVISIONING_ANNOTATION)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        if skip {
            tracing::debug!("claim is marked to skip provisioning");
            return false;
        }
        true
    }
}
