//! Supporting types for the ObjectBucketClaim and ObjectBucket CRDs

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lifecycle phase of an ObjectBucketClaim
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ClaimPhase {
    /// Claim observed, no bucket bound yet
    #[default]
    Pending,
    /// A bucket has been provisioned or granted and bound to the claim
    Bound,
    /// The bound bucket was released
    Released,
    /// Provisioning failed permanently
    Failed,
}

impl std::fmt::Display for ClaimPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Bound => write!(f, "Bound"),
            Self::Released => write!(f, "Released"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// What happens to the bucket when its claim is released
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ReclaimPolicy {
    /// Delete the bucket together with the claim
    #[default]
    Delete,
    /// Keep the bucket after the claim is gone
    Retain,
}

impl ReclaimPolicy {
    /// Parse the StorageClass `reclaimPolicy` field, defaulting to Delete
    pub fn from_class_field(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("retain") => Self::Retain,
            _ => Self::Delete,
        }
    }
}

impl std::fmt::Display for ReclaimPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Delete => write!(f, "Delete"),
            Self::Retain => write!(f, "Retain"),
        }
    }
}

/// Where and how to reach a bucket
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Object store host name
    #[serde(default)]
    pub bucket_host: String,

    /// Object store port
    #[serde(default)]
    pub bucket_port: i32,

    /// Name of the bucket in the object store
    #[serde(default)]
    pub bucket_name: String,

    /// Whether the endpoint is served over TLS
    #[serde(default)]
    pub ssl: bool,

    /// Object store region
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub region: String,

    /// Object store sub-region
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sub_region: String,

    /// Extra connection settings exposed to the workload
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_config: BTreeMap<String, String>,
}

/// Access key pair for a bucket
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeys {
    /// Access key id
    pub access_key_id: String,

    /// Secret access key
    pub secret_access_key: String,
}

/// Credentials a workload uses to reach a bucket
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Authentication {
    /// Access key pair, if the backend uses one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_keys: Option<AccessKeys>,

    /// Extra secret values exposed to the workload
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_secret_data: BTreeMap<String, String>,
}

/// Back-reference from an ObjectBucket to the claim it was provisioned for
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRef {
    /// Namespace of the claim
    pub namespace: String,

    /// Name of the claim
    pub name: String,

    /// UID of the claim at provisioning time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}
