//! Resource store abstraction
//!
//! The reconciler persists claims, buckets, secrets and config maps through
//! [`ResourceStore`]. The store distinguishes "not found" and "already exists"
//! from other failures ([`crate::Error::NotFound`], [`crate::Error::AlreadyExists`])
//! and is responsible for optimistic concurrency and for honoring the
//! ObjectBucket finalizer. [`KubeResourceStore`] implements it against the
//! Kubernetes API.

mod kube_store;

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::ResourceExt;

use crate::crd::{ObjectBucket, ObjectBucketClaim};
use crate::Result;

pub use kube_store::KubeResourceStore;

/// Namespace + name identity of a namespaced record
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    /// Namespace of the record
    pub namespace: String,
    /// Name of the record
    pub name: String,
}

impl ObjectKey {
    /// Create a key from a namespace and name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an existing namespaced resource
    ///
    /// Cluster-scoped resources have no namespace and yield `None`.
    pub fn for_resource<K: ResourceExt>(resource: &K) -> Option<Self> {
        resource
            .namespace()
            .map(|namespace| Self::new(namespace, resource.name_any()))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Get/create/update/delete over the records the reconciler owns
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch an ObjectBucketClaim
    async fn get_claim(&self, key: &ObjectKey) -> Result<ObjectBucketClaim>;

    /// Persist spec and status changes to an ObjectBucketClaim
    ///
    /// A claim without status only writes the spec. Spec and status may be
    /// separate writes, so an error can leave the new spec persisted.
    async fn update_claim(&self, claim: &ObjectBucketClaim) -> Result<ObjectBucketClaim>;

    /// Fetch a cluster-scoped StorageClass
    async fn get_storage_class(&self, name: &str) -> Result<StorageClass>;

    /// Fetch a cluster-scoped ObjectBucket
    async fn get_bucket(&self, name: &str) -> Result<ObjectBucket>;

    /// Create an ObjectBucket
    async fn create_bucket(&self, bucket: &ObjectBucket) -> Result<ObjectBucket>;

    /// Remove an ObjectBucket, releasing its finalizer first
    async fn delete_bucket(&self, name: &str) -> Result<()>;

    /// Fetch a Secret
    async fn get_secret(&self, key: &ObjectKey) -> Result<Secret>;

    /// Create a Secret
    async fn create_secret(&self, secret: &Secret) -> Result<Secret>;

    /// Delete a Secret
    async fn delete_secret(&self, key: &ObjectKey) -> Result<()>;

    /// Fetch a ConfigMap
    async fn get_config_map(&self, key: &ObjectKey) -> Result<ConfigMap>;

    /// Create a ConfigMap
    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap>;

    /// Delete a ConfigMap
    async fn delete_config_map(&self, key: &ObjectKey) -> Result<()>;
}
