//! Kubernetes-backed resource store

use std::fmt::Display;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

use super::{ObjectKey, ResourceStore};
use crate::crd::{ObjectBucket, ObjectBucketClaim};
use crate::{Error, Result};

/// Field manager used for status and finalizer patches
const FIELD_MANAGER: &str = "bucket-provisioner";

/// Map a kube error to the store taxonomy
///
/// 404 becomes [`Error::NotFound`], an `AlreadyExists` conflict becomes
/// [`Error::AlreadyExists`]; everything else stays a kube error.
fn map_kube_error(err: kube::Error, kind: &str, key: impl Display) -> Error {
    match err {
        kube::Error::Api(ref ae) if ae.code == 404 => Error::not_found(kind, key),
        kube::Error::Api(ref ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
            Error::already_exists(kind, key)
        }
        other => Error::Kube(other),
    }
}

/// Name and namespace of a namespaced resource about to be created
fn namespaced_key<K: ResourceExt>(resource: &K, kind: &str) -> Result<ObjectKey> {
    ObjectKey::for_resource(resource)
        .ok_or_else(|| Error::store(format!("create {kind}"), "resource has no namespace"))
}

/// Real store implementation wrapping a kube Client
pub struct KubeResourceStore {
    client: Client,
}

impl KubeResourceStore {
    /// Create a new KubeResourceStore wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn claims(&self, namespace: &str) -> Api<ObjectBucketClaim> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn buckets(&self) -> Api<ObjectBucket> {
        Api::all(self.client.clone())
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn config_maps(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ResourceStore for KubeResourceStore {
    async fn get_claim(&self, key: &ObjectKey) -> Result<ObjectBucketClaim> {
        self.claims(&key.namespace)
            .get(&key.name)
            .await
            .map_err(|e| map_kube_error(e, "ObjectBucketClaim", key))
    }

    async fn update_claim(&self, claim: &ObjectBucketClaim) -> Result<ObjectBucketClaim> {
        let key = ObjectKey::for_resource(claim)
            .ok_or_else(|| Error::store("update claim", "claim has no namespace"))?;
        let api = self.claims(&key.namespace);

        let updated = api
            .replace(&key.name, &PostParams::default(), claim)
            .await
            .map_err(|e| map_kube_error(e, "ObjectBucketClaim", &key))?;

        let Some(status) = claim.status.as_ref() else {
            return Ok(updated);
        };
        let status_patch = serde_json::json!({ "status": status });
        api.patch_status(
            &key.name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&status_patch),
        )
        .await
        .map_err(|e| map_kube_error(e, "ObjectBucketClaim", &key))
    }

    async fn get_storage_class(&self, name: &str) -> Result<StorageClass> {
        let api: Api<StorageClass> = Api::all(self.client.clone());
        api.get(name)
            .await
            .map_err(|e| map_kube_error(e, "StorageClass", name))
    }

    async fn get_bucket(&self, name: &str) -> Result<ObjectBucket> {
        self.buckets()
            .get(name)
            .await
            .map_err(|e| map_kube_error(e, "ObjectBucket", name))
    }

    async fn create_bucket(&self, bucket: &ObjectBucket) -> Result<ObjectBucket> {
        let name = bucket.name_any();
        self.buckets()
            .create(&PostParams::default(), bucket)
            .await
            .map_err(|e| map_kube_error(e, "ObjectBucket", &name))
    }

    async fn delete_bucket(&self, name: &str) -> Result<()> {
        let api = self.buckets();

        // The finalizer only blocks removal until the reconciler asks for it
        let bucket = api
            .get(name)
            .await
            .map_err(|e| map_kube_error(e, "ObjectBucket", name))?;
        if !bucket.finalizers().is_empty() {
            debug!(bucket = %name, "releasing finalizers");
            let finalizer_patch = serde_json::json!({ "metadata": { "finalizers": null } });
            api.patch(
                name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&finalizer_patch),
            )
            .await
            .map_err(|e| map_kube_error(e, "ObjectBucket", name))?;
        }

        api.delete(name, &DeleteParams::default())
            .await
            .map_err(|e| map_kube_error(e, "ObjectBucket", name))?;
        Ok(())
    }

    async fn get_secret(&self, key: &ObjectKey) -> Result<Secret> {
        self.secrets(&key.namespace)
            .get(&key.name)
            .await
            .map_err(|e| map_kube_error(e, "Secret", key))
    }

    async fn create_secret(&self, secret: &Secret) -> Result<Secret> {
        let key = namespaced_key(secret, "secret")?;
        self.secrets(&key.namespace)
            .create(&PostParams::default(), secret)
            .await
            .map_err(|e| map_kube_error(e, "Secret", &key))
    }

    async fn delete_secret(&self, key: &ObjectKey) -> Result<()> {
        self.secrets(&key.namespace)
            .delete(&key.name, &DeleteParams::default())
            .await
            .map_err(|e| map_kube_error(e, "Secret", key))?;
        Ok(())
    }

    async fn get_config_map(&self, key: &ObjectKey) -> Result<ConfigMap> {
        self.config_maps(&key.namespace)
            .get(&key.name)
            .await
            .map_err(|e| map_kube_error(e, "ConfigMap", key))
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap> {
        let key = namespaced_key(config_map, "config map")?;
        self.config_maps(&key.namespace)
            .create(&PostParams::default(), config_map)
            .await
            .map_err(|e| map_kube_error(e, "ConfigMap", &key))
    }

    async fn delete_config_map(&self, key: &ObjectKey) -> Result<()> {
        self.config_maps(&key.namespace)
            .delete(&key.name, &DeleteParams::default())
            .await
            .map_err(|e| map_kube_error(e, "ConfigMap", key))?;
        Ok(())
    }
}
