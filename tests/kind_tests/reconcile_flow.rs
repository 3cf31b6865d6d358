//! Integration tests for the reconcile flow against a real API server
//!
//! The provisioner here keeps its buckets in memory; everything else (claims,
//! ObjectBuckets, Secrets, ConfigMaps, StorageClasses) goes through the API.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;

use bucket_provisioner::config::ReconcilerOptions;
use bucket_provisioner::controller::{naming, ClaimReconciler, BUCKET_HOST};
use bucket_provisioner::crd::{
    AccessKeys, Authentication, ClaimPhase, Endpoint, ObjectBucket, ObjectBucketClaim,
    ObjectBucketClaimSpec,
};
use bucket_provisioner::provisioner::{BucketOptions, Provisioner, ProvisionerError};
use bucket_provisioner::store::ObjectKey;

use super::helpers::{ensure_namespace, ensure_test_cluster};

const NAMESPACE: &str = "obc-flow-tests";
const PROVISIONER: &str = "integration.test/memory";
const CLASS: &str = "memory-buckets";

/// Provisioner that records buckets in a set
#[derive(Default)]
struct MemoryProvisioner {
    buckets: Mutex<BTreeSet<String>>,
}

impl MemoryProvisioner {
    fn contains(&self, name: &str) -> bool {
        self.buckets.lock().unwrap().contains(name)
    }
}

#[async_trait]
impl Provisioner for MemoryProvisioner {
    async fn provision(&self, options: &BucketOptions) -> Result<ObjectBucket, ProvisionerError> {
        if !self.buckets.lock().unwrap().insert(options.bucket_name.clone()) {
            return Err(ProvisionerError::BucketExists(options.bucket_name.clone()));
        }
        Ok(ObjectBucket::from_parts(
            Endpoint {
                bucket_host: "memory.local".to_string(),
                bucket_port: 9000,
                bucket_name: options.bucket_name.clone(),
                ..Default::default()
            },
            Authentication {
                access_keys: Some(AccessKeys {
                    access_key_id: "memory".to_string(),
                    secret_access_key: "memory-secret".to_string(),
                }),
                ..Default::default()
            },
        ))
    }

    async fn grant(&self, options: &BucketOptions) -> Result<ObjectBucket, ProvisionerError> {
        Err(ProvisionerError::failed(format!(
            "static buckets unsupported: {}",
            options.bucket_name
        )))
    }

    async fn delete(&self, bucket: &ObjectBucket) -> Result<(), ProvisionerError> {
        self.buckets
            .lock()
            .unwrap()
            .remove(&bucket.spec.endpoint.bucket_name);
        Ok(())
    }

    async fn revoke(&self, _bucket: &ObjectBucket) -> Result<(), ProvisionerError> {
        Ok(())
    }
}

async fn ensure_storage_class(client: &Client) {
    let api: Api<StorageClass> = Api::all(client.clone());
    let class = StorageClass {
        metadata: ObjectMeta {
            name: Some(CLASS.to_string()),
            ..Default::default()
        },
        provisioner: PROVISIONER.to_string(),
        parameters: Some(BTreeMap::new()),
        reclaim_policy: Some("Delete".to_string()),
        ..Default::default()
    };
    let _ = api.create(&PostParams::default(), &class).await;
}

/// Story: a claim is provisioned, bound, and torn down after deletion
///
/// Expected behavior:
/// - The claim becomes Bound and names its ObjectBucket
/// - The ObjectBucket carries the finalizer; Secret and ConfigMap exist
/// - After the claim is deleted, the next pass deletes the bucket and
///   releases the ObjectBucket
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_claim_is_provisioned_and_released() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    ensure_namespace(&client, NAMESPACE).await;
    ensure_storage_class(&client).await;

    let name = "photos";
    let key = ObjectKey::new(NAMESPACE, name);
    let claims: Api<ObjectBucketClaim> = Api::namespaced(client.clone(), NAMESPACE);
    let buckets: Api<ObjectBucket> = Api::all(client.clone());
    let secrets: Api<Secret> = Api::namespaced(client.clone(), NAMESPACE);
    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), NAMESPACE);

    let _ = claims.delete(name, &DeleteParams::default()).await;

    let mut claim = ObjectBucketClaim::new(
        name,
        ObjectBucketClaimSpec {
            storage_class_name: Some(CLASS.to_string()),
            ..Default::default()
        },
    );
    claim.metadata.namespace = Some(NAMESPACE.to_string());
    claims
        .create(&PostParams::default(), &claim)
        .await
        .expect("failed to create claim");

    let provisioner = Arc::new(MemoryProvisioner::default());
    let reconciler = ClaimReconciler::from_client(
        client.clone(),
        provisioner.clone(),
        PROVISIONER,
        ReconcilerOptions::default(),
    );

    // Act: first pass provisions
    reconciler.reconcile(&key).await.expect("provisioning failed");

    let bound = claims.get(name).await.expect("claim vanished");
    assert_eq!(bound.phase(), ClaimPhase::Bound);
    let binding_name = naming::object_bucket_name(NAMESPACE, name);
    assert_eq!(bound.spec.object_bucket_name.as_deref(), Some(binding_name.as_str()));
    let bucket_name = bound.spec.bucket_name.clone().expect("bucket name recorded");
    assert!(provisioner.contains(&bucket_name));

    let binding = buckets.get(&binding_name).await.expect("binding missing");
    assert!(binding.has_finalizer());
    secrets.get(name).await.expect("secret missing");
    let cm = config_maps.get(name).await.expect("config map missing");
    assert_eq!(cm.data.unwrap()[BUCKET_HOST], "memory.local");

    // Act: claim deleted, next pass deprovisions
    claims
        .delete(name, &DeleteParams::default())
        .await
        .expect("failed to delete claim");
    reconciler.reconcile(&key).await.expect("deprovisioning failed");

    assert!(!provisioner.contains(&bucket_name));
    assert!(buckets.get_opt(&binding_name).await.unwrap().is_none());
}
