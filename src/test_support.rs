//! In-memory store and fixtures shared by unit tests

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use crate::crd::{
    AccessKeys, Authentication, Endpoint, ObjectBucket, ObjectBucketClaim, ObjectBucketClaimSpec,
};
use crate::store::{ObjectKey, ResourceStore};
use crate::{Error, Result, STORAGE_CLASS_BUCKET_PARAM};

pub(crate) const PROVISIONER: &str = "example.com/s3";
pub(crate) const DYNAMIC_CLASS: &str = "bucket-class";
pub(crate) const STATIC_CLASS: &str = "existing-bucket-class";
pub(crate) const STATIC_BUCKET: &str = "shared-archive";

/// Store operations that can be forced to fail
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum FailPoint {
    CreateBucket,
    CreateSecret,
    CreateConfigMap,
    UpdateClaim,
    /// The spec half of a claim update lands, the status write fails
    UpdateClaimStatus,
    DeleteBucket,
    DeleteSecret,
}

#[derive(Default)]
struct State {
    claims: BTreeMap<ObjectKey, ObjectBucketClaim>,
    classes: BTreeMap<String, StorageClass>,
    buckets: BTreeMap<String, ObjectBucket>,
    secrets: BTreeMap<ObjectKey, Secret>,
    config_maps: BTreeMap<ObjectKey, ConfigMap>,
    failures: HashSet<FailPoint>,
    /// Claim reads served before claims start reporting not found
    claim_reads_left: Option<u32>,
    /// ObjectBucket reads that miss before the store catches up
    lagging_bucket_reads: u32,
    deletions: Vec<String>,
}

/// Stateful fake of the resource store
///
/// Records every successful delete so tests can assert ordering.
#[derive(Default)]
pub(crate) struct FakeStore {
    state: Mutex<State>,
}

impl FakeStore {
    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub(crate) fn with_claim(self, claim: ObjectBucketClaim) -> Self {
        let key = ObjectKey::for_resource(&claim).unwrap();
        self.state().claims.insert(key, claim);
        self
    }

    pub(crate) fn with_class(self, class: StorageClass) -> Self {
        self.state().classes.insert(class.name_any(), class);
        self
    }

    pub(crate) fn with_bucket(self, bucket: ObjectBucket) -> Self {
        self.state().buckets.insert(bucket.name_any(), bucket);
        self
    }

    pub(crate) fn with_secret(self, secret: Secret) -> Self {
        let key = ObjectKey::for_resource(&secret).unwrap();
        self.state().secrets.insert(key, secret);
        self
    }

    pub(crate) fn with_config_map(self, config_map: ConfigMap) -> Self {
        let key = ObjectKey::for_resource(&config_map).unwrap();
        self.state().config_maps.insert(key, config_map);
        self
    }

    pub(crate) fn failing(self, point: FailPoint) -> Self {
        self.state().failures.insert(point);
        self
    }

    /// Stop failing at `point`
    pub(crate) fn heal(&self, point: FailPoint) {
        self.state().failures.remove(&point);
    }

    /// Report the next `reads` ObjectBucket lookups as not found
    pub(crate) fn lagging_bucket_reads(self, reads: u32) -> Self {
        self.state().lagging_bucket_reads = reads;
        self
    }

    /// Serve `reads` claim lookups, then behave as if every claim was deleted
    pub(crate) fn losing_claims_after(self, reads: u32) -> Self {
        self.state().claim_reads_left = Some(reads);
        self
    }

    pub(crate) fn remove_claim(&self, key: &ObjectKey) {
        self.state().claims.remove(key);
    }

    pub(crate) fn claim(&self, key: &ObjectKey) -> Option<ObjectBucketClaim> {
        self.state().claims.get(key).cloned()
    }

    pub(crate) fn bucket(&self, name: &str) -> Option<ObjectBucket> {
        self.state().buckets.get(name).cloned()
    }

    pub(crate) fn secret(&self, key: &ObjectKey) -> Option<Secret> {
        self.state().secrets.get(key).cloned()
    }

    pub(crate) fn config_map(&self, key: &ObjectKey) -> Option<ConfigMap> {
        self.state().config_maps.get(key).cloned()
    }

    pub(crate) fn bucket_count(&self) -> usize {
        self.state().buckets.len()
    }

    /// Successful deletes, in order, as "Kind name"
    pub(crate) fn deletions(&self) -> Vec<String> {
        self.state().deletions.clone()
    }

    fn check(&self, point: FailPoint, operation: &str) -> Result<()> {
        if self.state().failures.contains(&point) {
            return Err(Error::store(operation, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceStore for FakeStore {
    async fn get_claim(&self, key: &ObjectKey) -> Result<ObjectBucketClaim> {
        let mut state = self.state();
        if let Some(left) = state.claim_reads_left.as_mut() {
            if *left == 0 {
                return Err(Error::not_found("ObjectBucketClaim", key));
            }
            *left -= 1;
        }
        state
            .claims
            .get(key)
            .cloned()
            .ok_or_else(|| Error::not_found("ObjectBucketClaim", key))
    }

    async fn update_claim(&self, claim: &ObjectBucketClaim) -> Result<ObjectBucketClaim> {
        self.check(FailPoint::UpdateClaim, "update claim")?;
        let key = ObjectKey::for_resource(claim).unwrap();
        let mut state = self.state();
        let Some(stored) = state.claims.get(&key) else {
            return Err(Error::not_found("ObjectBucketClaim", &key));
        };

        // Status is a separate write, skipped when the update carries none
        let mut updated = claim.clone();
        if updated.status.is_none() {
            updated.status = stored.status.clone();
        }
        if claim.status.is_some() && state.failures.contains(&FailPoint::UpdateClaimStatus) {
            updated.status = stored.status.clone();
            state.claims.insert(key, updated);
            return Err(Error::store("update claim status", "injected failure"));
        }
        state.claims.insert(key, updated.clone());
        Ok(updated)
    }

    async fn get_storage_class(&self, name: &str) -> Result<StorageClass> {
        self.state()
            .classes
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found("StorageClass", name))
    }

    async fn get_bucket(&self, name: &str) -> Result<ObjectBucket> {
        let mut state = self.state();
        if state.lagging_bucket_reads > 0 {
            state.lagging_bucket_reads -= 1;
            return Err(Error::not_found("ObjectBucket", name));
        }
        state
            .buckets
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found("ObjectBucket", name))
    }

    async fn create_bucket(&self, bucket: &ObjectBucket) -> Result<ObjectBucket> {
        self.check(FailPoint::CreateBucket, "create bucket")?;
        let name = bucket.name_any();
        let mut state = self.state();
        if state.buckets.contains_key(&name) {
            return Err(Error::already_exists("ObjectBucket", name));
        }
        state.buckets.insert(name, bucket.clone());
        Ok(bucket.clone())
    }

    async fn delete_bucket(&self, name: &str) -> Result<()> {
        self.check(FailPoint::DeleteBucket, "delete bucket")?;
        let mut state = self.state();
        state
            .buckets
            .remove(name)
            .ok_or_else(|| Error::not_found("ObjectBucket", name))?;
        state.deletions.push(format!("ObjectBucket {name}"));
        Ok(())
    }

    async fn get_secret(&self, key: &ObjectKey) -> Result<Secret> {
        self.state()
            .secrets
            .get(key)
            .cloned()
            .ok_or_else(|| Error::not_found("Secret", key))
    }

    async fn create_secret(&self, secret: &Secret) -> Result<Secret> {
        self.check(FailPoint::CreateSecret, "create secret")?;
        let key = ObjectKey::for_resource(secret).unwrap();
        let mut state = self.state();
        if state.secrets.contains_key(&key) {
            return Err(Error::already_exists("Secret", key));
        }
        state.secrets.insert(key, secret.clone());
        Ok(secret.clone())
    }

    async fn delete_secret(&self, key: &ObjectKey) -> Result<()> {
        self.check(FailPoint::DeleteSecret, "delete secret")?;
        let mut state = self.state();
        state
            .secrets
            .remove(key)
            .ok_or_else(|| Error::not_found("Secret", key))?;
        state.deletions.push(format!("Secret {key}"));
        Ok(())
    }

    async fn get_config_map(&self, key: &ObjectKey) -> Result<ConfigMap> {
        self.state()
            .config_maps
            .get(key)
            .cloned()
            .ok_or_else(|| Error::not_found("ConfigMap", key))
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap> {
        self.check(FailPoint::CreateConfigMap, "create config map")?;
        let key = ObjectKey::for_resource(config_map).unwrap();
        let mut state = self.state();
        if state.config_maps.contains_key(&key) {
            return Err(Error::already_exists("ConfigMap", key));
        }
        state.config_maps.insert(key, config_map.clone());
        Ok(config_map.clone())
    }

    async fn delete_config_map(&self, key: &ObjectKey) -> Result<()> {
        let mut state = self.state();
        state
            .config_maps
            .remove(key)
            .ok_or_else(|| Error::not_found("ConfigMap", key))?;
        state.deletions.push(format!("ConfigMap {key}"));
        Ok(())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Claim `team-a/photos` referencing `class`
pub(crate) fn sample_claim(class: &str) -> ObjectBucketClaim {
    let mut claim = ObjectBucketClaim::new(
        "photos",
        ObjectBucketClaimSpec {
            storage_class_name: Some(class.to_string()),
            ..Default::default()
        },
    );
    claim.metadata.namespace = Some("team-a".to_string());
    claim.metadata.uid = Some("3f1c0d5e-uid".to_string());
    claim
}

pub(crate) fn claim_key() -> ObjectKey {
    ObjectKey::new("team-a", "photos")
}

/// StorageClass owned by `provisioner`; `bucket` set means static mode
pub(crate) fn storage_class(name: &str, provisioner: &str, bucket: Option<&str>) -> StorageClass {
    let parameters = bucket.map(|b| {
        BTreeMap::from([(STORAGE_CLASS_BUCKET_PARAM.to_string(), b.to_string())])
    });
    StorageClass {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        provisioner: provisioner.to_string(),
        parameters,
        reclaim_policy: Some("Delete".to_string()),
        ..Default::default()
    }
}

pub(crate) fn dynamic_class() -> StorageClass {
    storage_class(DYNAMIC_CLASS, PROVISIONER, None)
}

pub(crate) fn static_class() -> StorageClass {
    storage_class(STATIC_CLASS, PROVISIONER, Some(STATIC_BUCKET))
}

/// A complete provisioner result for `bucket_name`
pub(crate) fn provisioned_bucket(bucket_name: &str) -> ObjectBucket {
    ObjectBucket::from_parts(
        Endpoint {
            bucket_host: "s3.example.com".to_string(),
            bucket_port: 443,
            bucket_name: bucket_name.to_string(),
            ssl: true,
            region: "us-east-1".to_string(),
            ..Default::default()
        },
        Authentication {
            access_keys: Some(AccessKeys {
                access_key_id: "AKIA123".to_string(),
                secret_access_key: "s3cr3t".to_string(),
            }),
            ..Default::default()
        },
    )
}
