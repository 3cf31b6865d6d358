//! ObjectBucketClaim reconciliation
//!
//! A pass is keyed by claim identity only. It either provisions (the claim
//! exists and asks for a bucket) or deprovisions (the claim is gone). Every
//! artifact is named deterministically, so re-running a pass after a crash or
//! alongside another pass for the same claim converges on the same records.
//!
//! Provisioning runs as a fixed sequence of steps:
//!
//! ```text
//! ResolveClaim -> ComposeName -> InvokePlugin -> NameBinding
//!   -> PersistBinding -> PersistCredentials -> PersistConnectionInfo
//!   -> UpdateClaim
//! ```
//!
//! Any failure after the plugin was invoked triggers
//! the cleanup routine, which removes what this pass
//! persisted and, in dynamic mode, asks the plugin to delete the bucket.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::storage::v1::StorageClass;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use super::artifacts::{connection_config_map, credentials_secret};
use super::naming::{compose_bucket_name, object_bucket_name};
use crate::config::ReconcilerOptions;
use crate::crd::{
    ClaimPhase, ClaimRef, ObjectBucket, ObjectBucketClaim, ObjectBucketClaimStatus, ReclaimPolicy,
};
use crate::provisioner::{BucketOptions, Provisioner};
use crate::retry::create_until_visible;
use crate::store::{KubeResourceStore, ObjectKey, ResourceStore};
use crate::{Error, Result, BUCKET_FINALIZER, PROVISIONER_ANNOTATION, STORAGE_CLASS_BUCKET_PARAM};

/// Outcome of a successful reconcile pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileResult {
    /// Whether the dispatcher should run the pass again
    pub requeue: bool,
}

impl ReconcileResult {
    /// Pass finished, nothing left to do
    pub fn done() -> Self {
        Self { requeue: false }
    }
}

/// Steps of the provisioning flow, used as error context
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ProvisionStep {
    ResolveClaim,
    ComposeName,
    InvokePlugin,
    PersistBinding,
    PersistCredentials,
    PersistConnectionInfo,
    UpdateClaim,
}

impl ProvisionStep {
    fn as_str(self) -> &'static str {
        match self {
            Self::ResolveClaim => "ResolveClaim",
            Self::ComposeName => "ComposeName",
            Self::InvokePlugin => "InvokePlugin",
            Self::PersistBinding => "PersistBinding",
            Self::PersistCredentials => "PersistCredentials",
            Self::PersistConnectionInfo => "PersistConnectionInfo",
            Self::UpdateClaim => "UpdateClaim",
        }
    }

    fn wrap(self, key: &ObjectKey, err: Error) -> Error {
        Error::reconcile(self.as_str(), key, err)
    }
}

/// How a StorageClass asks for buckets
#[derive(Clone, Debug, PartialEq, Eq)]
enum BucketMode {
    /// Create a new bucket per claim
    Dynamic,
    /// Grant access to one pre-existing bucket
    Static {
        /// Name of the existing bucket
        bucket_name: String,
    },
}

impl BucketMode {
    fn for_class(class: &StorageClass) -> Self {
        let existing = class
            .parameters
            .as_ref()
            .and_then(|p| p.get(STORAGE_CLASS_BUCKET_PARAM))
            .filter(|name| !name.is_empty());
        match existing {
            Some(name) => Self::Static {
                bucket_name: name.clone(),
            },
            None => Self::Dynamic,
        }
    }

    fn is_dynamic(&self) -> bool {
        matches!(self, Self::Dynamic)
    }
}

/// What a provisioning pass produced so far
///
/// Only records created or adopted by this pass are listed; cleanup never
/// touches anything else.
#[derive(Debug, Default)]
struct ProvisionedArtifacts {
    /// Valid bucket returned by the plugin, named once the binding was composed
    bucket: Option<ObjectBucket>,
    /// Name of the persisted ObjectBucket
    binding: Option<String>,
    /// Key of the persisted credentials Secret
    secret: Option<ObjectKey>,
    /// Key of the persisted connection ConfigMap
    config_map: Option<ObjectKey>,
    /// Claim as it was before UpdateClaim was attempted
    claim_before_update: Option<ObjectBucketClaim>,
}

/// Reconciles ObjectBucketClaims for one provisioner
pub struct ClaimReconciler {
    store: Arc<dyn ResourceStore>,
    provisioner: Arc<dyn Provisioner>,
    provisioner_name: String,
    options: ReconcilerOptions,
}

impl ClaimReconciler {
    /// Create a reconciler for the StorageClasses naming `provisioner_name`
    ///
    /// The name is matched case-insensitively and retry options below their
    /// floor are raised to it.
    pub fn new(
        store: Arc<dyn ResourceStore>,
        provisioner: Arc<dyn Provisioner>,
        provisioner_name: &str,
        options: ReconcilerOptions,
    ) -> Self {
        let provisioner_name = provisioner_name.to_lowercase();
        let options = options.normalized();
        info!(
            provisioner = %provisioner_name,
            retry_interval_secs = options.retry_interval.as_secs(),
            retry_timeout_secs = options.retry_timeout.as_secs(),
            "claim reconciler configured"
        );
        Self {
            store,
            provisioner,
            provisioner_name,
            options,
        }
    }

    /// Create a reconciler backed by the Kubernetes API
    pub fn from_client(
        client: Client,
        provisioner: Arc<dyn Provisioner>,
        provisioner_name: &str,
        options: ReconcilerOptions,
    ) -> Self {
        Self::new(
            Arc::new(KubeResourceStore::new(client)),
            provisioner,
            provisioner_name,
            options,
        )
    }

    /// Lower-cased provisioner name this reconciler answers to
    pub fn provisioner_name(&self) -> &str {
        &self.provisioner_name
    }

    /// Returns true if `class` is handled by this reconciler
    pub fn supports(&self, class: &StorageClass) -> bool {
        class.provisioner.to_lowercase() == self.provisioner_name
    }

    /// Run one reconcile pass for the claim `key`
    #[instrument(skip_all, fields(claim = %key))]
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileResult> {
        let claim = match self.store.get_claim(key).await {
            Ok(claim) => claim,
            Err(e) if e.is_not_found() => {
                info!("claim not found, deprovisioning");
                self.deprovision_claim(key).await?;
                return Ok(ReconcileResult::done());
            }
            Err(e) => return Err(Error::reconcile("GetClaim", key, e)),
        };

        if !claim.requests_provisioning() {
            return Ok(ReconcileResult::done());
        }

        let Some(class_name) = claim.storage_class_name() else {
            return Ok(ReconcileResult::done());
        };
        let class = match self.store.get_storage_class(class_name).await {
            Ok(class) => class,
            Err(e) if e.is_not_found() => {
                warn!(storage_class = %class_name, "storage class not found, skipping claim");
                return Ok(ReconcileResult::done());
            }
            Err(e) => return Err(Error::reconcile("GetStorageClass", key, e)),
        };

        if !self.supports(&class) {
            debug!(
                storage_class = %class_name,
                class_provisioner = %class.provisioner,
                "storage class belongs to another provisioner, skipping"
            );
            return Ok(ReconcileResult::done());
        }

        self.provision_claim(key, &class).await?;
        Ok(ReconcileResult::done())
    }

    /// Provision or grant a bucket for the claim and bind it
    ///
    /// On failure, records persisted by this pass are removed before the
    /// error is returned.
    #[instrument(skip_all, fields(claim = %key, storage_class = %class.name_any()))]
    pub async fn provision_claim(&self, key: &ObjectKey, class: &StorageClass) -> Result<()> {
        let claim = match self.store.get_claim(key).await {
            Ok(claim) => claim,
            Err(e) if e.is_not_found() => {
                return Err(ProvisionStep::ResolveClaim.wrap(
                    key,
                    Error::store("resolve claim", format!("claim lost before provisioning: {e}")),
                ));
            }
            Err(e) => return Err(ProvisionStep::ResolveClaim.wrap(key, e)),
        };
        if !claim.requests_provisioning() {
            debug!("claim no longer requests provisioning");
            return Ok(());
        }

        let mode = BucketMode::for_class(class);
        let bucket_name = match &mode {
            BucketMode::Dynamic => {
                compose_bucket_name(&claim).map_err(|e| ProvisionStep::ComposeName.wrap(key, e))?
            }
            BucketMode::Static { bucket_name } => bucket_name.clone(),
        };
        if bucket_name.is_empty() {
            return Err(ProvisionStep::ComposeName.wrap(
                key,
                Error::configuration("composed bucket name is empty"),
            ));
        }

        let options = BucketOptions {
            reclaim_policy: ReclaimPolicy::from_class_field(class.reclaim_policy.as_deref()),
            bucket_name,
            claim: claim.clone(),
            parameters: class.parameters.clone().unwrap_or_default(),
        };

        let mut artifacts = ProvisionedArtifacts::default();
        match self
            .run_provision_steps(key, claim, &mode, &options, &mut artifacts)
            .await
        {
            Ok(()) => Ok(()),
            Err(err) => {
                self.cleanup_after_failure(&artifacts, &err, mode.is_dynamic())
                    .await;
                Err(err)
            }
        }
    }

    async fn run_provision_steps(
        &self,
        key: &ObjectKey,
        mut claim: ObjectBucketClaim,
        mode: &BucketMode,
        options: &BucketOptions,
        artifacts: &mut ProvisionedArtifacts,
    ) -> Result<()> {
        let bucket_name = options.bucket_name.as_str();

        // InvokePlugin
        let (operation, produced) = if mode.is_dynamic() {
            info!(bucket = %bucket_name, "provisioning bucket");
            ("provisioning", self.provisioner.provision(options).await)
        } else {
            info!(bucket = %bucket_name, "granting access to existing bucket");
            ("granting access to", self.provisioner.grant(options).await)
        };
        let produced = produced.map_err(|e| {
            ProvisionStep::InvokePlugin.wrap(key, Error::provisioner(operation, bucket_name, e))
        })?;
        if !produced.is_valid() {
            if mode.is_dynamic() {
                // The bucket may exist even though the record is incomplete
                let mut orphan = produced;
                if orphan.spec.endpoint.bucket_name.trim().is_empty() {
                    orphan.spec.endpoint.bucket_name = bucket_name.to_string();
                }
                artifacts.bucket =
                    Some(self.name_binding(key, &claim, orphan, options.reclaim_policy));
            }
            return Err(ProvisionStep::InvokePlugin.wrap(
                key,
                Error::contract_violation(format!(
                    "{operation} bucket {bucket_name} returned no endpoint bucket name or host"
                )),
            ));
        }

        // NameBinding
        let binding = self.name_binding(key, &claim, produced, options.reclaim_policy);
        let binding_name = binding.name_any();
        artifacts.bucket = Some(binding.clone());

        // PersistBinding
        let binding = create_until_visible(
            self.options.retry_interval,
            self.options.retry_timeout,
            &format!("ObjectBucket {binding_name}"),
            || self.store.create_bucket(&binding),
            || self.store.get_bucket(&binding_name),
        )
        .await
        .map_err(|e| ProvisionStep::PersistBinding.wrap(key, e))?;
        artifacts.binding = Some(binding_name.clone());
        debug!(binding = %binding_name, "binding persisted");

        // PersistCredentials
        let secret = credentials_secret(&claim, &binding, &self.provisioner_name)
            .map_err(|e| ProvisionStep::PersistCredentials.wrap(key, e))?;
        create_until_visible(
            self.options.retry_interval,
            self.options.retry_timeout,
            &format!("Secret {key}"),
            || self.store.create_secret(&secret),
            || self.store.get_secret(key),
        )
        .await
        .map_err(|e| ProvisionStep::PersistCredentials.wrap(key, e))?;
        artifacts.secret = Some(key.clone());
        debug!("credentials persisted");

        // PersistConnectionInfo
        let config_map = connection_config_map(&claim, &binding, &self.provisioner_name)
            .map_err(|e| ProvisionStep::PersistConnectionInfo.wrap(key, e))?;
        create_until_visible(
            self.options.retry_interval,
            self.options.retry_timeout,
            &format!("ConfigMap {key}"),
            || self.store.create_config_map(&config_map),
            || self.store.get_config_map(key),
        )
        .await
        .map_err(|e| ProvisionStep::PersistConnectionInfo.wrap(key, e))?;
        artifacts.config_map = Some(key.clone());
        debug!("connection info persisted");

        // UpdateClaim
        artifacts.claim_before_update = Some(claim.clone());
        claim.spec.object_bucket_name = Some(binding_name.clone());
        claim.spec.bucket_name = Some(bucket_name.to_string());
        claim.status = Some(ObjectBucketClaimStatus::with_phase(ClaimPhase::Bound));
        self.store
            .update_claim(&claim)
            .await
            .map_err(|e| ProvisionStep::UpdateClaim.wrap(key, e))?;

        info!(bucket = %bucket_name, binding = %binding_name, "claim bound");
        Ok(())
    }

    /// Turn a plugin result into the ObjectBucket bound to the claim
    fn name_binding(
        &self,
        key: &ObjectKey,
        claim: &ObjectBucketClaim,
        mut bucket: ObjectBucket,
        reclaim_policy: ReclaimPolicy,
    ) -> ObjectBucket {
        bucket.metadata.name = Some(object_bucket_name(&key.namespace, &key.name));
        bucket.metadata.namespace = None;
        bucket.metadata.finalizers = Some(vec![BUCKET_FINALIZER.to_string()]);
        bucket
            .annotations_mut()
            .insert(PROVISIONER_ANNOTATION.to_string(), self.provisioner_name.clone());

        bucket.spec.storage_class_name = claim.spec.storage_class_name.clone();
        bucket.spec.claim_ref = Some(ClaimRef {
            namespace: key.namespace.clone(),
            name: key.name.clone(),
            uid: claim.uid(),
        });
        bucket.spec.reclaim_policy = reclaim_policy;
        bucket
    }

    /// Undo a failed provisioning pass
    ///
    /// In dynamic mode the plugin is asked to delete the bucket it produced,
    /// unless the failure was an "already exists" signal. A partially applied
    /// claim update is reverted, then persisted records are removed in
    /// reverse creation order. Failures are logged only.
    async fn cleanup_after_failure(
        &self,
        artifacts: &ProvisionedArtifacts,
        err: &Error,
        dynamic: bool,
    ) {
        warn!(error = %err, "provisioning failed, cleaning up");

        if dynamic && !err.is_already_exists() {
            if let Some(bucket) = &artifacts.bucket {
                let bucket_name = &bucket.spec.endpoint.bucket_name;
                match self.provisioner.delete(bucket).await {
                    Ok(()) => info!(bucket = %bucket_name, "deleted bucket after failure"),
                    Err(e) => {
                        error!(bucket = %bucket_name, error = %e, "failed to delete bucket after failure")
                    }
                }
            }
        }

        if let Some(original) = &artifacts.claim_before_update {
            self.restore_claim(original).await;
        }
        if let Some(key) = &artifacts.config_map {
            if let Err(e) = self.store.delete_config_map(key).await {
                error!(config_map = %key, error = %e, "failed to delete config map during cleanup");
            }
        }
        if let Some(key) = &artifacts.secret {
            if let Err(e) = self.store.delete_secret(key).await {
                error!(secret = %key, error = %e, "failed to delete secret during cleanup");
            }
        }
        if let Some(name) = &artifacts.binding {
            if let Err(e) = self.store.delete_bucket(name).await {
                error!(binding = %name, error = %e, "failed to delete binding during cleanup");
            }
        }
    }

    /// Put back the binding references of a claim whose update failed
    ///
    /// The store may have written the new spec before the status write
    /// failed. Left alone, the claim would name a binding cleanup is about to
    /// delete, and no later pass would provision it again.
    async fn restore_claim(&self, original: &ObjectBucketClaim) {
        let Some(key) = ObjectKey::for_resource(original) else {
            return;
        };
        let mut current = match self.store.get_claim(&key).await {
            Ok(claim) => claim,
            Err(e) if e.is_not_found() => return,
            Err(e) => {
                error!(error = %e, "failed to read claim during cleanup");
                return;
            }
        };
        if current.spec.object_bucket_name == original.spec.object_bucket_name
            && current.spec.bucket_name == original.spec.bucket_name
        {
            return;
        }

        current.spec.object_bucket_name = original.spec.object_bucket_name.clone();
        current.spec.bucket_name = original.spec.bucket_name.clone();
        current.status = None;
        match self.store.update_claim(&current).await {
            Ok(_) => info!("reverted partial claim update"),
            Err(e) => error!(error = %e, "failed to revert partial claim update"),
        }
    }

    /// Returns true if the record was written by this provisioner
    fn owns(&self, annotations: &BTreeMap<String, String>) -> bool {
        annotations
            .get(PROVISIONER_ANNOTATION)
            .is_some_and(|name| name.eq_ignore_ascii_case(&self.provisioner_name))
    }

    /// Tear down everything provisioned for a deleted claim
    ///
    /// The binding is only removed after the plugin confirmed Delete or
    /// Revoke; a plugin failure keeps it so the next pass can retry. Secrets
    /// and ConfigMaps not annotated with this provisioner are left in place.
    #[instrument(skip_all, fields(claim = %key))]
    pub async fn deprovision_claim(&self, key: &ObjectKey) -> Result<()> {
        match self.store.get_config_map(key).await {
            Ok(cm) if self.owns(cm.annotations()) => {
                match self.store.delete_config_map(key).await {
                    Ok(()) => debug!("connection info deleted"),
                    Err(e) if e.is_not_found() => debug!("connection info already gone"),
                    Err(e) => return Err(Error::reconcile("DeleteConnectionInfo", key, e)),
                }
            }
            Ok(_) => debug!("config map not written by this provisioner, keeping it"),
            Err(e) if e.is_not_found() => debug!("connection info already gone"),
            Err(e) => return Err(Error::reconcile("DeleteConnectionInfo", key, e)),
        }
        match self.store.get_secret(key).await {
            Ok(secret) if self.owns(secret.annotations()) => {
                match self.store.delete_secret(key).await {
                    Ok(()) => debug!("credentials deleted"),
                    Err(e) if e.is_not_found() => debug!("credentials already gone"),
                    Err(e) => return Err(Error::reconcile("DeleteCredentials", key, e)),
                }
            }
            Ok(_) => debug!("secret not written by this provisioner, keeping it"),
            Err(e) if e.is_not_found() => debug!("credentials already gone"),
            Err(e) => return Err(Error::reconcile("DeleteCredentials", key, e)),
        }

        let binding_name = object_bucket_name(&key.namespace, &key.name);
        let binding = match self.store.get_bucket(&binding_name).await {
            Ok(binding) => binding,
            Err(e) if e.is_not_found() => {
                debug!(binding = %binding_name, "no binding, assuming deprovisioning completed");
                return Ok(());
            }
            Err(e) => return Err(Error::reconcile("GetBinding", key, e)),
        };

        let class_name = binding
            .spec
            .storage_class_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                Error::reconcile(
                    "ResolveStorageClass",
                    key,
                    Error::configuration(format!("binding {binding_name} has no storage class")),
                )
            })?;
        let class = self
            .store
            .get_storage_class(class_name)
            .await
            .map_err(|e| Error::reconcile("ResolveStorageClass", key, e))?;
        if !self.supports(&class) {
            debug!(
                binding = %binding_name,
                class_provisioner = %class.provisioner,
                "binding belongs to another provisioner, skipping"
            );
            return Ok(());
        }

        let bucket_name = binding.spec.endpoint.bucket_name.clone();
        if BucketMode::for_class(&class).is_dynamic() {
            info!(bucket = %bucket_name, "deleting bucket");
            self.provisioner.delete(&binding).await.map_err(|e| {
                Error::reconcile("InvokePlugin", key, Error::provisioner("deleting", &bucket_name, e))
            })?;
        } else {
            info!(bucket = %bucket_name, "revoking access to bucket");
            self.provisioner.revoke(&binding).await.map_err(|e| {
                Error::reconcile(
                    "InvokePlugin",
                    key,
                    Error::provisioner("revoking access to", &bucket_name, e),
                )
            })?;
        }

        match self.store.delete_bucket(&binding_name).await {
            Ok(()) => info!(binding = %binding_name, "binding deleted"),
            Err(e) if e.is_not_found() => {
                debug!(binding = %binding_name, "binding vanished during deprovisioning")
            }
            Err(e) => return Err(Error::reconcile("DeleteBinding", key, e)),
        }
        Ok(())
    }
}
