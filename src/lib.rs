//! Bucket Provisioner - reconcile ObjectBucketClaims through pluggable provisioners
//!
//! A user submits an ObjectBucketClaim; this crate turns it into a bucket
//! (or access to an existing one) by calling a [`provisioner::Provisioner`]
//! supplied by the integrator, and owns all of the Kubernetes bookkeeping
//! around that call.
//!
//! # Architecture
//!
//! - Each claim is bound to a cluster-scoped ObjectBucket named after it
//! - Credentials and connection details land in a Secret and ConfigMap
//!   named after the claim, in the claim namespace
//! - A failed pass cleans up what it persisted; a deleted claim tears the
//!   bucket down before its ObjectBucket is released
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (ObjectBucketClaim, ObjectBucket)
//! - [`controller`] - Provisioning and deprovisioning state machine
//! - [`provisioner`] - Plugin contract implemented by bucket backends
//! - [`store`] - Resource store abstraction and its kube-rs implementation
//! - [`dispatch`] - Claim watcher feeding the reconciler
//! - [`retry`] - Backoff and create-until-visible helpers
//! - [`config`] - Command-line and reconciler options
//! - [`telemetry`] - Logging setup
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod dispatch;
pub mod error;
pub mod provisioner;
pub mod retry;
pub mod store;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Well-known names
// =============================================================================
// Annotation, finalizer and parameter keys shared with provisioners and users.

/// Finalizer holding an ObjectBucket until its bucket was deleted or revoked
pub const BUCKET_FINALIZER: &str = "objectbucket.io/finalizer";

/// Claim annotation that opts a claim out of provisioning when set to "true"
pub const SKIP_PROVISIONING_ANNOTATION: &str = "objectbucket.io/skip-provisioning";

/// Annotation naming the provisioner on every record it created
pub const PROVISIONER_ANNOTATION: &str = "objectbucket.io/provisioner";

/// StorageClass parameter naming a pre-existing bucket (static mode)
pub const STORAGE_CLASS_BUCKET_PARAM: &str = "bucketName";

/// Prefix of ObjectBucket names (`obc-<namespace>-<name>`)
pub const OBJECT_BUCKET_NAME_PREFIX: &str = "obc";
