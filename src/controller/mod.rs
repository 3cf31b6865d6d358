//! Claim reconciliation
//!
//! This module contains the provisioning and deprovisioning logic for
//! ObjectBucketClaims. A pass observes the claim, decides what to do, and
//! drives the provisioner plugin and the resource store to get there.

mod artifacts;
mod claim;
pub mod naming;

pub use artifacts::{
    connection_config_map, credentials_secret, ACCESS_KEY_ID, BUCKET_HOST, BUCKET_NAME,
    BUCKET_PORT, BUCKET_REGION, BUCKET_SSL, BUCKET_SUBREGION, SECRET_ACCESS_KEY,
};
pub use claim::{ClaimReconciler, ReconcileResult};
