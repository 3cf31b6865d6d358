//! Custom Resource Definitions for the bucket provisioner
//!
//! This module contains the claim and binding CRDs the reconciler manages.

mod bucket;
mod claim;
mod types;

pub use bucket::{ObjectBucket, ObjectBucketSpec};
pub use claim::{ObjectBucketClaim, ObjectBucketClaimSpec, ObjectBucketClaimStatus};
pub use types::{AccessKeys, Authentication, ClaimPhase, ClaimRef, Endpoint, ReclaimPolicy};
