//! Deterministic names for buckets and bindings
//!
//! Every name the reconciler persists is a pure function of the claim, so a
//! repeated or concurrent pass for the same claim targets the same records.

use std::fmt::Write;

use kube::ResourceExt;
use sha2::{Digest, Sha256};

use crate::crd::ObjectBucketClaim;
use crate::{Error, Result, OBJECT_BUCKET_NAME_PREFIX};

/// Longest bucket name accepted by S3-compatible backends
pub const MAX_BUCKET_NAME_LEN: usize = 63;

/// Hex characters of the hash suffix on generated bucket names
const HASH_LEN: usize = 16;

/// Name of the ObjectBucket bound to the claim `namespace/name`
pub fn object_bucket_name(namespace: &str, name: &str) -> String {
    format!("{OBJECT_BUCKET_NAME_PREFIX}-{namespace}-{name}")
}

/// Compute a deterministic hash for a string
///
/// First 8 bytes of the SHA-256 digest, rendered as 16 hex characters.
pub fn deterministic_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest[..HASH_LEN / 2]
        .iter()
        .fold(String::with_capacity(HASH_LEN), |mut s, b| {
            let _ = write!(s, "{:02x}", b);
            s
        })
}

/// Lower-case and replace anything outside `[a-z0-9-]` with `-`
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Bucket name for a dynamically provisioned claim
///
/// An explicit `bucketName` on the claim wins. Otherwise the name is
/// `<prefix>-<hash>`, where the prefix is `generateBucketName` or
/// `<namespace>-<name>` and the hash covers `namespace/name`. The prefix is
/// truncated so the whole name fits in [`MAX_BUCKET_NAME_LEN`].
pub fn compose_bucket_name(claim: &ObjectBucketClaim) -> Result<String> {
    if let Some(explicit) = claim.spec.bucket_name.as_deref().filter(|n| !n.is_empty()) {
        return Ok(explicit.to_string());
    }

    let namespace = claim.namespace().unwrap_or_default();
    let name = claim.name_any();
    if name.is_empty() {
        return Err(Error::configuration("claim has no name"));
    }

    let prefix = match claim
        .spec
        .generate_bucket_name
        .as_deref()
        .filter(|p| !p.is_empty())
    {
        Some(prefix) => sanitize(prefix),
        None => sanitize(&format!("{namespace}-{name}")),
    };

    let max_prefix = MAX_BUCKET_NAME_LEN - HASH_LEN - 1;
    let prefix: String = prefix.chars().take(max_prefix).collect();
    let hash = deterministic_hash(&format!("{namespace}/{name}"));

    Ok(format!("{prefix}-{hash}"))
}
