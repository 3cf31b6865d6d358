//! Integration tests for CRD operations
//!
//! These tests tell the story of how users submit ObjectBucketClaims and how
//! ObjectBuckets look once the API server stored them.

use std::collections::BTreeMap;

use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;

use bucket_provisioner::crd::{
    ClaimPhase, ClaimRef, Endpoint, ObjectBucket, ObjectBucketClaim, ObjectBucketClaimSpec,
    ReclaimPolicy,
};

use super::helpers::{ensure_namespace, ensure_test_cluster};

const NAMESPACE: &str = "obc-crd-tests";

fn sample_claim(name: &str) -> ObjectBucketClaim {
    let mut claim = ObjectBucketClaim::new(
        name,
        ObjectBucketClaimSpec {
            storage_class_name: Some("bucket-class".to_string()),
            generate_bucket_name: Some("photos".to_string()),
            additional_config: BTreeMap::from([("tier".to_string(), "hot".to_string())]),
            ..Default::default()
        },
    );
    claim.metadata.namespace = Some(NAMESPACE.to_string());
    claim
}

async fn cleanup_claim(client: &Client, name: &str) {
    let api: Api<ObjectBucketClaim> = Api::namespaced(client.clone(), NAMESPACE);
    let _ = api.delete(name, &DeleteParams::default()).await;
}

/// Story: a developer requests a bucket
///
/// Expected behavior:
/// - The claim is stored with its storage class and generate-name prefix
/// - A fresh claim has no status and reads as Pending
/// - It asks to be provisioned
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_developer_submits_bucket_claim() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    ensure_namespace(&client, NAMESPACE).await;
    let api: Api<ObjectBucketClaim> = Api::namespaced(client.clone(), NAMESPACE);
    let name = "test-claim-create";

    cleanup_claim(&client, name).await;

    let created = api
        .create(&PostParams::default(), &sample_claim(name))
        .await
        .expect("failed to create claim");

    assert_eq!(created.storage_class_name(), Some("bucket-class"));
    assert_eq!(created.phase(), ClaimPhase::Pending);
    assert!(created.requests_provisioning());

    let fetched = api.get(name).await.expect("failed to get claim");
    assert_eq!(fetched.spec.generate_bucket_name.as_deref(), Some("photos"));
    assert_eq!(fetched.spec.additional_config["tier"], "hot");

    cleanup_claim(&client, name).await;
}

/// Story: an ObjectBucket round-trips its endpoint and claim reference
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_object_bucket_is_cluster_scoped_binding() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<ObjectBucket> = Api::all(client.clone());
    let name = "obc-crd-tests-binding";
    let _ = api.delete(name, &DeleteParams::default()).await;

    let mut bucket = ObjectBucket::from_parts(
        Endpoint {
            bucket_host: "s3.example.com".to_string(),
            bucket_port: 443,
            bucket_name: "photos-1a2b".to_string(),
            ssl: true,
            ..Default::default()
        },
        Default::default(),
    );
    bucket.metadata.name = Some(name.to_string());
    bucket.spec.claim_ref = Some(ClaimRef {
        namespace: NAMESPACE.to_string(),
        name: "binding".to_string(),
        uid: None,
    });
    bucket.spec.reclaim_policy = ReclaimPolicy::Retain;

    let created = api
        .create(&PostParams::default(), &bucket)
        .await
        .expect("failed to create bucket");

    assert!(created.is_valid());
    assert_eq!(created.spec.reclaim_policy, ReclaimPolicy::Retain);
    assert_eq!(created.spec.endpoint.bucket_port, 443);

    let _ = api.delete(name, &DeleteParams::default()).await;
}
