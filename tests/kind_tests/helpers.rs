//! Shared setup for the kind integration tests

use std::time::Duration;

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, PostParams};
use kube::{Client, CustomResourceExt};

use bucket_provisioner::crd::{ObjectBucket, ObjectBucketClaim};

/// Connect to the current context and make sure both CRDs are served
pub async fn ensure_test_cluster() -> Result<Client, String> {
    let client = Client::try_default()
        .await
        .map_err(|e| format!("failed to create client: {e}"))?;

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    for crd in [ObjectBucketClaim::crd(), ObjectBucket::crd()] {
        match crds.create(&PostParams::default(), &crd).await {
            Ok(_) => {}
            Err(kube::Error::Api(e)) if e.code == 409 => {}
            Err(e) => return Err(format!("failed to install CRD: {e}")),
        }
    }

    // Give the API server a moment to start serving the new kinds
    let claims: Api<ObjectBucketClaim> = Api::all(client.clone());
    for _ in 0..30 {
        if claims.list(&Default::default()).await.is_ok() {
            return Ok(client);
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    Err("CRDs never became available".to_string())
}

/// Create a namespace, tolerating one left over from an earlier run
pub async fn ensure_namespace(client: &Client, name: &str) {
    let api: Api<Namespace> = Api::all(client.clone());
    let ns = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    let _ = api.create(&PostParams::default(), &ns).await;
}
