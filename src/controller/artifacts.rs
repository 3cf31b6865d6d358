//! Credentials Secret and connection ConfigMap for a bound claim
//!
//! Both records are named after the claim, live in its namespace, and are
//! owned by it so garbage collection removes them with the claim.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::{Resource, ResourceExt};

use crate::crd::{ObjectBucket, ObjectBucketClaim};
use crate::{Error, Result, PROVISIONER_ANNOTATION};

/// Secret key holding the access key id
pub const ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
/// Secret key holding the secret access key
pub const SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";

/// ConfigMap key holding the endpoint host
pub const BUCKET_HOST: &str = "BUCKET_HOST";
/// ConfigMap key holding the endpoint port
pub const BUCKET_PORT: &str = "BUCKET_PORT";
/// ConfigMap key holding the bucket name
pub const BUCKET_NAME: &str = "BUCKET_NAME";
/// ConfigMap key holding whether TLS is used
pub const BUCKET_SSL: &str = "BUCKET_SSL";
/// ConfigMap key holding the region
pub const BUCKET_REGION: &str = "BUCKET_REGION";
/// ConfigMap key holding the sub-region
pub const BUCKET_SUBREGION: &str = "BUCKET_SUBREGION";

/// Metadata shared by the Secret and ConfigMap of a claim
fn artifact_meta(claim: &ObjectBucketClaim, provisioner_name: &str) -> Result<ObjectMeta> {
    let namespace = claim
        .namespace()
        .ok_or_else(|| Error::configuration(format!("claim {} has no namespace", claim.name_any())))?;

    Ok(ObjectMeta {
        name: Some(claim.name_any()),
        namespace: Some(namespace),
        annotations: Some(BTreeMap::from([(
            PROVISIONER_ANNOTATION.to_string(),
            provisioner_name.to_string(),
        )])),
        // None until the API server assigned the claim a uid
        owner_references: claim.controller_owner_ref(&()).map(|owner| vec![owner]),
        ..Default::default()
    })
}

/// Secret carrying the credentials of `bucket` for `claim`
pub fn credentials_secret(
    claim: &ObjectBucketClaim,
    bucket: &ObjectBucket,
    provisioner_name: &str,
) -> Result<Secret> {
    let auth = &bucket.spec.authentication;
    let mut data = BTreeMap::new();

    if let Some(keys) = &auth.access_keys {
        data.insert(
            ACCESS_KEY_ID.to_string(),
            ByteString(keys.access_key_id.clone().into_bytes()),
        );
        data.insert(
            SECRET_ACCESS_KEY.to_string(),
            ByteString(keys.secret_access_key.clone().into_bytes()),
        );
    }
    for (key, value) in &auth.additional_secret_data {
        data.insert(key.clone(), ByteString(value.clone().into_bytes()));
    }

    Ok(Secret {
        metadata: artifact_meta(claim, provisioner_name)?,
        data: Some(data),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    })
}

/// ConfigMap carrying the connection details of `bucket` for `claim`
pub fn connection_config_map(
    claim: &ObjectBucketClaim,
    bucket: &ObjectBucket,
    provisioner_name: &str,
) -> Result<ConfigMap> {
    let endpoint = &bucket.spec.endpoint;
    let mut data = BTreeMap::from([
        (BUCKET_HOST.to_string(), endpoint.bucket_host.clone()),
        (BUCKET_PORT.to_string(), endpoint.bucket_port.to_string()),
        (BUCKET_NAME.to_string(), endpoint.bucket_name.clone()),
        (BUCKET_SSL.to_string(), endpoint.ssl.to_string()),
        (BUCKET_REGION.to_string(), endpoint.region.clone()),
        (BUCKET_SUBREGION.to_string(), endpoint.sub_region.clone()),
    ]);
    data.extend(
        endpoint
            .additional_config
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );

    Ok(ConfigMap {
        metadata: artifact_meta(claim, provisioner_name)?,
        data: Some(data),
        ..Default::default()
    })
}
