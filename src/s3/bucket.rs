//! Bucket lifecycle through the AWS SDK. The upload itself never touches
//! these; they only make sure a target bucket exists.

use aws_config::BehaviorVersion;
use aws_sdk_s3 as s3;
use aws_sdk_s3::config::{Credentials, SharedCredentialsProvider};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_types::region::Region;
use tracing::info;

use super::{Error, Result};
use crate::config::UploadConfig;

pub async fn sdk_client(config: &UploadConfig) -> s3::Client {
    let credentials = Credentials::new(
        config.access_key.clone(),
        config.secret_key.clone(),
        None,
        None,
        "upload-config",
    );
    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .credentials_provider(SharedCredentialsProvider::new(credentials))
        .load()
        .await;

    let mut builder = s3::config::Builder::from(&sdk_config);
    if let Some(endpoint) = &config.endpoint {
        builder = builder
            .endpoint_url(endpoint)
            .force_path_style(config.path_style);
    }
    s3::Client::from_conf(builder.build())
}

/// us-east-1 is the default location and must not be sent as a constraint.
fn location_constraint(region: &str) -> Option<CreateBucketConfiguration> {
    (region != "us-east-1").then(|| {
        CreateBucketConfiguration::builder()
            .location_constraint(BucketLocationConstraint::from(region))
            .build()
    })
}

fn is_ignorable(code: Option<&str>, ignorable: &str) -> bool {
    code == Some(ignorable)
}

fn service_code<E: ProvideErrorMetadata, R>(err: &s3::error::SdkError<E, R>) -> Option<&str> {
    err.as_service_error().and_then(|e| e.code())
}

/// Creates `bucket`, treating "already owned by you" as success.
pub async fn create_bucket_if_absent(
    client: &s3::Client,
    bucket: &str,
    region: &str,
) -> Result<()> {
    let response = client
        .create_bucket()
        .bucket(bucket)
        .set_create_bucket_configuration(location_constraint(region))
        .send()
        .await;

    match response {
        Ok(_) => {}
        Err(err) if is_ignorable(service_code(&err), "BucketAlreadyOwnedByYou") => {}
        Err(err) => {
            return Err(Error::Bucket {
                bucket: bucket.to_string(),
                message: DisplayErrorContext(&err).to_string(),
            })
        }
    }
    info!(bucket, "created bucket");
    Ok(())
}

/// Deletes `bucket`, treating "no such bucket" as success.
pub async fn delete_bucket_if_exists(client: &s3::Client, bucket: &str) -> Result<()> {
    let response = client.delete_bucket().bucket(bucket).send().await;

    match response {
        Ok(_) => {}
        Err(err) if is_ignorable(service_code(&err), "NoSuchBucket") => {}
        Err(err) => {
            return Err(Error::Bucket {
                bucket: bucket.to_string(),
                message: DisplayErrorContext(&err).to_string(),
            })
        }
    }
    info!(bucket, "removed bucket");
    Ok(())
}

/// Deletes `key` from `bucket` so the bucket can be removed. S3 reports
/// success for keys that do not exist; a missing bucket is ignored too.
pub async fn delete_object_if_exists(
    client: &s3::Client,
    bucket: &str,
    key: &str,
) -> Result<()> {
    let response = client.delete_object().bucket(bucket).key(key).send().await;

    match response {
        Ok(_) => {}
        Err(err) if is_ignorable(service_code(&err), "NoSuchBucket") => {}
        Err(err) => {
            return Err(Error::Bucket {
                bucket: bucket.to_string(),
                message: DisplayErrorContext(&err).to_string(),
            })
        }
    }
    info!(bucket, key, "removed object");
    Ok(())
}
