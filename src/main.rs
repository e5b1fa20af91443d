mod config;
mod logging;
mod s3;

use config::{check_part_limits, UploadConfig};
use s3::bucket::{
    create_bucket_if_absent, delete_bucket_if_exists, delete_object_if_exists, sdk_client,
};
use s3::MultipartUploader;
use tracing::{error, info};

const PRESIGNED_URL_EXPIRY_SECS: u64 = 3600;

#[::tokio::main]
async fn main() -> Result<(), s3::Error> {
    logging::init("info");

    let config = UploadConfig::from_env()?;
    let file_size = tokio::fs::metadata(&config.file).await?.len();
    check_part_limits(file_size, config.chunk_size_bytes)?;

    let client = sdk_client(&config).await;
    create_bucket_if_absent(&client, &config.bucket, &config.region).await?;

    let uploader = MultipartUploader::from_config(&config)?;
    let result = uploader
        .upload_file(&config.file, config.chunk_size_bytes)
        .await;

    match &result {
        Ok(done) => {
            info!(
                "success: {} -> {} | {} parts, {} bytes, upload {} {}, etag {}",
                done.session.key,
                done.session.bucket,
                done.parts.len(),
                done.file.size,
                done.session.upload_id,
                done.session.state(),
                done.etag.as_deref().unwrap_or("-")
            );
            match uploader.presigned_get_url(PRESIGNED_URL_EXPIRY_SECS) {
                Ok(url) => info!("download link (valid {PRESIGNED_URL_EXPIRY_SECS}s): {url}"),
                Err(err) => error!("could not presign download link: {err}"),
            }
        }
        Err(err) => {
            error!("error: {err}");
            if let Some(aws) = err.aws() {
                error!(
                    code = %aws.code,
                    request_id = aws.request_id.as_deref().unwrap_or("-"),
                    host_id = aws.host_id.as_deref().unwrap_or("-"),
                    "service rejected the upload"
                );
            }
        }
    }

    if config.remove_bucket {
        let cleanup = match delete_object_if_exists(&client, &config.bucket, &config.key).await {
            Ok(()) => delete_bucket_if_exists(&client, &config.bucket).await,
            Err(err) => Err(err),
        };
        if let Err(err) = cleanup {
            error!("error: {err}");
            // An upload failure takes precedence over a cleanup failure.
            result?;
            return Err(err);
        }
    }

    result.map(|_| ())
}
