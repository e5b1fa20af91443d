//! Upload configuration, read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::s3::signer::{Credentials, SigningScope};
use crate::s3::{Error, Result};

pub const MIN_PART_SIZE_5MB: u64 = 5_242_880;
pub const MAX_PART_SIZE_5GB: u64 = 5_368_709_120;
pub const MAX_PARTS: u64 = 10_000;

const DEFAULT_BUCKET: &str = "multi-part2";
const DEFAULT_KEY: &str = "test-file";
const DEFAULT_FILE: &str = "rando.dat";
const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_CHUNK_SIZE: u64 = 25 * 1024 * 1024;
const DEFAULT_CONCURRENCY: usize = 4;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Where an object lives and how to address it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    /// Custom endpoint for S3-compatible services; AWS otherwise.
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub key: String,
    pub path_style: bool,
}

impl ObjectLocation {
    fn base(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://s3.{}.amazonaws.com", self.region),
        }
    }

    /// URL of the object without any query string. Every `/`-separated
    /// segment of the key is percent-encoded, so `?`, `#` and `%` stay part
    /// of the path.
    pub fn url(&self) -> Result<Url> {
        let base = self.base();
        let root = if self.path_style {
            format!("{base}/")
        } else {
            let (scheme, host) = match base.split_once("://") {
                Some((scheme, host)) => (scheme, host),
                None => ("https", base.as_str()),
            };
            format!("{}://{}.{}/", scheme, self.bucket, host)
        };

        let mut url = Url::parse(&root)?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| Error::Config(format!("endpoint {base} cannot hold a path")))?;
            segments.pop_if_empty();
            if self.path_style {
                segments.push(&self.bucket);
            }
            segments.extend(self.key.trim_start_matches('/').split('/'));
        }
        Ok(url)
    }
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub bucket: String,
    pub key: String,
    pub chunk_size_bytes: u64,
    pub file: PathBuf,
    pub concurrency: usize,
    pub request_timeout: Duration,
    pub endpoint: Option<String>,
    pub path_style: bool,
    /// Delete the bucket after the upload finishes.
    pub remove_bucket: bool,
}

impl UploadConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &str| {
            get(name).ok_or_else(|| Error::Config(format!("{name} must be set")))
        };
        let flag = |name: &str| {
            get(name)
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false)
        };

        let chunk_size_bytes = parse_or(get("CHUNK_SIZE"), "CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;
        let concurrency = parse_or(get("CONCURRENCY"), "CONCURRENCY", DEFAULT_CONCURRENCY)?;
        if concurrency == 0 {
            return Err(Error::Config("CONCURRENCY must be at least 1".into()));
        }
        let timeout = parse_or(
            get("REQUEST_TIMEOUT_SECS"),
            "REQUEST_TIMEOUT_SECS",
            DEFAULT_TIMEOUT_SECS,
        )?;

        Ok(Self {
            access_key: required("AWS_ACCESS_KEY_ID")?,
            secret_key: required("AWS_SECRET_ACCESS_KEY")?,
            region: get("AWSREGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            bucket: get("AWSBUCKET").unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            key: get("KEY").unwrap_or_else(|| DEFAULT_KEY.to_string()),
            chunk_size_bytes,
            file: PathBuf::from(get("FILE").unwrap_or_else(|| DEFAULT_FILE.to_string())),
            concurrency,
            request_timeout: Duration::from_secs(timeout),
            endpoint: get("S3_ENDPOINT"),
            path_style: flag("S3_PATH_STYLE"),
            remove_bucket: flag("REMOVE_BUCKET"),
        })
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            access_key: self.access_key.clone(),
            secret_key: self.secret_key.clone(),
        }
    }

    pub fn scope(&self) -> SigningScope {
        SigningScope::s3(self.region.clone())
    }

    pub fn location(&self) -> ObjectLocation {
        ObjectLocation {
            endpoint: self.endpoint.clone(),
            region: self.region.clone(),
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            path_style: self.path_style,
        }
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, name: &str, default: T) -> Result<T> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{name} is not a valid number: {raw}"))),
    }
}

/// S3 part-size limits: every part but the last must be at least 5 MiB, no
/// part may exceed 5 GiB, and an upload has at most 10,000 parts.
pub fn check_part_limits(file_size: u64, chunk_size: u64) -> Result<()> {
    if chunk_size == 0 {
        return Err(Error::Config("chunk size must be greater than zero".into()));
    }
    if chunk_size > MAX_PART_SIZE_5GB {
        return Err(Error::Config(format!(
            "chunk size {chunk_size} exceeds the 5 GiB part limit"
        )));
    }
    if chunk_size < MIN_PART_SIZE_5MB && file_size > chunk_size {
        return Err(Error::Config(format!(
            "chunk size {chunk_size} is below the 5 MiB minimum for non-final parts"
        )));
    }
    let parts = file_size.div_ceil(chunk_size);
    if parts > MAX_PARTS {
        return Err(Error::Config(format!(
            "{parts} parts exceeds the limit of {MAX_PARTS}; raise CHUNK_SIZE"
        )));
    }
    Ok(())
}
