//! Uploads a single part from a byte range of the source file.

use std::io::{self, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use futures::{StreamExt, TryStreamExt};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use super::chunker::ChunkDescriptor;
use super::digest::{Digest, DigestAccumulator};
use super::response;
use super::signer::{PayloadHash, SignedRequest, UnsignedRequest};
use super::transport::{Body, HttpResponse, Transport};
use super::{Error, Result};

/// Everything needed to sign and send one part. The signature itself is
/// produced right before sending, since it is only valid for a short window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartPlan {
    /// 1-based.
    pub part_number: u32,
    pub upload_id: String,
    pub offset: u64,
    pub size: u64,
    pub md5: [u8; 16],
    pub sha256: [u8; 32],
}

impl PartPlan {
    pub fn from_chunk(upload_id: &str, chunk: &ChunkDescriptor) -> Self {
        let digest = chunk.digest();
        Self {
            part_number: chunk.index + 1,
            upload_id: upload_id.to_string(),
            offset: chunk.offset,
            size: digest.len,
            md5: digest.md5,
            sha256: digest.sha256,
        }
    }

    fn digest(&self) -> Digest {
        Digest {
            md5: self.md5,
            sha256: self.sha256,
            len: self.size,
        }
    }

    /// Adds the part's query parameters and content headers to a PUT against `object_url`.
    pub fn request(&self, mut object_url: url::Url) -> UnsignedRequest {
        object_url
            .query_pairs_mut()
            .append_pair("partNumber", &self.part_number.to_string())
            .append_pair("uploadId", &self.upload_id);

        let digest = self.digest();
        UnsignedRequest::new("PUT", object_url, PayloadHash::Sha256Hex(digest.sha256_hex()))
            .header("Content-Length", self.size.to_string())
            .header("Content-MD5", digest.md5_base64())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartResult {
    pub part_number: u32,
    pub etag: String,
}

async fn open_range(
    path: &Path,
    offset: u64,
    length: u64,
) -> Result<ReaderStream<tokio::io::Take<File>>> {
    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    Ok(ReaderStream::new(file.take(length)))
}

/// Sends `request` with the planned byte range of `source` as body and
/// returns the part's ETag.
///
/// The bytes actually handed to the transport are hashed on the way out and
/// must match the plan; a short or shifted read is reported as `BodyMismatch`.
/// A failed read of the source comes back as `Error::Io` even though the
/// transport only sees it as a broken body.
pub async fn upload_part(
    transport: &dyn Transport,
    plan: &PartPlan,
    request: SignedRequest,
    source: &Path,
) -> Result<PartResult> {
    let verifier = Arc::new(Mutex::new(DigestAccumulator::new()));
    let read_error: Arc<Mutex<Option<io::Error>>> = Arc::default();
    let tap = Arc::clone(&verifier);
    let failed_read = Arc::clone(&read_error);
    let stream = open_range(source, plan.offset, plan.size)
        .await?
        .inspect_ok(move |bytes| {
            tap.lock().unwrap_or_else(PoisonError::into_inner).update(bytes);
        })
        .inspect_err(move |err| {
            failed_read
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get_or_insert_with(|| io::Error::new(err.kind(), err.to_string()));
        })
        .boxed();

    debug!(
        part_number = plan.part_number,
        size = plan.size,
        md5 = %plan.digest().md5_hex(),
        "uploading part"
    );
    let sent = transport
        .send(
            request,
            Body::Stream {
                stream,
                length: plan.size,
            },
        )
        .await;
    let response = match sent {
        Ok(response) => response,
        Err(err) => {
            let read_error = read_error.lock().unwrap_or_else(PoisonError::into_inner).take();
            return Err(read_error.map(Error::Io).unwrap_or(err));
        }
    };

    if !response.is_success() {
        return Err(error_response(&response));
    }

    let sent = verifier.lock().unwrap_or_else(PoisonError::into_inner).reset();
    if sent.len != plan.size || sent.sha256 != plan.sha256 {
        warn!(part_number = plan.part_number, "part body did not match its digest");
        return Err(Error::BodyMismatch {
            part_number: plan.part_number,
            sent_bytes: sent.len,
            sent_sha256: sent.sha256_hex(),
            planned_bytes: plan.size,
        });
    }

    let etag = response
        .header("etag")
        .filter(|etag| !etag.is_empty())
        .ok_or_else(|| {
            Error::MalformedResponse(format!("part {} response has no ETag", plan.part_number))
        })?;

    debug!(part_number = plan.part_number, etag, "part uploaded");
    Ok(PartResult {
        part_number: plan.part_number,
        etag: etag.to_string(),
    })
}

/// Converts a non-2xx response into the most specific error available.
pub(crate) fn error_response(response: &HttpResponse) -> Error {
    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Error::EmptyErrorResponse {
            status: response.status,
        };
    }
    match response::parse(&response.body) {
        Err(err) => err,
        Ok(doc) => Error::MalformedResponse(format!(
            "HTTP {} with non-error document {}",
            response.status,
            doc.root.unwrap_or_default()
        )),
    }
}
