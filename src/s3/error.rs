//! Error types for the multipart upload pipeline.

use std::fmt;

use thiserror::Error;

/// Structured error returned by the storage service in an `<Error>` document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AwsProtocolError {
    pub code: String,
    pub message: String,
    pub request_id: Option<String>,
    pub host_id: Option<String>,
    pub resource: Option<String>,
    /// Only populated when `code == "SignatureDoesNotMatch"`.
    pub signature: Option<SignatureDiagnostics>,
}

/// Fields the service echoes back when it rejects a signature, enough to
/// recompute the signature offline.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignatureDiagnostics {
    pub access_key_id: Option<String>,
    pub string_to_sign: Option<String>,
    pub canonical_request: Option<String>,
}

impl fmt::Display for AwsProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(request_id) = &self.request_id {
            write!(f, " (request id {request_id})")?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {message}")]
    Transport { message: String, timeout: bool },

    #[error("S3 error: {0}")]
    Aws(AwsProtocolError),

    #[error("signature mismatch: {0}")]
    SignatureMismatch(AwsProtocolError),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("HTTP {status} response carried no error document")]
    EmptyErrorResponse { status: u16 },

    #[error(
        "part {part_number}: sent {sent_bytes} bytes hashing to {sent_sha256}, \
         planned {planned_bytes} bytes"
    )]
    BodyMismatch {
        part_number: u32,
        sent_bytes: u64,
        sent_sha256: String,
        planned_bytes: u64,
    },

    #[error("upload aborted: {source}")]
    Aborted {
        source: Box<Error>,
        /// Failure of the abort request itself, if any. Never replaces `source`.
        abort_failure: Option<Box<Error>>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("refusing to upload empty file")]
    EmptyFile,

    #[error("bucket {bucket}: {message}")]
    Bucket { bucket: String, message: String },

    #[error("invalid upload state transition from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },
}

impl Error {
    /// The error that triggered an abort, or `self` if no abort happened.
    pub fn original(&self) -> &Error {
        match self {
            Error::Aborted { source, .. } => source.original(),
            other => other,
        }
    }

    pub fn aws(&self) -> Option<&AwsProtocolError> {
        match self.original() {
            Error::Aws(err) | Error::SignatureMismatch(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport {
            timeout: err.is_timeout(),
            message: err.to_string(),
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::MalformedResponse(format!("XML parse error: {err}"))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Config(format!("invalid URL: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
