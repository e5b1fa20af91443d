//! HTTP transport seam. Production uses reqwest; tests substitute a recording fake.

use std::collections::BTreeMap;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use reqwest::{Client, Method};
use tracing::debug;

use super::signer::SignedRequest;
use super::{Error, Result};

pub enum Body {
    Empty,
    Bytes(Bytes),
    /// Streamed body of a known length.
    Stream {
        stream: BoxStream<'static, io::Result<Bytes>>,
        length: u64,
    },
}

impl Body {
    pub fn len(&self) -> u64 {
        match self {
            Body::Empty => 0,
            Body::Bytes(bytes) => bytes.len() as u64,
            Body::Stream { length, .. } => *length,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Lower-cased header names.
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: SignedRequest, body: Body) -> Result<HttpResponse>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: SignedRequest, body: Body) -> Result<HttpResponse> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::Config(format!("invalid HTTP method {}: {e}", request.method)))?;
        debug!(method = %method, url = %request.url, bytes = body.len(), "sending request");

        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let has_length = request.headers.contains_key("content-length");
        builder = match body {
            Body::Empty if has_length => builder,
            Body::Empty => builder.header("content-length", "0"),
            Body::Bytes(bytes) => builder.body(bytes),
            Body::Stream { stream, length } => {
                if !has_length {
                    builder = builder.header("content-length", length.to_string());
                }
                builder.body(reqwest::Body::wrap_stream(stream))
            }
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?;
        debug!(status, bytes = body.len(), "response received");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
