//! HTTP seam between the gateway client and the wire.
//!
//! [`HttpTransport`] is the only thing the gateway client needs from an HTTP
//! stack, which keeps the failover logic testable with an in-memory double.
//! [`ReqwestTransport`] is the production implementation.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use thiserror::Error;

const USER_AGENT: &str = concat!("subvault/", env!("CARGO_PKG_VERSION"));

/// Failure talking to a single endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("response from {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: usize },
}

/// Status and fully read body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The body if the status is 2xx, otherwise a [`TransportError::Status`].
    pub fn into_success(self, url: &str) -> Result<Bytes, TransportError> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(TransportError::Status {
                url: url.to_string(),
                status: self.status,
            })
        }
    }
}

/// Minimal async HTTP client.
///
/// Both calls must give up after `timeout` and must fail with
/// [`TransportError::TooLarge`] rather than buffer more than `max_bytes` of body.
#[allow(async_fn_in_trait)]
pub trait HttpTransport {
    async fn get(
        &self,
        url: &str,
        timeout: Duration,
        max_bytes: usize,
    ) -> Result<HttpResponse, TransportError>;

    /// POST to `url`; `upload`, when present, is sent as the multipart `file` field.
    async fn post(
        &self,
        url: &str,
        upload: Option<Bytes>,
        timeout: Duration,
        max_bytes: usize,
    ) -> Result<HttpResponse, TransportError>;
}

/// [`HttpTransport`] backed by a shared `reqwest::Client`.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TransportError::Request {
                url: String::new(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }

    async fn send(
        &self,
        url: &str,
        request: reqwest::RequestBuilder,
        timeout: Duration,
        max_bytes: usize,
    ) -> Result<HttpResponse, TransportError> {
        let mut response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;

        let status = response.status().as_u16();
        if response.content_length().is_some_and(|len| len > max_bytes as u64) {
            return Err(TransportError::TooLarge {
                url: url.to_string(),
                limit: max_bytes,
            });
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| map_reqwest_error(url, e))? {
            if body.len() + chunk.len() > max_bytes {
                return Err(TransportError::TooLarge {
                    url: url.to_string(),
                    limit: max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(HttpResponse {
            status,
            body: body.freeze(),
        })
    }
}

impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        timeout: Duration,
        max_bytes: usize,
    ) -> Result<HttpResponse, TransportError> {
        let request = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/octet-stream, */*");
        self.send(url, request, timeout, max_bytes).await
    }

    async fn post(
        &self,
        url: &str,
        upload: Option<Bytes>,
        timeout: Duration,
        max_bytes: usize,
    ) -> Result<HttpResponse, TransportError> {
        let mut request = self.client.post(url);
        if let Some(data) = upload {
            let part = reqwest::multipart::Part::bytes(data.to_vec())
                .file_name("record.json")
                .mime_str("application/octet-stream")
                .map_err(|e| map_reqwest_error(url, e))?;
            request = request.multipart(reqwest::multipart::Form::new().part("file", part));
        }
        self.send(url, request, timeout, max_bytes).await
    }
}

fn map_reqwest_error(url: &str, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            url: url.to_string(),
        }
    } else {
        TransportError::Request {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}
