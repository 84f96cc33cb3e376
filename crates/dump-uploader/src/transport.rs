//! Delivery transport for one dump.

use crate::UploadResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::RETRY_AFTER;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// One multipart request worth of data.
#[derive(Debug, Clone)]
pub struct DumpUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub sidecar: Value,
}

/// What the ingestion endpoint answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub retry_after: Option<Duration>,
}

impl TransportResponse {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            retry_after: None,
        }
    }
}

/// Sends a single dump. `Err` means no HTTP status was obtained.
#[async_trait]
pub trait DumpTransport: Send + Sync {
    async fn send(&self, upload: DumpUpload) -> UploadResult<TransportResponse>;
}

/// Multipart POST to the minidump ingestion endpoint.
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
}

impl HttpTransport {
    pub fn new(endpoint: Url, timeout: Duration) -> UploadResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("crashline/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl DumpTransport for HttpTransport {
    async fn send(&self, upload: DumpUpload) -> UploadResult<TransportResponse> {
        let size = upload.bytes.len();
        let dump_part = Part::bytes(upload.bytes)
            .file_name(upload.file_name.clone())
            .mime_str("application/octet-stream")?;
        let sidecar_part =
            Part::text(serde_json::to_string(&upload.sidecar)?).mime_str("application/json")?;
        let form = Form::new()
            .part("upload_file_minidump", dump_part)
            .part("sentry", sidecar_part);

        debug!(file = %upload.file_name, bytes = size, "Sending dump");

        let response = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await?;

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, Utc::now()));

        Ok(TransportResponse {
            status: response.status().as_u16(),
            retry_after,
        })
    }
}

/// Parse a `Retry-After` value: delta-seconds or an HTTP date.
///
/// A date in the past yields zero.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    let delta = at.with_timezone(&Utc) - now;
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}
