//! Ingestion key (DSN) parsing and endpoint derivation.

use crate::{CoreError, CoreResult};
use std::fmt;
use url::Url;

/// Submission URL handed to the native crash handler.
///
/// Nothing listens here. The handler must only write dumps to disk; the
/// coordinator is the sole process that performs delivery.
pub const PLACEHOLDER_SUBMIT_URL: &str = "http://127.0.0.1:9/crashline-placeholder";

/// A parsed ingestion key of the form
/// `https://<public_key>@<host>[:port][/<path>]/<project_id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionKey {
    public_key: String,
    scheme: String,
    host: String,
    port: Option<u16>,
    path_prefix: String,
    project_id: String,
}

impl IngestionKey {
    pub fn parse(dsn: &str) -> CoreResult<Self> {
        let url = Url::parse(dsn.trim())?;

        let scheme = url.scheme().to_string();
        if scheme != "http" && scheme != "https" {
            return Err(CoreError::InvalidIngestionKey(format!(
                "unsupported scheme '{}'",
                scheme
            )));
        }

        let public_key = url.username().to_string();
        if public_key.is_empty() {
            return Err(CoreError::InvalidIngestionKey(
                "missing public key".to_string(),
            ));
        }

        let host = url
            .host_str()
            .ok_or_else(|| CoreError::InvalidIngestionKey("missing host".to_string()))?
            .to_string();

        let mut segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();
        let project_id = segments
            .pop()
            .ok_or_else(|| CoreError::InvalidIngestionKey("missing project id".to_string()))?
            .to_string();
        let path_prefix = segments
            .iter()
            .map(|seg| format!("/{}", seg))
            .collect::<String>();

        Ok(Self {
            public_key,
            scheme,
            host,
            port: url.port(),
            path_prefix,
            project_id,
        })
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Minidump ingestion endpoint:
    /// `<scheme>://<host>[:port]/api/<project_id>/minidump/?sentry_key=<public_key>`.
    pub fn minidump_endpoint(&self) -> CoreResult<Url> {
        let authority = match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        };
        let mut url = Url::parse(&format!(
            "{}://{}{}/api/{}/minidump/",
            self.scheme, authority, self.path_prefix, self.project_id
        ))?;
        url.query_pairs_mut()
            .append_pair("sentry_key", &self.public_key);
        Ok(url)
    }
}

impl fmt::Display for IngestionKey {
    /// Renders without the public key so it can be logged.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        write!(f, "{}/{}", self.path_prefix, self.project_id)
    }
}
