//! Payload store access: fetch-by-locator against an HTTP gateway, plus the
//! `FetchError` taxonomy shared with the index client. Fetch failures are
//! always per-item; callers leave the oracle's slot empty and continue.

use anyhow::Result;
use futures::future::BoxFuture;
use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub enum FetchError {
    Timeout {
        endpoint: &'static str,
    },
    Status {
        endpoint: &'static str,
        status: u16,
    },
    Transport {
        endpoint: &'static str,
        source: anyhow::Error,
    },
    Malformed {
        endpoint: &'static str,
        detail: String,
    },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Timeout { endpoint } => write!(f, "{endpoint} request timed out"),
            FetchError::Status { endpoint, status } => {
                write!(f, "{endpoint} returned HTTP status {status}")
            }
            FetchError::Transport { endpoint, source } => {
                write!(f, "{endpoint} transport failure: {source}")
            }
            FetchError::Malformed { endpoint, detail } => {
                write!(f, "{endpoint} returned a malformed response: {detail}")
            }
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Transport { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl FetchError {
    pub(crate) fn from_reqwest(endpoint: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout { endpoint }
        } else {
            FetchError::Transport {
                endpoint,
                source: err.into(),
            }
        }
    }
}

/// Fetch-by-locator access to published attestation content. Implemented by
/// [`PayloadGateway`] and by in-memory fixtures in tests.
pub trait PayloadStore: Send + Sync {
    fn fetch(&self, locator: &str) -> BoxFuture<'_, Result<Vec<u8>, FetchError>>;
}

/// HTTP gateway serving raw attestation payloads at `{base_url}/{locator}`.
#[derive(Debug, Clone)]
pub struct PayloadGateway {
    base_url: String,
    http: reqwest::Client,
}

const ENDPOINT: &str = "payload gateway";

impl PayloadGateway {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn fetch_bytes(&self, locator: &str) -> Result<Vec<u8>, FetchError> {
        let url = format!("{}/{locator}", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| FetchError::from_reqwest(ENDPOINT, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                endpoint: ENDPOINT,
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| FetchError::from_reqwest(ENDPOINT, err))?;
        tracing::trace!(locator, bytes = bytes.len(), "fetched attestation payload");
        Ok(bytes.to_vec())
    }
}

impl PayloadStore for PayloadGateway {
    fn fetch(&self, locator: &str) -> BoxFuture<'_, Result<Vec<u8>, FetchError>> {
        let locator = locator.to_owned();
        Box::pin(async move { self.fetch_bytes(&locator).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_slash_from_base_url() {
        let gateway =
            PayloadGateway::new("https://arweave.net/", Duration::from_secs(5)).unwrap();
        assert_eq!(gateway.base_url(), "https://arweave.net");
    }

    #[test]
    fn fetch_error_display_is_stable() {
        let err = FetchError::Status {
            endpoint: "payload gateway",
            status: 404,
        };
        assert_eq!(err.to_string(), "payload gateway returned HTTP status 404");
    }
}
