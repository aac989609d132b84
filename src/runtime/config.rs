use crate::harvest::identity::OracleId;
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_STEP_SECS: u64 = 86_400;
const DEFAULT_BATCH_SIZE: usize = 5;
const DEFAULT_BUCKET_SECS: u64 = 10;

/// What to do with a timestamp whose cached entry has empty oracle slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IncompletePolicy {
    /// A timestamp counts as processed once every identity was attempted,
    /// however many succeeded. Missing oracles are never revisited.
    #[default]
    KeepProcessed,
    /// Re-attempt incomplete timestamps at the start of the next run and
    /// replace their entries wholesale.
    Refill,
}

/// Runtime configuration for the harvester.
///
/// All instances must be constructed via [`HarvestConfig::builder`] or
/// [`HarvestConfig::new`] so invariants are validated before any consumer
/// observes the values.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestConfig {
    rpc_url: String,
    rpc_user: String,
    rpc_password: String,
    index_url: String,
    gateway_url: String,
    cache_path: PathBuf,
    start_timestamp: u64,
    end_timestamp: u64,
    step_secs: u64,
    batch_size: usize,
    bucket_secs: u64,
    search_window_secs: u64,
    request_timeout: Duration,
    oracles: Vec<OracleId>,
    incomplete_policy: IncompletePolicy,
}

pub struct HarvestConfigParams {
    pub rpc_url: String,
    pub rpc_user: String,
    pub rpc_password: String,
    pub index_url: String,
    pub gateway_url: String,
    pub cache_path: PathBuf,
    pub start_timestamp: u64,
    pub end_timestamp: u64,
    pub step_secs: u64,
    pub batch_size: usize,
    pub bucket_secs: u64,
    pub search_window_secs: u64,
    pub request_timeout: Duration,
    pub oracles: Vec<OracleId>,
    pub incomplete_policy: IncompletePolicy,
}

impl HarvestConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> HarvestConfigBuilder {
        HarvestConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    ///
    /// Prefer [`HarvestConfig::builder`] for ergonomics when many values use
    /// defaults. Callers that already have concrete runtime parameters can
    /// use this method to enforce validation without going through the
    /// builder.
    pub fn new(params: HarvestConfigParams) -> Result<Self> {
        let HarvestConfigParams {
            rpc_url,
            rpc_user,
            rpc_password,
            index_url,
            gateway_url,
            cache_path,
            start_timestamp,
            end_timestamp,
            step_secs,
            batch_size,
            bucket_secs,
            search_window_secs,
            request_timeout,
            oracles,
            incomplete_policy,
        } = params;

        let config = Self {
            rpc_url: trimmed_string(rpc_url),
            rpc_user: trimmed_string(rpc_user),
            rpc_password: trimmed_string(rpc_password),
            index_url: trimmed_string(index_url),
            gateway_url: trimmed_string(gateway_url),
            cache_path,
            start_timestamp,
            end_timestamp,
            step_secs,
            batch_size,
            bucket_secs,
            search_window_secs,
            request_timeout,
            oracles,
            incomplete_policy,
        };

        config.validate()?;
        Ok(config)
    }

    /// Full chain RPC URL (including scheme).
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Optional client credential for the chain data source. Present only
    /// when both user and password were configured; never used to sign
    /// writes.
    pub fn rpc_auth(&self) -> Option<(String, String)> {
        if self.rpc_user.is_empty() || self.rpc_password.is_empty() {
            None
        } else {
            Some((self.rpc_user.clone(), self.rpc_password.clone()))
        }
    }

    /// Attestation index query endpoint.
    pub fn index_url(&self) -> &str {
        &self.index_url
    }

    /// Payload gateway base URL.
    pub fn gateway_url(&self) -> &str {
        &self.gateway_url
    }

    /// Path of the persisted cache snapshot.
    pub fn cache_path(&self) -> &PathBuf {
        &self.cache_path
    }

    /// First wall-clock timestamp of the requested range.
    pub fn start_timestamp(&self) -> u64 {
        self.start_timestamp
    }

    /// Last wall-clock timestamp of the requested range (inclusive).
    pub fn end_timestamp(&self) -> u64 {
        self.end_timestamp
    }

    /// Spacing between harvested timestamps.
    pub fn step_secs(&self) -> u64 {
        self.step_secs
    }

    /// Maximum timestamps processed concurrently between flushes.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Granularity the attestation index keys timestamps on. An upstream
    /// constant today, but configuration here since the index may change it.
    pub fn bucket_secs(&self) -> u64 {
        self.bucket_secs
    }

    /// Half-width of the index query window around a bucketed timestamp.
    pub fn search_window_secs(&self) -> u64 {
        self.search_window_secs
    }

    /// Per-request timeout applied to every outbound network call.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Configured oracle identities. Order is significant: it fixes the slot
    /// order inside every cache entry.
    pub fn oracles(&self) -> &[OracleId] {
        &self.oracles
    }

    pub fn incomplete_policy(&self) -> IncompletePolicy {
        self.incomplete_policy
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        validate_url(&self.rpc_url, "rpc_url")?;
        validate_url(&self.index_url, "index_url")?;
        validate_url(&self.gateway_url, "gateway_url")?;

        if self.rpc_user.is_empty() != self.rpc_password.is_empty() {
            bail!("rpc_user and rpc_password must be configured together");
        }

        if self.cache_path.as_os_str().is_empty() {
            bail!("cache_path cannot be empty");
        }

        if self.end_timestamp < self.start_timestamp {
            bail!(
                "end_timestamp ({}) must not precede start_timestamp ({})",
                self.end_timestamp,
                self.start_timestamp
            );
        }

        if self.step_secs == 0 {
            bail!("step_secs must be greater than 0");
        }

        if self.batch_size == 0 {
            bail!("batch_size must be greater than 0");
        }

        if self.bucket_secs == 0 {
            bail!("bucket_secs must be greater than 0");
        }

        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }

        if self.oracles.is_empty() {
            bail!("at least one oracle identity must be configured");
        }

        let mut seen = std::collections::HashSet::new();
        for oracle in &self.oracles {
            if !seen.insert(oracle) {
                bail!("oracle identity {oracle} is configured more than once");
            }
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct HarvestConfigBuilder {
    rpc_url: Option<String>,
    rpc_user: Option<String>,
    rpc_password: Option<String>,
    index_url: Option<String>,
    gateway_url: Option<String>,
    cache_path: Option<PathBuf>,
    start_timestamp: Option<u64>,
    end_timestamp: Option<u64>,
    step_secs: Option<u64>,
    batch_size: Option<usize>,
    bucket_secs: Option<u64>,
    search_window_secs: Option<u64>,
    request_timeout: Option<Duration>,
    oracles: Option<Vec<OracleId>>,
    incomplete_policy: Option<IncompletePolicy>,
}

impl HarvestConfigBuilder {
    pub fn rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = Some(url.into());
        self
    }

    pub fn rpc_user(mut self, user: impl Into<String>) -> Self {
        self.rpc_user = Some(user.into());
        self
    }

    pub fn rpc_password(mut self, password: impl Into<String>) -> Self {
        self.rpc_password = Some(password.into());
        self
    }

    pub fn index_url(mut self, url: impl Into<String>) -> Self {
        self.index_url = Some(url.into());
        self
    }

    pub fn gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = Some(url.into());
        self
    }

    pub fn cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    pub fn start_timestamp(mut self, timestamp: u64) -> Self {
        self.start_timestamp = Some(timestamp);
        self
    }

    pub fn end_timestamp(mut self, timestamp: u64) -> Self {
        self.end_timestamp = Some(timestamp);
        self
    }

    pub fn step_secs(mut self, step: u64) -> Self {
        self.step_secs = Some(step);
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn bucket_secs(mut self, bucket: u64) -> Self {
        self.bucket_secs = Some(bucket);
        self
    }

    pub fn search_window_secs(mut self, window: u64) -> Self {
        self.search_window_secs = Some(window);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn oracles(mut self, oracles: Vec<OracleId>) -> Self {
        self.oracles = Some(oracles);
        self
    }

    pub fn incomplete_policy(mut self, policy: IncompletePolicy) -> Self {
        self.incomplete_policy = Some(policy);
        self
    }

    pub fn build(self) -> Result<HarvestConfig> {
        let bucket_secs = self.bucket_secs.unwrap_or(DEFAULT_BUCKET_SECS);
        let params = HarvestConfigParams {
            rpc_url: self.rpc_url.context("rpc_url is required")?,
            rpc_user: self.rpc_user.unwrap_or_default(),
            rpc_password: self.rpc_password.unwrap_or_default(),
            index_url: self.index_url.context("index_url is required")?,
            gateway_url: self.gateway_url.context("gateway_url is required")?,
            cache_path: self.cache_path.context("cache_path is required")?,
            start_timestamp: self
                .start_timestamp
                .context("start_timestamp is required")?,
            end_timestamp: self.end_timestamp.context("end_timestamp is required")?,
            step_secs: self.step_secs.unwrap_or(DEFAULT_STEP_SECS),
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            bucket_secs,
            search_window_secs: self.search_window_secs.unwrap_or(bucket_secs),
            request_timeout: self
                .request_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
            oracles: self.oracles.context("oracles are required")?,
            incomplete_policy: self.incomplete_policy.unwrap_or_default(),
        };

        HarvestConfig::new(params)
    }
}

fn trimmed_string(value: String) -> String {
    value.trim().to_owned()
}

fn validate_url(url: &str, field: &str) -> Result<()> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("{field} must start with http:// or https://");
    }
    Ok(())
}
