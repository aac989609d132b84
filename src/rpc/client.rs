//! RPC client implementation for querying the chain data source via
//! JSON-RPC. Houses the `ChainRpcClient`, its error types, and the quantity
//! parsing helpers used to decode hex-encoded block fields.

use crate::harvest::resolver::{BlockStamp, ChainSource};
use crate::rpc::auth::build_auth_headers;
use crate::rpc::metrics::{RpcMetrics, RpcMetricsSnapshot};
use crate::rpc::options::RpcClientOptions;
use crate::runtime::config::HarvestConfig;
use anyhow::{anyhow, Context, Result};
use futures::future::BoxFuture;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::{HeaderMap, HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::Deserialize;
use std::sync::Arc;
use tokio::time::{timeout, Instant};

#[derive(Debug)]
pub enum RpcError {
    Timeout { method: &'static str },
    MissingBlock { number: u64 },
    InvalidQuantity { field: &'static str },
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::Timeout { method } => write!(f, "rpc method {method} timed out"),
            RpcError::MissingBlock { number } => {
                write!(f, "chain source returned no block for number {number}")
            }
            RpcError::InvalidQuantity { field } => {
                write!(f, "chain source returned a malformed hex quantity for {field}")
            }
        }
    }
}

impl std::error::Error for RpcError {}

/// Block envelope subset returned by `eth_getBlockByNumber`. Only the fields
/// the resolver's search needs are deserialized.
#[derive(Debug, Deserialize)]
struct RpcBlock {
    number: String,
    timestamp: String,
}

#[derive(Debug, Clone)]
pub struct ChainRpcClient {
    rpc_url: Arc<String>,
    client: HttpClient,
    options: RpcClientOptions,
    metrics: Arc<RpcMetrics>,
}

impl ChainSource for ChainRpcClient {
    fn head_number(&self) -> BoxFuture<'_, Result<u64>> {
        Box::pin(self.head_number())
    }

    fn block_stamp(&self, number: u64) -> BoxFuture<'_, Result<BlockStamp>> {
        Box::pin(self.block_stamp(number))
    }
}

impl ChainRpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_options(url, None, RpcClientOptions::default())
    }

    pub fn with_auth(
        url: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        Self::with_options(
            url,
            Some((user.into(), password.into())),
            RpcClientOptions::default(),
        )
    }

    pub fn with_options(
        url: impl Into<String>,
        auth: Option<(String, String)>,
        options: RpcClientOptions,
    ) -> Result<Self> {
        options.validate()?;

        let rpc_url = url.into();
        let headers = match &auth {
            Some((user, password)) => build_auth_headers(user, password)?,
            None => HeaderMap::new(),
        };
        let max_request_body_size = options.max_request_body_bytes.min(u32::MAX as usize) as u32;
        let max_response_body_size = options.max_response_body_bytes.min(u32::MAX as usize) as u32;

        let client = HttpClientBuilder::default()
            .set_headers(headers)
            .request_timeout(options.request_timeout)
            .max_concurrent_requests(options.max_concurrent_requests)
            .max_request_size(max_request_body_size)
            .max_response_size(max_response_body_size)
            .build(&rpc_url)
            .map_err(|err| anyhow!("failed to build RPC client: {err}"))?;

        Ok(Self {
            rpc_url: Arc::new(rpc_url),
            client,
            options,
            metrics: Arc::new(RpcMetrics::default()),
        })
    }

    pub fn from_config(config: &HarvestConfig) -> Result<Self> {
        config.validate()?;
        let options = RpcClientOptions {
            max_concurrent_requests: std::cmp::max(8, config.batch_size().saturating_mul(2)),
            request_timeout: config.request_timeout(),
            ..RpcClientOptions::default()
        };
        Self::with_options(config.rpc_url().to_owned(), config.rpc_auth(), options)
    }

    pub fn endpoint(&self) -> &str {
        &self.rpc_url
    }

    pub fn metrics(&self) -> RpcMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Current chain head number via `eth_blockNumber`.
    pub async fn head_number(&self) -> Result<u64> {
        const METHOD: &str = "eth_blockNumber";

        let raw: String = self.request(METHOD, rpc_params![]).await?;
        parse_quantity(&raw, "blockNumber")
    }

    /// Number and on-chain timestamp of the block at `number` via
    /// `eth_getBlockByNumber`. Transaction bodies are never requested.
    pub async fn block_stamp(&self, number: u64) -> Result<BlockStamp> {
        const METHOD: &str = "eth_getBlockByNumber";

        let tag = format!("0x{number:x}");
        let block: Option<RpcBlock> = self.request(METHOD, rpc_params![tag, false]).await?;
        let block = block.ok_or(RpcError::MissingBlock { number })?;

        let parsed_number = parse_quantity(&block.number, "number")?;
        let timestamp = parse_quantity(&block.timestamp, "timestamp")?;

        Ok(BlockStamp {
            number: parsed_number,
            timestamp,
        })
    }

    async fn request<R>(&self, method: &'static str, params: jsonrpsee::core::params::ArrayParams) -> Result<R>
    where
        R: serde::de::DeserializeOwned,
    {
        let start = Instant::now();
        let outcome = timeout(
            self.options.request_timeout,
            self.client.request::<R, _>(method, params),
        )
        .await;

        match outcome {
            Err(_) => {
                self.metrics.record_timeout(start.elapsed());
                Err(RpcError::Timeout { method }.into())
            }
            Ok(Err(err)) => {
                self.metrics.record_failure(start.elapsed());
                Err(anyhow!("rpc {method} call failed: {err}"))
            }
            Ok(Ok(value)) => {
                self.metrics.record_success(start.elapsed());
                tracing::trace!(method, "rpc call completed");
                Ok(value)
            }
        }
    }
}

fn parse_quantity(raw: &str, field: &'static str) -> Result<u64> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or(RpcError::InvalidQuantity { field })?;
    u64::from_str_radix(digits, 16)
        .map_err(|_| RpcError::InvalidQuantity { field })
        .with_context(|| format!("failed to parse {field} quantity {trimmed:?}"))
}
