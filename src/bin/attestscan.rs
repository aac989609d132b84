//! Environment-driven harvest entry point.
//!
//! Reads its configuration from `ATTESTSCAN_*` variables, runs one harvest
//! over the configured window, and exits 0 on completion or 2 when the run
//! was interrupted by Ctrl-C. Everything flushed before an interruption is
//! preserved and picked up by the next invocation.

use anyhow::{bail, Context, Result};
use attestscan::{
    init_tracing, AttestationFetcher, AttestationIndexClient, BlockResolver, ChainRpcClient,
    HarvestConfig, HarvesterServices, IncompletePolicy, OracleId, PackageDecoder, PayloadGateway,
    Runner,
};
use std::env;
use std::process::ExitCode;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();

    let config = config_from_env().context("invalid ATTESTSCAN_* configuration")?;

    let chain = ChainRpcClient::from_config(&config)?;
    let index = AttestationIndexClient::new(
        config.index_url(),
        config.search_window_secs(),
        config.request_timeout(),
    )?;
    let gateway = PayloadGateway::new(config.gateway_url(), config.request_timeout())?;

    let services = HarvesterServices {
        resolver: BlockResolver::new(chain, config.bucket_secs()),
        fetcher: AttestationFetcher::new(index),
        decoder: PackageDecoder::new(gateway),
    };

    let mut runner = Runner::new(config, services);
    let summary = runner.run_until_ctrl_c().await?;

    if summary.completed {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(2))
    }
}

fn config_from_env() -> Result<HarvestConfig> {
    let mut builder = HarvestConfig::builder()
        .rpc_url(required_var("ATTESTSCAN_RPC_URL")?)
        .index_url(required_var("ATTESTSCAN_INDEX_URL")?)
        .gateway_url(required_var("ATTESTSCAN_GATEWAY_URL")?)
        .cache_path(required_var("ATTESTSCAN_CACHE_PATH")?)
        .start_timestamp(parsed_var("ATTESTSCAN_START_TIMESTAMP")?)
        .end_timestamp(parsed_var("ATTESTSCAN_END_TIMESTAMP")?)
        .oracles(parse_oracles(&required_var("ATTESTSCAN_ORACLES")?)?);

    if let Some(user) = optional_var("ATTESTSCAN_RPC_USER") {
        builder = builder.rpc_user(user);
    }
    if let Some(password) = optional_var("ATTESTSCAN_RPC_PASSWORD") {
        builder = builder.rpc_password(password);
    }
    if let Some(step) = optional_parsed("ATTESTSCAN_STEP_SECS")? {
        builder = builder.step_secs(step);
    }
    if let Some(size) = optional_parsed("ATTESTSCAN_BATCH_SIZE")? {
        builder = builder.batch_size(size);
    }
    if let Some(bucket) = optional_parsed("ATTESTSCAN_BUCKET_SECS")? {
        builder = builder.bucket_secs(bucket);
    }
    if let Some(window) = optional_parsed("ATTESTSCAN_SEARCH_WINDOW_SECS")? {
        builder = builder.search_window_secs(window);
    }
    if let Some(secs) = optional_parsed("ATTESTSCAN_REQUEST_TIMEOUT_SECS")? {
        builder = builder.request_timeout(Duration::from_secs(secs));
    }
    if let Some(policy) = optional_var("ATTESTSCAN_INCOMPLETE_POLICY") {
        builder = builder.incomplete_policy(parse_policy(&policy)?);
    }

    builder.build()
}

fn parse_oracles(raw: &str) -> Result<Vec<OracleId>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<OracleId>()
                .with_context(|| format!("invalid oracle identity {part:?}"))
        })
        .collect()
}

fn parse_policy(raw: &str) -> Result<IncompletePolicy> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "keep" | "keep-processed" => Ok(IncompletePolicy::KeepProcessed),
        "refill" => Ok(IncompletePolicy::Refill),
        other => bail!("unknown incomplete policy {other:?} (expected \"keep\" or \"refill\")"),
    }
}

fn required_var(name: &str) -> Result<String> {
    optional_var(name).with_context(|| format!("environment variable {name} must be set"))
}

fn optional_var(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

fn parsed_var<T>(name: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    required_var(name)?
        .trim()
        .parse::<T>()
        .with_context(|| format!("environment variable {name} is not a valid number"))
}

fn optional_parsed<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_var(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("environment variable {name} is not a valid number")),
        None => Ok(None),
    }
}
