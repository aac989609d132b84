use std::time::Duration;

use anyhow::Result;
use attestscan::{
    AttestationFetcher, AttestationIndexClient, BlockResolver, ChainRpcClient, HarvestConfig,
    HarvesterServices, OracleId, PackageDecoder, PayloadGateway,
};
use once_cell::sync::Lazy;
use tracing_subscriber::EnvFilter;

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

/// Three well-formed oracle identities used across the integration tests.
pub const ORACLE_HEX: [&str; 3] = [
    "0x83cbA8c619fb629b81A65C2e67fE15cf3E3C9747",
    "0x2c59617248994D12816EE1Fa77CE0a64eEB456BF",
    "0x12470f7aBA85c8b81D63137DD5925D6EE114952b",
];

pub fn test_oracles() -> Vec<OracleId> {
    ORACLE_HEX
        .iter()
        .map(|hex| hex.parse().expect("fixture identity must parse"))
        .collect()
}

pub fn build_config(
    rpc_url: &str,
    index_url: &str,
    gateway_url: &str,
    cache_path: &std::path::Path,
    start: u64,
    end: u64,
) -> Result<HarvestConfig> {
    HarvestConfig::builder()
        .rpc_url(rpc_url)
        .index_url(index_url)
        .gateway_url(gateway_url)
        .cache_path(cache_path)
        .start_timestamp(start)
        .end_timestamp(end)
        .step_secs(86_400)
        .batch_size(5)
        .oracles(test_oracles())
        .request_timeout(Duration::from_secs(5))
        .build()
}

/// Wires real production clients against a mock server's endpoints.
pub fn build_services(
    config: &HarvestConfig,
) -> Result<HarvesterServices<ChainRpcClient, AttestationIndexClient, PayloadGateway>> {
    let chain = ChainRpcClient::from_config(config)?;
    let index = AttestationIndexClient::new(
        config.index_url(),
        config.search_window_secs(),
        config.request_timeout(),
    )?;
    let gateway = PayloadGateway::new(config.gateway_url(), config.request_timeout())?;

    Ok(HarvesterServices {
        resolver: BlockResolver::new(chain, config.bucket_secs()),
        fetcher: AttestationFetcher::new(index),
        decoder: PackageDecoder::new(gateway),
    })
}
