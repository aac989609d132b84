pub mod harvest;
pub mod index;
pub mod rpc;
pub mod runtime;

pub use harvest::cache::{CacheCorruptionError, CacheEntry, ResumableCache};
pub use harvest::decoder::{DataPoint, DecodeError, PackageDecoder, SignedDataPackage};
pub use harvest::fetcher::{AttestationFetcher, AttestationIndex, RawAttestationRecord};
pub use harvest::harvester::{Harvester, HarvesterServices, RunSummary};
pub use harvest::identity::OracleId;
pub use harvest::planner::TimeWindow;
pub use harvest::resolver::{BlockResolver, BlockStamp, ChainSource, ResolutionError, ResolvedBlock};
pub use index::client::AttestationIndexClient;
pub use index::gateway::{FetchError, PayloadGateway, PayloadStore};
pub use rpc::{ChainRpcClient, RpcError};
pub use runtime::config::{
    HarvestConfig, HarvestConfigBuilder, HarvestConfigParams, IncompletePolicy,
};
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
