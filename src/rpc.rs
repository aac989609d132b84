//! JSON-RPC access to the chain data source. The client only performs
//! read-only queries (head number, block by number) used by the block
//! resolver's timestamp search.

pub(crate) mod auth;
pub mod client;
pub mod metrics;
pub mod options;

pub use client::{ChainRpcClient, RpcError};
pub use metrics::RpcMetricsSnapshot;
pub use options::RpcClientOptions;
