//! Maps wall-clock timestamps onto chain blocks. The resolver binary-searches
//! block height using on-chain timestamps, then floors the found block's
//! timestamp to the bucket granularity the attestation index keys on.

use anyhow::Result;
use futures::future::BoxFuture;
use std::fmt;

/// Read-only view of the chain data source. Implemented by
/// [`crate::rpc::ChainRpcClient`] and by in-memory fixtures in tests.
pub trait ChainSource: Send + Sync {
    fn head_number(&self) -> BoxFuture<'_, Result<u64>>;
    fn block_stamp(&self, number: u64) -> BoxFuture<'_, Result<BlockStamp>>;
}

/// Number and on-chain timestamp of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockStamp {
    pub number: u64,
    pub timestamp: u64,
}

/// Outcome of resolving one requested timestamp.
///
/// `bucketed_timestamp` is the block's on-chain timestamp floored to the
/// configured granularity; it is the key the attestation index is queried
/// with, and is distinct from `requested_timestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedBlock {
    pub requested_timestamp: u64,
    pub block_number: u64,
    pub bucketed_timestamp: u64,
}

#[derive(Debug)]
pub enum ResolutionError {
    BeforeGenesis {
        timestamp: u64,
        genesis_timestamp: u64,
    },
    BeyondHead {
        timestamp: u64,
        head_timestamp: u64,
    },
    Upstream {
        timestamp: u64,
        source: anyhow::Error,
    },
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionError::BeforeGenesis {
                timestamp,
                genesis_timestamp,
            } => write!(
                f,
                "timestamp {timestamp} precedes genesis block time {genesis_timestamp}"
            ),
            ResolutionError::BeyondHead {
                timestamp,
                head_timestamp,
            } => write!(
                f,
                "timestamp {timestamp} is beyond the chain head time {head_timestamp}"
            ),
            ResolutionError::Upstream { timestamp, source } => {
                write!(f, "chain source failed while resolving {timestamp}: {source}")
            }
        }
    }
}

impl std::error::Error for ResolutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResolutionError::Upstream { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Resolves timestamps to blocks against a [`ChainSource`].
pub struct BlockResolver<C: ChainSource> {
    source: C,
    bucket_secs: u64,
}

impl<C: ChainSource> BlockResolver<C> {
    pub fn new(source: C, bucket_secs: u64) -> Self {
        debug_assert!(bucket_secs > 0, "bucket granularity must be positive");
        Self {
            source,
            bucket_secs,
        }
    }

    pub fn source(&self) -> &C {
        &self.source
    }

    /// Finds the earliest block whose on-chain timestamp is at or after
    /// `timestamp` and buckets its timestamp.
    ///
    /// Failures are per-timestamp: the caller leaves the slot empty and
    /// continues with the rest of the batch.
    pub async fn resolve(&self, timestamp: u64) -> Result<ResolvedBlock, ResolutionError> {
        let upstream = |source: anyhow::Error| ResolutionError::Upstream { timestamp, source };

        let head = self.source.head_number().await.map_err(upstream)?;
        let head_stamp = self.source.block_stamp(head).await.map_err(upstream)?;
        if head_stamp.timestamp < timestamp {
            return Err(ResolutionError::BeyondHead {
                timestamp,
                head_timestamp: head_stamp.timestamp,
            });
        }

        let genesis = self.source.block_stamp(0).await.map_err(upstream)?;
        if timestamp < genesis.timestamp {
            return Err(ResolutionError::BeforeGenesis {
                timestamp,
                genesis_timestamp: genesis.timestamp,
            });
        }

        // Invariant: block(lo).timestamp < timestamp <= block(hi).timestamp,
        // except when genesis itself already satisfies the target.
        let mut lo = genesis.number;
        let mut hi = head_stamp.number;
        let mut best = if genesis.timestamp >= timestamp {
            genesis
        } else {
            head_stamp
        };

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let stamp = self.source.block_stamp(mid).await.map_err(upstream)?;
            if stamp.timestamp >= timestamp {
                best = stamp;
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }

        Ok(ResolvedBlock {
            requested_timestamp: timestamp,
            block_number: best.number,
            bucketed_timestamp: bucket(best.timestamp, self.bucket_secs),
        })
    }
}

/// Floors `timestamp` to the index granularity.
pub(crate) fn bucket(timestamp: u64, bucket_secs: u64) -> u64 {
    timestamp / bucket_secs * bucket_secs
}
