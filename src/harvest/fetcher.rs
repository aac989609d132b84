//! Per-oracle fan-out against the attestation index. Each configured
//! identity is queried independently; a missing or failed lookup leaves that
//! identity's slot empty without blocking the others.

use crate::harvest::identity::OracleId;
use crate::index::gateway::FetchError;
use anyhow::Result;
use futures::future::{join_all, BoxFuture};

/// Pointer to one published attestation's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttestationRecord {
    pub oracle: OracleId,
    pub locator: String,
}

/// Query interface of the attestation index. Implemented by
/// [`crate::index::AttestationIndexClient`] and by fixtures in tests.
pub trait AttestationIndex: Send + Sync {
    fn query(
        &self,
        identity: &OracleId,
        bucketed_timestamp: u64,
    ) -> BoxFuture<'_, Result<Vec<RawAttestationRecord>, FetchError>>;
}

/// Fans one resolved timestamp out across the configured oracle identities.
pub struct AttestationFetcher<I: AttestationIndex> {
    index: I,
}

impl<I: AttestationIndex> AttestationFetcher<I> {
    pub fn new(index: I) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    /// Queries the index once per identity and returns one slot per identity,
    /// in identity order. `None` marks an identity whose query failed or
    /// returned no records; there is no in-run retry.
    pub async fn fetch_all(
        &self,
        bucketed_timestamp: u64,
        identities: &[OracleId],
    ) -> Vec<Option<RawAttestationRecord>> {
        let queries = identities
            .iter()
            .map(|identity| async move {
                match self.index.query(identity, bucketed_timestamp).await {
                    Ok(mut records) => {
                        if records.is_empty() {
                            tracing::debug!(
                                oracle = %identity,
                                bucketed_timestamp,
                                "index returned no records for identity"
                            );
                            None
                        } else {
                            Some(records.remove(0))
                        }
                    }
                    Err(err) => {
                        tracing::warn!(
                            oracle = %identity,
                            bucketed_timestamp,
                            error = %err,
                            "index query failed; leaving slot empty"
                        );
                        None
                    }
                }
            })
            .collect::<Vec<_>>();

        join_all(queries).await
    }
}
