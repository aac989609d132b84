//! Attestation index client. One query per oracle identity, filtered by
//! identity tag and a small timestamp window around the bucketed block time;
//! the index is eventually consistent so an exact key match is never assumed.

use crate::harvest::fetcher::{AttestationIndex, RawAttestationRecord};
use crate::harvest::identity::OracleId;
use crate::index::gateway::FetchError;
use anyhow::Result;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const ENDPOINT: &str = "attestation index";

const RECORDS_QUERY: &str = r#"query Attestations($signer: String!, $from: String!, $to: String!) {
  transactions(
    tags: [
      { name: "type", values: ["redstone-oracles"] }
      { name: "signerAddress", values: [$signer] }
      { name: "timestamp", min: $from, max: $to }
    ]
    first: 10
  ) {
    edges {
      node {
        id
      }
    }
  }
}"#;

#[derive(Debug, Deserialize)]
struct QueryResponse {
    data: Option<QueryData>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    transactions: Edges,
}

#[derive(Debug, Deserialize)]
struct Edges {
    edges: Vec<Edge>,
}

#[derive(Debug, Deserialize)]
struct Edge {
    node: Node,
}

#[derive(Debug, Deserialize)]
struct Node {
    id: String,
}

/// HTTP client for the attestation index's query endpoint.
#[derive(Debug, Clone)]
pub struct AttestationIndexClient {
    query_url: String,
    window_secs: u64,
    http: reqwest::Client,
}

impl AttestationIndexClient {
    pub fn new(
        query_url: impl Into<String>,
        window_secs: u64,
        request_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            query_url: query_url.into(),
            window_secs,
            http,
        })
    }

    pub fn query_url(&self) -> &str {
        &self.query_url
    }

    async fn query_records(
        &self,
        identity: &OracleId,
        bucketed_timestamp: u64,
    ) -> Result<Vec<RawAttestationRecord>, FetchError> {
        let from = bucketed_timestamp.saturating_sub(self.window_secs);
        let to = bucketed_timestamp.saturating_add(self.window_secs);
        let body = json!({
            "query": RECORDS_QUERY,
            "variables": {
                "signer": identity.as_str(),
                "from": from.to_string(),
                "to": to.to_string(),
            },
        });

        let response = self
            .http
            .post(&self.query_url)
            .json(&body)
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

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|err| FetchError::Malformed {
                endpoint: ENDPOINT,
                detail: err.to_string(),
            })?;

        let data = parsed.data.ok_or_else(|| FetchError::Malformed {
            endpoint: ENDPOINT,
            detail: "response carried no data object".to_owned(),
        })?;

        let records = data
            .transactions
            .edges
            .into_iter()
            .map(|edge| RawAttestationRecord {
                oracle: identity.clone(),
                locator: edge.node.id,
            })
            .collect();

        Ok(records)
    }
}

impl AttestationIndex for AttestationIndexClient {
    fn query(
        &self,
        identity: &OracleId,
        bucketed_timestamp: u64,
    ) -> BoxFuture<'_, Result<Vec<RawAttestationRecord>, FetchError>> {
        let identity = identity.clone();
        Box::pin(async move { self.query_records(&identity, bucketed_timestamp).await })
    }
}
