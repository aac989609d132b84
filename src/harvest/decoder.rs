//! Decodes raw attestation payloads into structured signed data packages.
//! Structural validation only: the signer field must be present and match the
//! identity the record was fetched for. Cryptographic signature verification
//! belongs to a downstream library collaborator, not this crate.

use crate::harvest::fetcher::RawAttestationRecord;
use crate::harvest::identity::OracleId;
use crate::index::gateway::{FetchError, PayloadStore};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One numeric price point inside a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    #[serde(alias = "dataFeedId")]
    pub symbol: String,
    pub value: f64,
}

/// Decoded attestation: ordered price points plus signer metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedDataPackage {
    pub data_points: Vec<DataPoint>,
    pub signer: OracleId,
    pub timestamp_ms: u64,
}

/// Wire envelope published by oracle nodes.
#[derive(Debug, Deserialize)]
struct PackageEnvelope {
    #[serde(rename = "dataPoints")]
    data_points: Option<Vec<DataPoint>>,
    #[serde(rename = "timestampMilliseconds")]
    timestamp_ms: Option<u64>,
    #[serde(rename = "signerAddress")]
    signer_address: Option<String>,
    signature: Option<String>,
}

#[derive(Debug)]
pub enum DecodeError {
    Fetch(FetchError),
    Json { locator: String, detail: String },
    MissingField { locator: String, field: &'static str },
    SignerMismatch { expected: OracleId, found: String },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Fetch(err) => write!(f, "payload fetch failed: {err}"),
            DecodeError::Json { locator, detail } => {
                write!(f, "payload {locator} is not valid JSON: {detail}")
            }
            DecodeError::MissingField { locator, field } => {
                write!(f, "payload {locator} is missing required field {field}")
            }
            DecodeError::SignerMismatch { expected, found } => write!(
                f,
                "payload signer {found} does not match queried identity {expected}"
            ),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Fetch(err) => Some(err),
            _ => None,
        }
    }
}

impl From<FetchError> for DecodeError {
    fn from(err: FetchError) -> Self {
        DecodeError::Fetch(err)
    }
}

/// Fetches and decodes one raw attestation record.
pub struct PackageDecoder<P: PayloadStore> {
    store: P,
}

impl<P: PayloadStore> PackageDecoder<P> {
    pub fn new(store: P) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &P {
        &self.store
    }

    pub async fn decode(
        &self,
        record: &RawAttestationRecord,
    ) -> Result<SignedDataPackage, DecodeError> {
        let bytes = self.store.fetch(&record.locator).await?;

        let envelope: PackageEnvelope =
            serde_json::from_slice(&bytes).map_err(|err| DecodeError::Json {
                locator: record.locator.clone(),
                detail: err.to_string(),
            })?;

        let missing = |field: &'static str| DecodeError::MissingField {
            locator: record.locator.clone(),
            field,
        };

        let data_points = envelope.data_points.ok_or_else(|| missing("dataPoints"))?;
        let timestamp_ms = envelope
            .timestamp_ms
            .ok_or_else(|| missing("timestampMilliseconds"))?;
        let signer_raw = envelope
            .signer_address
            .ok_or_else(|| missing("signerAddress"))?;
        match envelope.signature {
            Some(signature) if !signature.trim().is_empty() => {}
            _ => return Err(missing("signature")),
        }

        let signer = OracleId::parse(&signer_raw).map_err(|_| DecodeError::SignerMismatch {
            expected: record.oracle.clone(),
            found: signer_raw.clone(),
        })?;
        if signer != record.oracle {
            return Err(DecodeError::SignerMismatch {
                expected: record.oracle.clone(),
                found: signer_raw,
            });
        }

        Ok(SignedDataPackage {
            data_points,
            signer,
            timestamp_ms,
        })
    }
}
