//! Oracle identities are a closed, configured set. The newtype keeps the
//! address-shaped identifier validated at the configuration boundary so no
//! free-form string reaches query building or slot assignment.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a trusted attestor: a 0x-prefixed 20-byte hex address.
///
/// Comparison is case-insensitive; the value is stored lowercased so cache
/// slot assignment and index queries are stable regardless of how the
/// identity was written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OracleId(String);

impl OracleId {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let Some(digits) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X"))
        else {
            bail!("oracle identity {trimmed:?} must start with 0x");
        };

        let bytes = match hex::decode(digits) {
            Ok(bytes) => bytes,
            Err(err) => bail!("oracle identity {trimmed:?} is not valid hex: {err}"),
        };
        if bytes.len() != 20 {
            bail!(
                "oracle identity {trimmed:?} must encode 20 bytes, got {}",
                bytes.len()
            );
        }

        Ok(Self(format!("0x{}", digits.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OracleId {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        Self::parse(raw)
    }
}

impl fmt::Display for OracleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
