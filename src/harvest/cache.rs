//! In-memory mirror of the persisted harvest results. The backing file is a
//! single JSON object keyed by decimal bucket-start timestamps, rewritten
//! wholesale on every flush via a temp-file-then-rename so a crash never
//! leaves a half-written snapshot.

use crate::harvest::decoder::DataPoint;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// One cached timestamp: one slot per configured oracle, in identity order.
/// An empty slot records an oracle whose resolution, fetch, or decode failed.
pub type CacheEntry = Vec<Vec<DataPoint>>;

/// Raised when the persisted file exists but cannot be parsed. Always fatal:
/// a file that failed to load cleanly must never be overwritten.
#[derive(Debug)]
pub struct CacheCorruptionError {
    pub path: PathBuf,
    pub detail: String,
}

impl fmt::Display for CacheCorruptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cache file {} is unreadable or corrupt: {}",
            self.path.display(),
            self.detail
        )
    }
}

impl std::error::Error for CacheCorruptionError {}

struct OrderedSnapshot<'a>(&'a BTreeMap<u64, CacheEntry>);

impl Serialize for OrderedSnapshot<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // BTreeMap iteration gives ascending numeric order; emitting keys as
        // decimal strings in that order keeps reserialization byte-identical.
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (timestamp, entry) in self.0 {
            map.serialize_entry(&timestamp.to_string(), entry)?;
        }
        map.end()
    }
}

#[derive(Debug)]
pub struct ResumableCache {
    path: PathBuf,
    entries: BTreeMap<u64, CacheEntry>,
}

impl ResumableCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reads the persisted snapshot into memory. A missing file is an empty
    /// cache; an unparseable one is fatal corruption.
    pub fn load(&mut self) -> Result<(), CacheCorruptionError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                self.entries.clear();
                return Ok(());
            }
            Err(err) => {
                return Err(CacheCorruptionError {
                    path: self.path.clone(),
                    detail: err.to_string(),
                })
            }
        };

        let parsed: BTreeMap<String, CacheEntry> =
            serde_json::from_str(&raw).map_err(|err| CacheCorruptionError {
                path: self.path.clone(),
                detail: err.to_string(),
            })?;

        let mut entries = BTreeMap::new();
        for (key, entry) in parsed {
            let timestamp = key.parse::<u64>().map_err(|_| CacheCorruptionError {
                path: self.path.clone(),
                detail: format!("non-numeric timestamp key {key:?}"),
            })?;
            entries.insert(timestamp, entry);
        }

        tracing::debug!(
            path = %self.path.display(),
            entries = entries.len(),
            "loaded cache snapshot"
        );
        self.entries = entries;
        Ok(())
    }

    pub fn get(&self, timestamp: u64) -> Option<&CacheEntry> {
        self.entries.get(&timestamp)
    }

    pub fn contains(&self, timestamp: u64) -> bool {
        self.entries.contains_key(&timestamp)
    }

    /// Greatest cached timestamp, the anchor for the resume point.
    pub fn greatest_timestamp(&self) -> Option<u64> {
        self.entries.keys().next_back().copied()
    }

    /// Inserts a new entry. Overwriting is an invariant violation: entries
    /// are additive-only once written.
    pub fn put(&mut self, timestamp: u64, entry: CacheEntry) -> anyhow::Result<()> {
        if self.entries.contains_key(&timestamp) {
            anyhow::bail!("cache entry for timestamp {timestamp} already exists");
        }
        self.entries.insert(timestamp, entry);
        Ok(())
    }

    /// Replaces an entry wholesale. Only the refill policy path may call
    /// this; the regular harvest path uses [`Self::put`].
    pub fn replace(&mut self, timestamp: u64, entry: CacheEntry) {
        self.entries.insert(timestamp, entry);
    }

    /// Timestamps whose entries have at least one empty slot, or whose slot
    /// count no longer matches the configured identity list.
    pub fn incomplete_timestamps(&self, slot_count: usize) -> Vec<u64> {
        self.entries
            .iter()
            .filter(|(_, entry)| {
                entry.len() != slot_count || entry.iter().any(|slot| slot.is_empty())
            })
            .map(|(timestamp, _)| *timestamp)
            .collect()
    }

    /// Atomically persists the whole in-memory map: serialize to a sibling
    /// temp file, then rename over the target.
    pub fn flush(&self) -> anyhow::Result<()> {
        use anyhow::Context;

        let serialized = serde_json::to_string(&OrderedSnapshot(&self.entries))
            .context("failed to serialize cache snapshot")?;

        let mut tmp_name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        std::fs::write(&tmp_path, serialized.as_bytes())
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("failed to rename {} into place", tmp_path.display()))?;

        tracing::debug!(
            path = %self.path.display(),
            entries = self.entries.len(),
            "flushed cache snapshot"
        );
        Ok(())
    }
}
