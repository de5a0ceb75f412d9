//! Interface to the upstream matcher.
//!
//! The matcher compares binaries and reports, per item, an ordered list of byte
//! regions tagged common (identical in every compared item) or variable. Region `i`
//! of one item corresponds to region `i` of every other item compared with it.
//! This crate only consumes that output; [`MatchSnapshot`] is an in-memory,
//! serde-loadable implementation of [`RegionSource`].

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// One annotated region of an item's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ByteRegion {
    /// Bytes identical across every compared item.
    Common {
        offset: u64,
        #[serde(with = "hex_bytes")]
        bytes: Vec<u8>,
        /// Address of the function the bytes belong to.
        function: u64,
        #[serde(default)]
        weight: u32,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        disassembly: Vec<String>,
    },
    /// Bytes that differ across items (addresses, immediates, padding).
    Variable {
        offset: u64,
        /// This item's own bytes for the region.
        #[serde(with = "hex_bytes")]
        bytes: Vec<u8>,
        function: u64,
        /// Shortest length observed across compared items.
        min_len: u32,
        /// Longest length observed; `None` when the matcher saw unbounded variability.
        max_len: Option<u32>,
        /// Per-nibble stability across items (`2 * bytes.len()` entries, high nibble
        /// first). `true` means the nibble is identical in every item.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stable_nibbles: Option<Vec<bool>>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        disassembly: Vec<String>,
    },
}

impl ByteRegion {
    pub fn common(offset: u64, bytes: impl Into<Vec<u8>>, function: u64, weight: u32) -> Self {
        ByteRegion::Common {
            offset,
            bytes: bytes.into(),
            function,
            weight,
            disassembly: Vec::new(),
        }
    }

    pub fn variable(offset: u64, bytes: impl Into<Vec<u8>>, function: u64) -> Self {
        let bytes = bytes.into();
        let len = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
        ByteRegion::Variable {
            offset,
            bytes,
            function,
            min_len: len,
            max_len: Some(len),
            stable_nibbles: None,
            disassembly: Vec::new(),
        }
    }

    /// Fixed-length gap standing in for excluded bytes.
    pub(crate) fn excluded(offset: u64, len: usize, function: u64) -> Self {
        let len = u32::try_from(len).unwrap_or(u32::MAX);
        ByteRegion::Variable {
            offset,
            bytes: Vec::new(),
            function,
            min_len: len,
            max_len: Some(len),
            stable_nibbles: None,
            disassembly: Vec::new(),
        }
    }

    pub fn offset(&self) -> u64 {
        match self {
            ByteRegion::Common { offset, .. } | ByteRegion::Variable { offset, .. } => *offset,
        }
    }

    pub fn function(&self) -> u64 {
        match self {
            ByteRegion::Common { function, .. } | ByteRegion::Variable { function, .. } => {
                *function
            }
        }
    }

    pub fn is_common(&self) -> bool {
        matches!(self, ByteRegion::Common { .. })
    }

    /// Observed `(min, max)` byte length of this region for its item.
    pub fn length_range(&self) -> (u32, Option<u32>) {
        match self {
            ByteRegion::Common { bytes, .. } => {
                let len = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
                (len, Some(len))
            }
            ByteRegion::Variable { min_len, max_len, .. } => (*min_len, *max_len),
        }
    }
}

/// Regions reported for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRegions {
    pub item: String,
    pub regions: Vec<ByteRegion>,
}

/// Similarity of a candidate item to one of the listed items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityScore {
    /// Listed item the score was computed against.
    pub item: String,
    pub candidate: String,
    pub score: f64,
}

/// Read-only view of matcher output used by a generation run.
pub trait RegionSource: Send + Sync {
    fn item_regions(&self, item: &str) -> Option<&ItemRegions>;

    /// Similarity scores in the order the matcher reported them.
    fn similarities(&self) -> &[SimilarityScore];
}

/// Serializable snapshot of matcher output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    #[serde(default)]
    pub items: Vec<ItemRegions>,
    #[serde(default)]
    pub similarities: Vec<SimilarityScore>,
}

impl MatchSnapshot {
    pub fn new(items: Vec<ItemRegions>) -> Self {
        Self { items, similarities: Vec::new() }
    }

    pub fn with_similarity(
        mut self,
        item: impl Into<String>,
        candidate: impl Into<String>,
        score: f64,
    ) -> Self {
        self.similarities.push(SimilarityScore {
            item: item.into(),
            candidate: candidate.into(),
            score,
        });
        self
    }

    /// Load a snapshot from a JSON or YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        crate::util::read_structured(path.as_ref(), "match snapshot")
    }
}

impl RegionSource for MatchSnapshot {
    fn item_regions(&self, item: &str) -> Option<&ItemRegions> {
        self.items.iter().find(|i| i.item == item)
    }

    fn similarities(&self) -> &[SimilarityScore] {
        &self.similarities
    }
}

/// Serde adapter storing byte vectors as lowercase hex strings.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        hex::decode(compact).map_err(serde::de::Error::custom)
    }
}
