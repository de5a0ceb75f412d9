//! Pattern Model: the in-memory signature body shared by every pipeline stage.
//!
//! A [`Pattern`] is an ordered list of [`Fragment`]s. Each fragment holds literal
//! bytes, an optional nibble mask over those bytes, and a trailing [`Qualifier`]
//! describing how many arbitrary bytes may sit between it and the next fragment.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{GenerationError, GenerationResult};

/// Byte-count range of the wildcard gap following a fragment.
///
/// `max == None` is the unbounded sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Qualifier {
    pub min: u32,
    pub max: Option<u32>,
}

impl Qualifier {
    /// Direct concatenation: no gap at all.
    pub const NONE: Qualifier = Qualifier { min: 0, max: Some(0) };

    /// Any number of bytes, including zero.
    pub const UNBOUNDED: Qualifier = Qualifier { min: 0, max: None };

    pub fn exact(len: u32) -> Self {
        Self { min: len, max: Some(len) }
    }

    pub fn range(min: u32, max: u32) -> Self {
        Self { min, max: Some(max) }
    }

    pub fn at_least(min: u32) -> Self {
        Self { min, max: None }
    }

    pub fn is_none(&self) -> bool {
        self.min == 0 && self.max == Some(0)
    }

    pub fn is_unbounded(&self) -> bool {
        self.max.is_none()
    }

    /// Whether `min <= max` (always true for unbounded ranges).
    pub fn is_well_formed(&self) -> bool {
        self.max.map_or(true, |max| self.min <= max)
    }

    /// Gap that results from deleting a `removed_len`-byte fragment sitting between
    /// this gap and `next`.
    pub fn merge(&self, removed_len: usize, next: &Qualifier) -> Qualifier {
        let len = u32::try_from(removed_len).unwrap_or(u32::MAX);
        let min = self.min.saturating_add(len).saturating_add(next.min);
        let max = match (self.max, next.max) {
            (Some(a), Some(b)) => Some(a.saturating_add(len).saturating_add(b)),
            _ => None,
        };
        Qualifier { min, max }
    }
}

impl Default for Qualifier {
    fn default() -> Self {
        Qualifier::NONE
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "{{{},{}}}", self.min, max),
            None => write!(f, "{{{},-1}}", self.min),
        }
    }
}

/// A contiguous run of literal bytes bounded by wildcard gaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    #[serde(with = "crate::regions::hex_bytes")]
    pub bytes: Vec<u8>,
    #[serde(default)]
    pub qualifier: Qualifier,
    /// Rarity of the originating function; lower is rarer and more valuable.
    #[serde(default)]
    pub weight: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disassembly: Vec<String>,
    /// Nibble positions treated as wildcards. Nibble `2*i` is the high half of
    /// `bytes[i]`, `2*i + 1` the low half.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub nibble_mask: BTreeSet<usize>,
}

impl Fragment {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            qualifier: Qualifier::NONE,
            weight: 0,
            disassembly: Vec::new(),
            nibble_mask: BTreeSet::new(),
        }
    }

    pub fn with_qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifier = qualifier;
        self
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_mask(mut self, nibbles: impl IntoIterator<Item = usize>) -> Self {
        self.nibble_mask.extend(nibbles);
        self
    }

    pub fn with_disassembly(mut self, lines: impl IntoIterator<Item = String>) -> Self {
        self.disassembly.extend(lines);
        self
    }

    /// Literal length used for budgets and the minimum piece floor.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_masked(&self, nibble: usize) -> bool {
        self.nibble_mask.contains(&nibble)
    }

    pub fn has_mask(&self) -> bool {
        !self.nibble_mask.is_empty()
    }

    /// Value of nibble `index` (high nibble first), ignoring the mask.
    pub fn nibble(&self, index: usize) -> u8 {
        let byte = self.bytes[index / 2];
        if index % 2 == 0 {
            byte >> 4
        } else {
            byte & 0x0f
        }
    }

    fn check(&self, position: usize) -> GenerationResult<()> {
        if self.bytes.is_empty() {
            return Err(GenerationError::InsufficientData(format!(
                "fragment {position} has no bytes"
            )));
        }
        if !self.qualifier.is_well_formed() {
            return Err(GenerationError::InsufficientData(format!(
                "fragment {position} has qualifier {} with min above max",
                self.qualifier
            )));
        }
        if let Some(&nibble) = self.nibble_mask.iter().find(|&&n| n >= 2 * self.bytes.len()) {
            return Err(GenerationError::InsufficientData(format!(
                "fragment {position} masks nibble {nibble} outside its {} bytes",
                self.bytes.len()
            )));
        }
        Ok(())
    }
}

/// Ordered sequence of fragments forming one candidate signature body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub fragments: Vec<Fragment>,
}

impl Pattern {
    pub fn new(fragments: Vec<Fragment>) -> Self {
        Self { fragments }
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Sum of literal fragment lengths.
    pub fn total_len(&self) -> usize {
        self.fragments.iter().map(Fragment::len).sum()
    }

    /// Check the structural fragment invariants (non-empty bytes, ordered bounds,
    /// in-range nibble indices) and that the pattern itself is non-empty.
    pub fn validate(&self) -> GenerationResult<()> {
        if self.fragments.is_empty() {
            return Err(GenerationError::InsufficientData("pattern has no fragments".into()));
        }
        for (position, fragment) in self.fragments.iter().enumerate() {
            fragment.check(position)?;
        }
        Ok(())
    }

    /// Index of the first non-final fragment carrying an unbounded qualifier.
    pub fn interior_unbounded(&self) -> Option<usize> {
        let last = self.fragments.len().checked_sub(1)?;
        self.fragments[..last].iter().position(|f| f.qualifier.is_unbounded())
    }

    /// Remove fragment `index`, folding its bytes and trailing gap into the
    /// previous fragment's qualifier. Removing the first fragment drops its gap.
    pub fn remove(&mut self, index: usize) -> Fragment {
        let removed = self.fragments.remove(index);
        if index > 0 {
            let prev = &mut self.fragments[index - 1];
            prev.qualifier = prev.qualifier.merge(removed.len(), &removed.qualifier);
        }
        removed
    }

    /// SHA-256 over a canonical encoding of every fragment's bytes, gap and mask.
    pub fn content_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for fragment in &self.fragments {
            hasher.update((fragment.bytes.len() as u64).to_le_bytes());
            hasher.update(&fragment.bytes);
            hasher.update(fragment.qualifier.min.to_le_bytes());
            match fragment.qualifier.max {
                Some(max) => {
                    hasher.update([1u8]);
                    hasher.update(max.to_le_bytes());
                }
                None => hasher.update([0u8]),
            }
            hasher.update((fragment.nibble_mask.len() as u64).to_le_bytes());
            for nibble in &fragment.nibble_mask {
                hasher.update((*nibble as u64).to_le_bytes());
            }
        }
        hasher.finalize().into()
    }
}
