//! Generation policy: the caller-supplied record that drives one generation run.
//!
//! Policies are immutable inputs. The pipeline reads them, validates them up front,
//! and echoes them back unmodified on the finished signature. Bookkeeping fields
//! (requester, creation time, id, groups) are carried but never interpreted.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GenerationError, GenerationResult};

/// Default floor for fragment length, in bytes.
pub const DEFAULT_MIN_PIECE_LENGTH: usize = 4;

fn default_min_piece_length() -> usize {
    DEFAULT_MIN_PIECE_LENGTH
}

/// Strategy used to bring a pattern under its length budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrimAlgorithm {
    /// Never remove anything; report when over budget.
    #[default]
    None,
    Last,
    First,
    /// Seeded from the pattern content and the policy variant.
    Random,
    /// Highest weight first, ordered once up front.
    Weighted,
    /// Highest weight first, re-evaluated after every removal.
    WeightedGreedy,
}

impl TrimAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrimAlgorithm::None => "none",
            TrimAlgorithm::Last => "last",
            TrimAlgorithm::First => "first",
            TrimAlgorithm::Random => "random",
            TrimAlgorithm::Weighted => "weighted",
            TrimAlgorithm::WeightedGreedy => "weighted_greedy",
        }
    }
}

/// How the listed items expand into the set of contributing items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSelection {
    #[default]
    Exact,
    Similar,
}

/// Function address filter applied to the first selected item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionFilter {
    #[default]
    None,
    Blacklist,
    Whitelist,
}

/// Typed metadata value rendered into rule metadata blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: MetaValue,
}

impl MetadataEntry {
    pub fn new(key: impl Into<String>, value: MetaValue) -> Self {
        Self { key: key.into(), value }
    }
}

/// Caller-supplied record describing what signature to generate and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationPolicy {
    #[serde(default)]
    pub requester: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub id: Option<String>,
    pub detection_name: String,
    /// Source item identifiers; the first one receives the function filter.
    pub items: Vec<String>,
    /// Literal byte budget; `None` means no limit.
    #[serde(default)]
    pub trim_length: Option<usize>,
    #[serde(default)]
    pub trim_algorithm: TrimAlgorithm,
    /// Seed for randomized trimming; different variants give different trims.
    #[serde(default)]
    pub variant: u64,
    #[serde(default = "default_min_piece_length")]
    pub min_piece_length: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<MetadataEntry>,
    #[serde(default)]
    pub item_selection: ItemSelection,
    #[serde(default)]
    pub min_similarity: f64,
    #[serde(default)]
    pub function_filter: FunctionFilter,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filtered_functions: Vec<u64>,
    #[serde(default)]
    pub disable_nibble_masking: bool,
    #[serde(default)]
    pub disable_publication: bool,
    /// Signature-group tags, passed through untouched.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

impl GenerationPolicy {
    /// Policy with every optional field at its default.
    pub fn new(detection_name: impl Into<String>, items: Vec<String>) -> Self {
        Self {
            requester: None,
            created_at: None,
            id: None,
            detection_name: detection_name.into(),
            items,
            trim_length: None,
            trim_algorithm: TrimAlgorithm::None,
            variant: 0,
            min_piece_length: DEFAULT_MIN_PIECE_LENGTH,
            tags: Vec::new(),
            metadata: Vec::new(),
            item_selection: ItemSelection::Exact,
            min_similarity: 0.0,
            function_filter: FunctionFilter::None,
            filtered_functions: Vec::new(),
            disable_nibble_masking: false,
            disable_publication: false,
            groups: Vec::new(),
        }
    }

    pub fn with_trim(mut self, budget: Option<usize>, algorithm: TrimAlgorithm) -> Self {
        self.trim_length = budget;
        self.trim_algorithm = algorithm;
        self
    }

    pub fn with_filter(mut self, mode: FunctionFilter, addresses: Vec<u64>) -> Self {
        self.function_filter = mode;
        self.filtered_functions = addresses;
        self
    }

    pub fn with_similar_items(mut self, min_similarity: f64) -> Self {
        self.item_selection = ItemSelection::Similar;
        self.min_similarity = min_similarity;
        self
    }

    /// Reject malformed selection, filter and trimming configuration.
    pub fn validate(&self) -> GenerationResult<()> {
        if self.detection_name.trim().is_empty() {
            return Err(GenerationError::invalid_policy("detection_name", "must not be blank"));
        }
        if self.items.is_empty() {
            return Err(GenerationError::invalid_policy("items", "at least one item is required"));
        }
        if let Some(blank) = self.items.iter().position(|i| i.trim().is_empty()) {
            return Err(GenerationError::invalid_policy(
                "items",
                format!("item {blank} has a blank identifier"),
            ));
        }
        if self.min_piece_length == 0 {
            return Err(GenerationError::invalid_policy("min_piece_length", "must be at least 1"));
        }
        if self.trim_length == Some(0) {
            return Err(GenerationError::invalid_policy(
                "trim_length",
                "a zero budget can never be met; omit it for no limit",
            ));
        }
        if !self.min_similarity.is_finite() || self.min_similarity < 0.0 {
            return Err(GenerationError::invalid_policy(
                "min_similarity",
                format!("must be a finite score >= 0, got {}", self.min_similarity),
            ));
        }
        if self.function_filter != FunctionFilter::None && self.filtered_functions.is_empty() {
            return Err(GenerationError::invalid_policy(
                "filtered_functions",
                format!("{:?} filter requires at least one function address", self.function_filter),
            ));
        }
        Ok(())
    }
}

/// Load a policy from YAML or JSON and validate it.
pub fn load_policy(path: impl AsRef<Path>) -> Result<GenerationPolicy> {
    let path = path.as_ref();
    let policy: GenerationPolicy = crate::util::read_structured(path, "generation policy")?;
    policy.validate().with_context(|| format!("Policy at {} is invalid", path.display()))?;
    Ok(policy)
}
