use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::{GenerationError, GenerationResult};
use crate::policy::{FunctionFilter, GenerationPolicy, ItemSelection};
use crate::regions::{ByteRegion, RegionSource};

/// An item chosen to contribute bytes, with its (possibly filtered) regions.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedItem {
    pub item: String,
    pub regions: Vec<ByteRegion>,
    /// Best similarity to a listed item; `None` for listed items themselves.
    pub similarity: Option<f64>,
}

/// Resolve which item identifiers participate, in order.
///
/// Listed items come first (duplicates collapsed). In similar mode, candidates
/// scoring at least `min_similarity` against any listed item follow, highest score
/// first; ties go to the candidate whose originating listed item was listed earlier.
pub fn select_item_ids(
    policy: &GenerationPolicy,
    source: &dyn RegionSource,
) -> Vec<(String, Option<f64>)> {
    let mut listed: Vec<&str> = Vec::with_capacity(policy.items.len());
    for item in &policy.items {
        if !listed.contains(&item.as_str()) {
            listed.push(item);
        }
    }

    let mut selected: Vec<(String, Option<f64>)> =
        listed.iter().map(|item| (item.to_string(), None)).collect();
    if policy.item_selection == ItemSelection::Exact {
        return selected;
    }

    // candidate -> (score, originating listed index, report order)
    let mut best: HashMap<&str, (f64, usize, usize)> = HashMap::new();
    for (order, score) in source.similarities().iter().enumerate() {
        if !score.score.is_finite() || score.score < policy.min_similarity {
            continue;
        }
        let Some(origin) = listed.iter().position(|l| *l == score.item) else {
            continue;
        };
        if listed.contains(&score.candidate.as_str()) {
            continue;
        }
        let entry = (score.score, origin, order);
        best.entry(score.candidate.as_str())
            .and_modify(|current| {
                if ranks_before(&entry, current) {
                    *current = entry;
                }
            })
            .or_insert(entry);
    }

    let mut candidates: Vec<(&str, (f64, usize, usize))> = best.into_iter().collect();
    candidates.sort_by(|a, b| {
        b.1 .0
            .total_cmp(&a.1 .0)
            .then(a.1 .1.cmp(&b.1 .1))
            .then(a.1 .2.cmp(&b.1 .2))
    });
    debug!(listed = listed.len(), similar = candidates.len(), "selected similar items");
    selected.extend(candidates.into_iter().map(|(item, (score, _, _))| (item.to_string(), Some(score))));
    selected
}

fn ranks_before(a: &(f64, usize, usize), b: &(f64, usize, usize)) -> bool {
    a.0 > b.0 || (a.0 == b.0 && (a.1, a.2) < (b.1, b.2))
}

/// Select items and fetch their regions, applying the function filter to the first.
pub fn select_items(
    policy: &GenerationPolicy,
    source: &dyn RegionSource,
) -> GenerationResult<Vec<SelectedItem>> {
    if policy.function_filter != FunctionFilter::None && policy.filtered_functions.is_empty() {
        return Err(GenerationError::invalid_policy(
            "filtered_functions",
            format!("{:?} filter requires at least one function address", policy.function_filter),
        ));
    }

    let mut selected = Vec::new();
    for (item, similarity) in select_item_ids(policy, source) {
        let regions = source
            .item_regions(&item)
            .ok_or_else(|| {
                GenerationError::InsufficientData(format!("no regions reported for item '{item}'"))
            })?
            .regions
            .clone();
        selected.push(SelectedItem { item, regions, similarity });
    }

    if let Some(first) = selected.first_mut() {
        first.regions =
            apply_function_filter(policy.function_filter, &policy.filtered_functions, &first.regions);
    }
    Ok(selected)
}

/// Replace common regions rejected by the filter with fixed-length gaps.
///
/// Variable regions are wildcards already and pass through unchanged.
pub fn apply_function_filter(
    mode: FunctionFilter,
    addresses: &[u64],
    regions: &[ByteRegion],
) -> Vec<ByteRegion> {
    let filtered: HashSet<u64> = addresses.iter().copied().collect();
    let keep = |function: u64| match mode {
        FunctionFilter::None => true,
        FunctionFilter::Blacklist => !filtered.contains(&function),
        FunctionFilter::Whitelist => filtered.contains(&function),
    };

    let mut excluded = 0usize;
    let out = regions
        .iter()
        .map(|region| match region {
            ByteRegion::Common { offset, bytes, function, .. } if !keep(*function) => {
                excluded += 1;
                ByteRegion::excluded(*offset, bytes.len(), *function)
            }
            other => other.clone(),
        })
        .collect();
    if excluded > 0 {
        debug!(?mode, excluded, "function filter excluded regions");
    }
    out
}
