use tracing::{debug, warn};

use crate::error::{GenerationError, GenerationResult};
use crate::model::{Fragment, Pattern, Qualifier};
use crate::policy::GenerationPolicy;
use crate::regions::ByteRegion;
use crate::services::selector::SelectedItem;

/// Converts selected items' annotated regions into a [`Pattern`].
///
/// The first selected item supplies byte content; the remaining items only widen
/// the gap ranges. Region `i` must line up across all items.
#[derive(Debug, Clone)]
pub struct PatternBuilder {
    pub mask_nibbles: bool,
    pub min_piece_length: usize,
}

/// Masked bytes waiting for a run to attach to.
#[derive(Debug, Default)]
struct PendingMasked {
    bytes: Vec<u8>,
    mask: Vec<usize>,
    disassembly: Vec<String>,
}

#[derive(Debug, Default)]
struct Segment {
    fragments: Vec<Fragment>,
}

impl Segment {
    fn literal_len(&self) -> usize {
        self.fragments.iter().map(Fragment::len).sum()
    }

    /// Fold a gap into the trailing qualifier of the last fragment. Leading gaps vanish.
    fn extend_gap(&mut self, gap: Qualifier) {
        if let Some(last) = self.fragments.last_mut() {
            last.qualifier = last.qualifier.merge(0, &gap);
        }
    }
}

impl PatternBuilder {
    pub fn new(mask_nibbles: bool, min_piece_length: usize) -> Self {
        Self { mask_nibbles, min_piece_length }
    }

    pub fn from_policy(policy: &GenerationPolicy) -> Self {
        Self::new(!policy.disable_nibble_masking, policy.min_piece_length)
    }

    pub fn build(&self, items: &[SelectedItem]) -> GenerationResult<Pattern> {
        let reference = items
            .first()
            .ok_or_else(|| GenerationError::InsufficientData("no items selected".into()))?;
        check_alignment(items)?;

        let mut segments: Vec<Segment> = Vec::new();
        let mut segment = Segment::default();
        let mut open: Option<Fragment> = None;
        let mut pending: Option<PendingMasked> = None;

        for (index, region) in reference.regions.iter().enumerate() {
            match region {
                ByteRegion::Common { bytes, weight, disassembly, .. } => {
                    // A run crossing functions stays whole and keeps the rarest weight.
                    if let Some(run) = open.as_mut() {
                        run.weight = run.weight.min(*weight);
                        run.bytes.extend_from_slice(bytes);
                        run.disassembly.extend(disassembly.iter().cloned());
                        continue;
                    }
                    let mut fragment = Fragment::new(Vec::new()).with_weight(*weight);
                    if let Some(prefix) = pending.take() {
                        fragment.bytes = prefix.bytes;
                        fragment.nibble_mask.extend(prefix.mask);
                        fragment.disassembly = prefix.disassembly;
                    }
                    fragment.bytes.extend_from_slice(bytes);
                    fragment.disassembly.extend(disassembly.iter().cloned());
                    open = Some(fragment);
                }
                ByteRegion::Variable { bytes, stable_nibbles, disassembly, .. } => {
                    let gap = gap_across_items(items, index);
                    if let Some(unstable) =
                        self.maskable(bytes, stable_nibbles.as_deref(), gap)
                    {
                        match open.as_mut() {
                            Some(run) => {
                                let base = run.bytes.len() * 2;
                                run.bytes.extend_from_slice(bytes);
                                run.nibble_mask.extend(unstable.iter().map(|n| base + n));
                                run.disassembly.extend(disassembly.iter().cloned());
                            }
                            None => {
                                let prefix = pending.get_or_insert_with(PendingMasked::default);
                                let base = prefix.bytes.len() * 2;
                                prefix.bytes.extend_from_slice(bytes);
                                prefix.mask.extend(unstable.iter().map(|n| base + n));
                                prefix.disassembly.extend(disassembly.iter().cloned());
                            }
                        }
                        continue;
                    }
                    // Zero-width gaps (empty excluded regions) do not break a run.
                    if gap.is_none() {
                        continue;
                    }

                    if let Some(prefix) = pending.take() {
                        segment.extend_gap(Qualifier::exact(len_u32(prefix.bytes.len())));
                    }
                    if let Some(run) = open.take() {
                        segment.fragments.push(run.with_qualifier(gap));
                    } else {
                        segment.extend_gap(gap);
                    }
                    if gap.is_unbounded() && !segment.fragments.is_empty() {
                        segments.push(std::mem::take(&mut segment));
                    }
                }
            }
        }

        segment.fragments.extend(open.take());
        if let Some(prefix) = pending.take() {
            segment.extend_gap(Qualifier::exact(len_u32(prefix.bytes.len())));
        }
        if !segment.fragments.is_empty() {
            segments.push(segment);
        }

        let mut pattern = self.pick_segment(segments);
        // Only an unbounded tail constrains a match; a bounded one is dropped.
        if let Some(last) = pattern.fragments.last_mut() {
            if !last.qualifier.is_unbounded() {
                last.qualifier = Qualifier::NONE;
            }
        }
        if pattern.is_empty() {
            return Err(GenerationError::InsufficientData(format!(
                "item '{}' has no common bytes to build a pattern from",
                reference.item
            )));
        }
        if pattern.fragments.iter().all(|f| f.len() < self.min_piece_length) {
            return Err(GenerationError::InsufficientData(format!(
                "all {} fragments are shorter than the {}-byte minimum piece length",
                pattern.len(),
                self.min_piece_length
            )));
        }
        pattern.validate()?;
        debug!(
            fragments = pattern.len(),
            literal_bytes = pattern.total_len(),
            masked_nibbles = pattern.fragments.iter().map(|f| f.nibble_mask.len()).sum::<usize>(),
            "built pattern"
        );
        Ok(pattern)
    }

    /// Unstable nibble offsets when a variable region can be kept as masked literal
    /// bytes rather than a gap: masking on, fixed length in every item, and at least
    /// one nibble stable.
    fn maskable(
        &self,
        bytes: &[u8],
        stable: Option<&[bool]>,
        gap: Qualifier,
    ) -> Option<Vec<usize>> {
        if !self.mask_nibbles || bytes.is_empty() {
            return None;
        }
        let stable = stable?;
        if stable.len() != bytes.len() * 2 || gap != Qualifier::exact(len_u32(bytes.len())) {
            return None;
        }
        if !stable.iter().any(|s| *s) {
            return None;
        }
        Some(stable.iter().enumerate().filter(|(_, s)| !**s).map(|(i, _)| i).collect())
    }

    /// Keep the segment with the most literal bytes; earlier wins on ties.
    fn pick_segment(&self, segments: Vec<Segment>) -> Pattern {
        let total = segments.len();
        let mut best: Option<Segment> = None;
        for segment in segments {
            let better = match &best {
                Some(current) => segment.literal_len() > current.literal_len(),
                None => true,
            };
            if better {
                best = Some(segment);
            }
        }
        if total > 1 {
            warn!(
                segments = total,
                "interior unbounded gaps split the pattern; keeping the largest segment"
            );
        }
        Pattern::new(best.map(|s| s.fragments).unwrap_or_default())
    }
}

fn len_u32(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// Every item must report the same number of regions, and a region common in the
/// reference must be common everywhere.
fn check_alignment(items: &[SelectedItem]) -> GenerationResult<()> {
    let reference = &items[0];
    for other in &items[1..] {
        if other.regions.len() != reference.regions.len() {
            return Err(GenerationError::InsufficientData(format!(
                "item '{}' reports {} regions but reference item '{}' reports {}",
                other.item,
                other.regions.len(),
                reference.item,
                reference.regions.len()
            )));
        }
        for (index, (ours, theirs)) in reference.regions.iter().zip(&other.regions).enumerate() {
            if ours.is_common() && !theirs.is_common() {
                return Err(GenerationError::InsufficientData(format!(
                    "region {index} at offset {:#x} is common in '{}' but variable in '{}'",
                    ours.offset(),
                    reference.item,
                    other.item
                )));
            }
        }
    }
    Ok(())
}

/// Shortest and longest length of region `index` across all items.
fn gap_across_items(items: &[SelectedItem], index: usize) -> Qualifier {
    let mut min = u32::MAX;
    let mut max = Some(0u32);
    for item in items {
        let (lo, hi) = item.regions[index].length_range();
        min = min.min(lo);
        max = match (max, hi) {
            (Some(a), Some(b)) => Some(a.max(b)),
            _ => None,
        };
    }
    Qualifier { min, max }
}
