use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{GenerationError, GenerationResult};
use crate::model::{Fragment, Pattern};
use crate::policy::{GenerationPolicy, TrimAlgorithm};

/// Deterministic random source for one trimming run.
///
/// Seeded only from the pattern's content hash and the policy variant, so the same
/// inputs always produce the same trim and runs never share RNG state.
pub struct TrimRng {
    rng: ChaCha8Rng,
}

impl TrimRng {
    pub fn new(content_hash: &[u8; 32], variant: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content_hash);
        hasher.update(variant.to_le_bytes());
        let digest = hasher.finalize();
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&digest[..8]);
        Self { rng: ChaCha8Rng::seed_from_u64(u64::from_le_bytes(seed)) }
    }

    pub fn for_pattern(pattern: &Pattern, variant: u64) -> Self {
        Self::new(&pattern.content_hash(), variant)
    }

    /// Uniform index in `0..len`. `len` must be non-zero.
    pub fn pick(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }
}

/// Re-weighting hook consulted before every greedy removal.
///
/// `position` is the fragment's index in the untrimmed pattern.
pub trait ReweightHook {
    fn reweight(&mut self, fragment: &Fragment, position: usize) -> u32;
}

/// Keeps every fragment's weight as built.
pub struct NoReweight;

impl ReweightHook for NoReweight {
    fn reweight(&mut self, fragment: &Fragment, _position: usize) -> u32 {
        fragment.weight
    }
}

/// Reduces a pattern to a literal byte budget one fragment at a time.
///
/// Fragments shorter than `min_piece_length` are never removed. A removal is only
/// made if the budget stays reachable afterwards, so trimming succeeds whenever
/// some floor-respecting subset fits.
#[derive(Debug, Clone)]
pub struct Trimmer {
    pub budget: Option<usize>,
    pub algorithm: TrimAlgorithm,
    pub min_piece_length: usize,
}

impl Trimmer {
    pub fn new(budget: Option<usize>, algorithm: TrimAlgorithm, min_piece_length: usize) -> Self {
        Self { budget, algorithm, min_piece_length }
    }

    pub fn from_policy(policy: &GenerationPolicy) -> Self {
        Self::new(policy.trim_length, policy.trim_algorithm, policy.min_piece_length)
    }

    pub fn trim(&self, pattern: Pattern, rng: &mut TrimRng) -> GenerationResult<Pattern> {
        self.trim_with_hook(pattern, rng, &mut NoReweight)
    }

    pub fn trim_with_hook(
        &self,
        mut pattern: Pattern,
        rng: &mut TrimRng,
        hook: &mut dyn ReweightHook,
    ) -> GenerationResult<Pattern> {
        let Some(budget) = self.budget else {
            return Ok(pattern);
        };
        let mut total = pattern.total_len();
        if total <= budget {
            return Ok(pattern);
        }

        let floor = self.min_piece_length;
        let over_budget =
            |total| GenerationError::BudgetExceeded { total, budget, algorithm: self.algorithm };
        if self.algorithm == TrimAlgorithm::None {
            warn!(total, budget, "pattern over budget and trimming is disabled");
            return Err(over_budget(total));
        }

        let sub_floor: usize =
            pattern.fragments.iter().map(Fragment::len).filter(|len| *len < floor).sum();
        let Some(shortest) =
            pattern.fragments.iter().map(Fragment::len).filter(|len| *len >= floor).min()
        else {
            warn!(total, budget, floor, "only sub-floor fragments remain");
            return Err(over_budget(total));
        };
        if sub_floor + shortest > budget {
            return Err(GenerationError::TrimExhausted {
                budget,
                floor,
                smallest: sub_floor + shortest,
            });
        }

        let mut origins: Vec<usize> = (0..pattern.len()).collect();
        let weighted_order = weight_order(&pattern.fragments, &origins);

        while total > budget {
            let feasible = feasible_removals(&pattern, floor, sub_floor, budget);
            if feasible.is_empty() {
                return Err(GenerationError::TrimExhausted {
                    budget,
                    floor,
                    smallest: sub_floor + shortest,
                });
            }

            let index = match self.algorithm {
                TrimAlgorithm::None => unreachable!("handled before the loop"),
                TrimAlgorithm::Last => feasible[feasible.len() - 1],
                TrimAlgorithm::First => feasible[0],
                TrimAlgorithm::Random => feasible[rng.pick(feasible.len())],
                TrimAlgorithm::Weighted => weighted_order
                    .iter()
                    .find_map(|origin| {
                        origins
                            .iter()
                            .position(|o| o == origin)
                            .filter(|index| feasible.contains(index))
                    })
                    .unwrap_or(feasible[0]),
                TrimAlgorithm::WeightedGreedy => {
                    for (fragment, origin) in pattern.fragments.iter_mut().zip(&origins) {
                        fragment.weight = hook.reweight(fragment, *origin);
                    }
                    feasible
                        .iter()
                        .copied()
                        .max_by_key(|&index| (pattern.fragments[index].weight, origins[index]))
                        .unwrap_or(feasible[0])
                }
            };

            let removed = pattern.remove(index);
            let origin = origins.remove(index);
            total -= removed.len();
            debug!(
                algorithm = self.algorithm.as_str(),
                origin,
                removed_len = removed.len(),
                weight = removed.weight,
                total,
                "removed fragment"
            );
        }
        Ok(pattern)
    }
}

/// Original positions of every fragment, highest weight first; later
/// positions go first on ties so earlier fragments are retained.
fn weight_order(fragments: &[Fragment], origins: &[usize]) -> Vec<usize> {
    let mut order: Vec<(u32, usize)> =
        fragments.iter().zip(origins).map(|(f, origin)| (f.weight, *origin)).collect();
    order.sort_by(|a, b| b.cmp(a));
    order.into_iter().map(|(_, origin)| origin).collect()
}

/// Current indices whose removal respects the floor and keeps the budget reachable.
fn feasible_removals(pattern: &Pattern, floor: usize, sub_floor: usize, budget: usize) -> Vec<usize> {
    let candidates: Vec<usize> =
        (0..pattern.len()).filter(|&i| pattern.fragments[i].len() >= floor).collect();
    candidates
        .iter()
        .copied()
        .filter(|&index| {
            candidates
                .iter()
                .filter(|&&other| other != index)
                .map(|&other| pattern.fragments[other].len())
                .min()
                .is_some_and(|shortest| sub_floor + shortest <= budget)
        })
        .collect()
}
