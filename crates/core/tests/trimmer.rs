use siggen_core::model::{Fragment, Pattern, Qualifier};
use siggen_core::policy::TrimAlgorithm;
use siggen_core::services::trimmer::{ReweightHook, TrimRng, Trimmer};
use siggen_core::GenerationError;

fn frag(bytes: &[u8], weight: u32) -> Fragment {
    Fragment::new(bytes.to_vec()).with_weight(weight)
}

fn sized(fill: u8, len: usize, weight: u32) -> Fragment {
    frag(&vec![fill; len], weight)
}

fn trim(pattern: Pattern, budget: usize, algorithm: TrimAlgorithm, floor: usize) -> Result<Pattern, GenerationError> {
    let mut rng = TrimRng::for_pattern(&pattern, 0);
    Trimmer::new(Some(budget), algorithm, floor).trim(pattern, &mut rng)
}

#[test]
fn weighted_drops_heaviest_first_fragment_and_its_gap() {
    let pattern = Pattern::new(vec![
        frag(&[0xaa, 0xbb], 5).with_qualifier(Qualifier::exact(2)),
        frag(&[0xcc, 0xdd], 1).with_qualifier(Qualifier::UNBOUNDED),
        frag(&[0xee, 0xff], 3),
    ]);

    let trimmed = trim(pattern, 4, TrimAlgorithm::Weighted, 2).expect("trim");
    assert_eq!(trimmed.len(), 2);
    assert_eq!(trimmed.fragments[0].bytes, vec![0xcc, 0xdd]);
    assert_eq!(trimmed.fragments[0].qualifier, Qualifier::UNBOUNDED);
    assert_eq!(trimmed.fragments[1].bytes, vec![0xee, 0xff]);
    assert_eq!(trimmed.total_len(), 4);
}

#[test]
fn last_folds_removed_bytes_into_previous_gap() {
    let pattern = Pattern::new(vec![
        sized(0xa, 4, 1).with_qualifier(Qualifier::exact(1)),
        sized(0xb, 4, 1).with_qualifier(Qualifier::exact(1)),
        sized(0xc, 4, 1),
    ]);
    let trimmed = trim(pattern, 8, TrimAlgorithm::Last, 4).expect("trim");
    assert_eq!(trimmed.len(), 2);
    assert_eq!(trimmed.fragments[1].bytes, vec![0xb; 4]);
    assert_eq!(trimmed.fragments[1].qualifier, Qualifier::exact(5));
}

#[test]
fn first_skips_removals_that_make_the_budget_unreachable() {
    let pattern = Pattern::new(vec![sized(0xa, 4, 1), sized(0xb, 20, 1)]);
    let trimmed = trim(pattern, 10, TrimAlgorithm::First, 4).expect("trim");
    assert_eq!(trimmed.len(), 1);
    assert_eq!(trimmed.fragments[0].bytes, vec![0xa; 4]);
}

#[test]
fn sub_floor_fragments_are_never_removed() {
    let pattern = Pattern::new(vec![sized(0x5, 2, 100), sized(0xa, 4, 1), sized(0xb, 4, 2)]);
    let trimmed = trim(pattern, 6, TrimAlgorithm::Weighted, 4).expect("trim");
    let lengths: Vec<usize> = trimmed.fragments.iter().map(Fragment::len).collect();
    assert_eq!(lengths, vec![2, 4]);
    assert_eq!(trimmed.fragments[1].bytes, vec![0xa; 4]);
}

#[test]
fn unreachable_budget_reports_smallest_achievable_total() {
    let pattern = Pattern::new(vec![sized(0x5, 2, 1), sized(0xa, 6, 1)]);
    let err = trim(pattern, 5, TrimAlgorithm::First, 4).unwrap_err();
    assert_eq!(err, GenerationError::TrimExhausted { budget: 5, floor: 4, smallest: 8 });
}

#[test]
fn only_sub_floor_fragments_exceed_budget() {
    let pattern = Pattern::new(vec![sized(0x1, 2, 1), sized(0x2, 3, 1)]);
    let err = trim(pattern, 4, TrimAlgorithm::Weighted, 4).unwrap_err();
    assert!(matches!(err, GenerationError::BudgetExceeded { total: 5, budget: 4, .. }));
}

#[test]
fn disabled_trimming_keeps_or_rejects() {
    let pattern = Pattern::new(vec![sized(0x1, 4, 1), sized(0x2, 4, 1)]);
    let err = trim(pattern.clone(), 4, TrimAlgorithm::None, 4).unwrap_err();
    assert_eq!(
        err,
        GenerationError::BudgetExceeded { total: 8, budget: 4, algorithm: TrimAlgorithm::None }
    );

    let mut rng = TrimRng::for_pattern(&pattern, 0);
    let untouched = Trimmer::new(None, TrimAlgorithm::Last, 4).trim(pattern.clone(), &mut rng).expect("trim");
    assert_eq!(untouched, pattern);

    let within = trim(pattern.clone(), 8, TrimAlgorithm::None, 4).expect("trim");
    assert_eq!(within, pattern);
}

struct PreferEarly;

impl ReweightHook for PreferEarly {
    fn reweight(&mut self, _fragment: &Fragment, position: usize) -> u32 {
        100 - position as u32
    }
}

#[test]
fn greedy_consults_reweight_hook() {
    let pattern = Pattern::new(vec![sized(0xa, 4, 1), sized(0xb, 4, 2), sized(0xc, 4, 3)]);

    let weighted = trim(pattern.clone(), 8, TrimAlgorithm::Weighted, 4).expect("trim");
    assert_eq!(weighted.fragments.last().map(|f| f.bytes[0]), Some(0xb));

    let greedy_plain = trim(pattern.clone(), 8, TrimAlgorithm::WeightedGreedy, 4).expect("trim");
    assert_eq!(greedy_plain.fragments[0].bytes, weighted.fragments[0].bytes);
    assert_eq!(greedy_plain.fragments[1].bytes, weighted.fragments[1].bytes);

    let mut rng = TrimRng::for_pattern(&pattern, 0);
    let hooked = Trimmer::new(Some(8), TrimAlgorithm::WeightedGreedy, 4)
        .trim_with_hook(pattern, &mut rng, &mut PreferEarly)
        .expect("trim");
    assert_eq!(hooked.fragments[0].bytes, vec![0xb; 4]);
    assert_eq!(hooked.fragments[1].bytes, vec![0xc; 4]);
}

fn twelve() -> Pattern {
    Pattern::new((0..12u8).map(|i| sized(i, 4, 1).with_qualifier(Qualifier::exact(1))).collect())
}

#[test]
fn random_is_reproducible_per_variant() {
    let run = |variant: u64| {
        let pattern = twelve();
        let mut rng = TrimRng::for_pattern(&pattern, variant);
        Trimmer::new(Some(24), TrimAlgorithm::Random, 4).trim(pattern, &mut rng).expect("trim")
    };

    assert_eq!(run(7), run(7));
    assert_eq!(run(7).total_len(), 24);

    let mut distinct: Vec<Pattern> = Vec::new();
    for variant in 0..16 {
        let trimmed = run(variant);
        if !distinct.contains(&trimmed) {
            distinct.push(trimmed);
        }
    }
    assert!(distinct.len() >= 2, "variants should produce different trims");
}

#[test]
fn every_algorithm_lands_within_budget() {
    for algorithm in [
        TrimAlgorithm::Last,
        TrimAlgorithm::First,
        TrimAlgorithm::Random,
        TrimAlgorithm::Weighted,
        TrimAlgorithm::WeightedGreedy,
    ] {
        let trimmed = trim(twelve(), 17, algorithm, 4).expect("trim");
        assert!(trimmed.total_len() <= 17, "{algorithm:?} left {} bytes", trimmed.total_len());
        assert!(trimmed.total_len() >= 4);
    }
}

#[test]
fn weighted_passes_over_heavy_fragment_whose_removal_cannot_fit() {
    let pattern = Pattern::new(vec![
        sized(0xa, 4, 9).with_qualifier(Qualifier::exact(1)),
        sized(0xb, 12, 5).with_qualifier(Qualifier::exact(1)),
        sized(0xc, 12, 1),
    ]);

    for algorithm in [TrimAlgorithm::Weighted, TrimAlgorithm::WeightedGreedy] {
        let trimmed = trim(pattern.clone(), 6, algorithm, 4).expect("trim");
        assert_eq!(trimmed.len(), 1, "{algorithm:?}");
        assert_eq!(trimmed.fragments[0].bytes, vec![0xa; 4]);
        assert_eq!(trimmed.fragments[0].weight, 9);
        assert_eq!(trimmed.total_len(), 4);

        for removed in pattern.fragments.iter().filter(|f| trimmed.fragments.iter().all(|k| k.bytes != f.bytes)) {
            for kept in &trimmed.fragments {
                assert!(
                    !(kept.weight > removed.weight && kept.len() >= removed.len()),
                    "{algorithm:?} removed weight {} but kept heavier weight {}",
                    removed.weight,
                    kept.weight
                );
            }
        }
    }
}
