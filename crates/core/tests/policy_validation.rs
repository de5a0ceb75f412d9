use siggen_core::policy::{
    load_policy, FunctionFilter, GenerationPolicy, ItemSelection, MetaValue, TrimAlgorithm,
    DEFAULT_MIN_PIECE_LENGTH,
};
use siggen_core::GenerationError;
use tempfile::tempdir;

fn minimal() -> GenerationPolicy {
    GenerationPolicy::new("Win.Trojan.Test", vec!["sample-a".into()])
}

#[test]
fn yaml_policy_gets_documented_defaults() {
    let policy: GenerationPolicy =
        serde_yaml::from_str("detection_name: Win.Trojan.Test\nitems: [sample-a]\n").expect("parse");
    assert_eq!(policy.trim_length, None);
    assert_eq!(policy.trim_algorithm, TrimAlgorithm::None);
    assert_eq!(policy.min_piece_length, DEFAULT_MIN_PIECE_LENGTH);
    assert_eq!(policy.function_filter, FunctionFilter::None);
    assert_eq!(policy.item_selection, ItemSelection::Exact);
    assert!(!policy.disable_nibble_masking);
    assert!(!policy.disable_publication);
    assert_eq!(policy, minimal());
}

#[test]
fn full_policy_parses_every_field() {
    let yaml = r#"
requester: analyst@example.com
created_at: 2024-05-01T12:00:00Z
id: 7f1c
detection_name: Win.Trojan.Agent
items: [sample-a, sample-b]
trim_length: 32
trim_algorithm: weighted_greedy
variant: 3
min_piece_length: 6
tags: [trojan, win32]
metadata:
  - { key: author, value: analyst }
  - { key: score, value: 7 }
  - { key: reviewed, value: true }
item_selection: similar
min_similarity: 0.75
function_filter: blacklist
filtered_functions: [4096, 8192]
disable_nibble_masking: true
disable_publication: true
groups: [nightly]
"#;
    let policy: GenerationPolicy = serde_yaml::from_str(yaml).expect("parse full policy");
    assert_eq!(policy.trim_length, Some(32));
    assert_eq!(policy.trim_algorithm, TrimAlgorithm::WeightedGreedy);
    assert_eq!(policy.item_selection, ItemSelection::Similar);
    assert_eq!(policy.function_filter, FunctionFilter::Blacklist);
    assert_eq!(policy.filtered_functions, vec![4096, 8192]);
    assert_eq!(policy.metadata[0].value, MetaValue::String("analyst".into()));
    assert_eq!(policy.metadata[1].value, MetaValue::Int(7));
    assert_eq!(policy.metadata[2].value, MetaValue::Bool(true));
    assert!(policy.created_at.is_some());
    policy.validate().expect("full policy is valid");
}

#[test]
fn filter_without_addresses_is_invalid() {
    let policy = minimal().with_filter(FunctionFilter::Whitelist, vec![]);
    match policy.validate() {
        Err(GenerationError::InvalidPolicy { field, .. }) => assert_eq!(field, "filtered_functions"),
        other => panic!("expected InvalidPolicy, got {other:?}"),
    }
}

#[test]
fn rejects_malformed_fields() {
    let mut no_items = minimal();
    no_items.items.clear();
    assert!(matches!(no_items.validate(), Err(GenerationError::InvalidPolicy { field: "items", .. })));

    let mut blank_name = minimal();
    blank_name.detection_name = "  ".into();
    assert!(matches!(
        blank_name.validate(),
        Err(GenerationError::InvalidPolicy { field: "detection_name", .. })
    ));

    let negative = minimal().with_similar_items(-0.1);
    assert!(matches!(
        negative.validate(),
        Err(GenerationError::InvalidPolicy { field: "min_similarity", .. })
    ));

    let zero_budget = minimal().with_trim(Some(0), TrimAlgorithm::Last);
    assert!(matches!(
        zero_budget.validate(),
        Err(GenerationError::InvalidPolicy { field: "trim_length", .. })
    ));

    let mut no_floor = minimal();
    no_floor.min_piece_length = 0;
    assert!(no_floor.validate().is_err());
}

#[test]
fn load_policy_reads_json_and_yaml() {
    let dir = tempdir().expect("tempdir");
    let yaml = dir.path().join("policy.yaml");
    let json = dir.path().join("policy.json");
    std::fs::write(&yaml, "detection_name: Yaml.Sig\nitems: [a]\ntrim_length: 16\ntrim_algorithm: last\n")
        .expect("write yaml");
    std::fs::write(&json, r#"{"detection_name":"Json.Sig","items":["b"],"trim_algorithm":"random"}"#)
        .expect("write json");

    let from_yaml = load_policy(&yaml).expect("load yaml");
    assert_eq!(from_yaml.detection_name, "Yaml.Sig");
    assert_eq!(from_yaml.trim_algorithm, TrimAlgorithm::Last);

    let from_json = load_policy(&json).expect("load json");
    assert_eq!(from_json.items, vec!["b".to_string()]);
    assert_eq!(from_json.trim_algorithm, TrimAlgorithm::Random);
}

#[test]
fn load_policy_surfaces_validation_failures() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("bad.yaml");
    std::fs::write(&path, "detection_name: Bad\nitems: [a]\nfunction_filter: blacklist\n").expect("write");

    let err = load_policy(&path).unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("is invalid"), "unexpected error: {message}");
    assert!(message.contains("filtered_functions"), "unexpected error: {message}");
}

#[test]
fn load_policy_fails_for_missing_file() {
    let dir = tempdir().expect("tempdir");
    assert!(load_policy(dir.path().join("missing.yaml")).is_err());
}
