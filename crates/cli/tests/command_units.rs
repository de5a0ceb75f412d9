use std::fs;
use std::path::PathBuf;

use siggen::commands::{
    dialect_infos, policy_summary, run_generate, GenerateOptions, JsonLinesSink, SinkRecord,
};
use siggen::{resolve_input, sha256_file};
use siggen_core::policy::{FunctionFilter, TrimAlgorithm};
use siggen_core::{Dialect, GenerationPolicy, SignatureAssembler, SignatureSink};
use siggen_core::regions::MatchSnapshot;
use tempfile::tempdir;

fn fixture(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
        .display()
        .to_string()
}

fn options(policies: &[&str], dialect: Dialect) -> GenerateOptions {
    GenerateOptions {
        policies: policies.iter().map(|p| fixture(p)).collect(),
        matches: fixture("matches.json"),
        dialect,
        json: false,
        out: None,
        clamav_max_jump: None,
        yara_max_jump: None,
    }
}

#[test]
fn run_generate_collects_failures_by_policy() {
    let report =
        run_generate(&options(&["missing_item.yaml", "trimmed.yaml"], Dialect::ClamAv)).expect("run");
    assert_eq!(report.signatures.len(), 1);
    assert_eq!(
        report.signatures[0].body.text(),
        "Win.Trojan.Agent-1:0:*:554889e5{4-6}e810000000{5}"
    );
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].detection_name, "Test.Missing");
    assert!(report.failures[0].policy.ends_with("missing_item.yaml"));
    assert!(report.failures[0].error.contains("sample-z"), "{}", report.failures[0].error);
}

#[test]
fn run_generate_fails_fast_on_unloadable_policy() {
    let err = run_generate(&options(&["generic.yaml", "invalid.yaml"], Dialect::Yara)).unwrap_err();
    assert!(format!("{err:#}").contains("filtered_functions"));
}

#[test]
fn yara_jump_override_applies() {
    let mut opts = options(&["generic.yaml"], Dialect::Yara);
    opts.yara_max_jump = Some(5);
    let report = run_generate(&opts).expect("run");
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].error.contains("exceeds the yara maximum of 5 bytes"));
}

#[test]
fn json_lines_sink_appends_records() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("out.jsonl");
    let snapshot = MatchSnapshot::load(fixture("matches.json")).expect("snapshot");
    let policy = GenerationPolicy::new("Test.Sink", vec!["sample-a".into()])
        .with_trim(Some(9), TrimAlgorithm::Last);

    {
        let sink = JsonLinesSink::open(&path).expect("open sink");
        assert_eq!(sink.path(), path.as_path());
        let assembler = SignatureAssembler::new(&snapshot).with_sink(&sink);
        assembler.assemble(&policy, Dialect::Generic).expect("first");
        assembler.assemble(&policy, Dialect::ClamAv).expect("second");
    }
    let reopened = JsonLinesSink::open(&path).expect("reopen");
    let signature =
        SignatureAssembler::new(&snapshot).assemble(&policy, Dialect::Yara).expect("third");
    reopened.publish(&signature).expect("publish");

    let lines: Vec<SinkRecord> = fs::read_to_string(&path)
        .expect("read")
        .lines()
        .map(|line| serde_json::from_str(line).expect("record"))
        .collect();
    let ids: Vec<u32> = lines.iter().map(|r| r.variant_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(lines[0].text, "554889e5{4,4}e810000000{5,5}");
    assert_eq!(lines[1].signature.policy, policy);
}

#[test]
fn policy_summary_describes_effective_settings() {
    let mut policy = GenerationPolicy::new("Test.Summary", vec!["a".into(), "b".into()])
        .with_filter(FunctionFilter::Whitelist, vec![0x1000, 0x2a00]);
    policy.disable_nibble_masking = true;

    let lines = policy_summary(&policy);
    assert!(lines.contains(&"Items: a, b".to_string()));
    assert!(lines.contains(&"Trim: unbounded".to_string()));
    assert!(lines.contains(&"Function filter: whitelist [0x1000, 0x2a00]".to_string()));
    assert!(lines.contains(&"Nibble masking: disabled".to_string()));
    assert!(lines.contains(&"Publication: enabled".to_string()));
    assert!(!lines.iter().any(|l| l.starts_with("Tags")));
}

#[test]
fn dialect_infos_follow_variant_table() {
    let infos = dialect_infos().expect("infos");
    let names: Vec<&str> = infos.iter().map(|i| i.name).collect();
    assert_eq!(names, vec!["generic", "clamav", "yara"]);
    assert_eq!(infos[1].max_jump, Some(65_535));
}

#[test]
fn input_helpers() {
    let dir = tempdir().expect("tempdir");
    let file = dir.path().join("data.bin");
    fs::write(&file, b"abc").expect("write");

    let resolved = resolve_input(file.to_str().expect("utf-8 path")).expect("resolve");
    assert_eq!(resolved, file);
    assert_eq!(
        sha256_file(&file).expect("hash"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );

    let err = resolve_input(dir.path().join("absent").to_str().expect("utf-8")).unwrap_err();
    assert!(err.to_string().contains("Input file does not exist"));
    assert!(resolve_input(dir.path().to_str().expect("utf-8")).is_err());
}
