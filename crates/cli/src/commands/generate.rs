use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use siggen_core::policy::load_policy;
use siggen_core::regions::MatchSnapshot;
use siggen_core::services::encoder::{Encoder, EncoderLimits};
use siggen_core::{Dialect, EncodedSignature, GenerationPolicy, SignatureAssembler, SignatureBatch};
use tracing::info;

use crate::commands::sink::JsonLinesSink;
use crate::{resolve_input, sha256_file};

/// Inputs of `siggen generate`.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub policies: Vec<String>,
    pub matches: String,
    pub dialect: Dialect,
    pub json: bool,
    pub out: Option<String>,
    pub clamav_max_jump: Option<u32>,
    pub yara_max_jump: Option<u32>,
}

/// A policy that produced no signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyFailure {
    pub policy: String,
    pub detection_name: String,
    pub error: String,
}

/// Everything one `generate` invocation produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateReport {
    pub dialect: Dialect,
    pub matches_sha256: String,
    pub signatures: Vec<EncodedSignature>,
    pub failures: Vec<PolicyFailure>,
}

/// Run the batch without printing anything.
pub fn run_generate(options: &GenerateOptions) -> Result<GenerateReport> {
    let matches_path = resolve_input(&options.matches)?;
    let matches_sha256 = sha256_file(&matches_path)?;
    let snapshot = MatchSnapshot::load(&matches_path)?;
    info!(
        path = %matches_path.display(),
        sha256 = %matches_sha256,
        items = snapshot.items.len(),
        "loaded match snapshot"
    );

    let policies: Vec<GenerationPolicy> = options
        .policies
        .iter()
        .map(|path| resolve_input(path).and_then(load_policy))
        .collect::<Result<_>>()?;

    let defaults = EncoderLimits::default();
    let limits = EncoderLimits {
        clamav_max_jump: options.clamav_max_jump.unwrap_or(defaults.clamav_max_jump),
        yara_max_jump: options.yara_max_jump.unwrap_or(defaults.yara_max_jump),
    };

    let sink = options.out.as_deref().map(JsonLinesSink::open).transpose()?;
    let mut assembler = SignatureAssembler::new(&snapshot).with_encoder(Encoder::new(limits));
    if let Some(sink) = &sink {
        assembler = assembler.with_sink(sink);
    }

    let results = assembler.assemble_batch(&policies, options.dialect);
    let (batch, failed) = SignatureBatch::from_results(results);
    let failures = failed
        .into_iter()
        .map(|(index, err)| PolicyFailure {
            policy: options.policies[index].clone(),
            detection_name: policies[index].detection_name.clone(),
            error: err.to_string(),
        })
        .collect();

    Ok(GenerateReport {
        dialect: options.dialect,
        matches_sha256,
        signatures: batch.signatures,
        failures,
    })
}

/// `siggen generate`: print the signatures, report failures on stderr.
pub fn generate_command(options: &GenerateOptions) -> Result<()> {
    let report = run_generate(options)?;

    if options.json {
        let serialized = serde_json::to_string_pretty(&report)
            .context("Failed to serialize generation report to JSON")?;
        println!("{}", serialized);
    } else {
        for signature in &report.signatures {
            let text = signature.body.text();
            println!("{}", text.trim_end());
        }
    }

    for failure in &report.failures {
        eprintln!("{} ({}): {}", failure.detection_name, failure.policy, failure.error);
    }

    if report.failures.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(
            "{} of {} policies failed",
            report.failures.len(),
            report.failures.len() + report.signatures.len()
        ))
    }
}
