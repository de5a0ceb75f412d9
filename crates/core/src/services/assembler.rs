use anyhow::Result;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span};

use crate::error::{GenerationError, GenerationResult};
use crate::model::Pattern;
use crate::policy::GenerationPolicy;
use crate::regions::RegionSource;
use crate::services::builder::PatternBuilder;
use crate::services::encoder::{Dialect, Encoder, SignatureBody};
use crate::services::selector::select_items;
use crate::services::trimmer::{NoReweight, ReweightHook, TrimRng, Trimmer};

/// Finished signature paired with the policy that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedSignature {
    pub body: SignatureBody,
    pub policy: GenerationPolicy,
}

/// Ordered collection of independently valid signatures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignatureBatch {
    pub signatures: Vec<EncodedSignature>,
}

impl SignatureBatch {
    /// Split per-policy results into a batch of successes (request order kept)
    /// and the failures with their request index.
    pub fn from_results(
        results: Vec<GenerationResult<EncodedSignature>>,
    ) -> (Self, Vec<(usize, GenerationError)>) {
        let mut signatures = Vec::new();
        let mut failures = Vec::new();
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(signature) => signatures.push(signature),
                Err(err) => failures.push((index, err)),
            }
        }
        (Self { signatures }, failures)
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

/// Downstream store for finished signatures (upload, database, file).
///
/// A batch publishes after every policy has run, in request order.
pub trait SignatureSink: Send + Sync {
    fn publish(&self, signature: &EncodedSignature) -> Result<()>;
}

/// Runs selection, building, trimming and encoding for generation policies.
pub struct SignatureAssembler<'a> {
    pub source: &'a dyn RegionSource,
    pub encoder: Encoder,
    pub sink: Option<&'a dyn SignatureSink>,
}

impl<'a> SignatureAssembler<'a> {
    pub fn new(source: &'a dyn RegionSource) -> Self {
        Self { source, encoder: Encoder::default(), sink: None }
    }

    pub fn with_encoder(mut self, encoder: Encoder) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_sink(mut self, sink: &'a dyn SignatureSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Selected, built and trimmed pattern for `policy`, before encoding.
    pub fn pattern(
        &self,
        policy: &GenerationPolicy,
        hook: &mut dyn ReweightHook,
    ) -> GenerationResult<Pattern> {
        policy.validate()?;
        let items = select_items(policy, self.source)?;
        debug!(items = items.len(), "selected items");

        let pattern = PatternBuilder::from_policy(policy).build(&items)?;
        let mut rng = TrimRng::for_pattern(&pattern, policy.variant);
        let trimmed = Trimmer::from_policy(policy).trim_with_hook(pattern, &mut rng, hook)?;
        debug!(
            fragments = trimmed.len(),
            literal_bytes = trimmed.total_len(),
            algorithm = policy.trim_algorithm.as_str(),
            "trimmed pattern"
        );
        Ok(trimmed)
    }

    pub fn assemble(
        &self,
        policy: &GenerationPolicy,
        dialect: Dialect,
    ) -> GenerationResult<EncodedSignature> {
        self.assemble_with_hook(policy, dialect, &mut NoReweight)
    }

    /// Full run for one policy. The first failing stage aborts the run; nothing is
    /// published unless every stage succeeded.
    pub fn assemble_with_hook(
        &self,
        policy: &GenerationPolicy,
        dialect: Dialect,
        hook: &mut dyn ReweightHook,
    ) -> GenerationResult<EncodedSignature> {
        let signature = self.generate(policy, dialect, hook)?;
        self.publish(&signature)?;
        Ok(signature)
    }

    /// Run many policies in parallel. Results line up with `policies`, and the
    /// sink receives the successes in that same order once all runs finish.
    pub fn assemble_batch(
        &self,
        policies: &[GenerationPolicy],
        dialect: Dialect,
    ) -> Vec<GenerationResult<EncodedSignature>> {
        let generated: Vec<_> = policies
            .par_iter()
            .map(|policy| self.generate(policy, dialect, &mut NoReweight))
            .collect();
        generated
            .into_iter()
            .map(|result| -> GenerationResult<EncodedSignature> {
                let signature = result?;
                self.publish(&signature)?;
                Ok(signature)
            })
            .collect()
    }

    fn generate(
        &self,
        policy: &GenerationPolicy,
        dialect: Dialect,
        hook: &mut dyn ReweightHook,
    ) -> GenerationResult<EncodedSignature> {
        let _span = info_span!("generate", detection = %policy.detection_name, %dialect).entered();

        let pattern = self.pattern(policy, hook)?;
        let body = self.encoder.encode(&pattern, dialect, policy)?;
        info!(fragments = pattern.len(), literal_bytes = pattern.total_len(), "signature generated");
        Ok(EncodedSignature { body, policy: policy.clone() })
    }

    fn publish(&self, signature: &EncodedSignature) -> GenerationResult<()> {
        if signature.policy.disable_publication {
            return Ok(());
        }
        if let Some(sink) = self.sink {
            sink.publish(signature).map_err(|e| GenerationError::Publication(format!("{e:#}")))?;
            debug!(detection = %signature.policy.detection_name, "signature published");
        }
        Ok(())
    }
}
