//! siggen-core
//!
//! Core library turning matched byte regions into scan-engine detection signatures.
//!
//! This crate defines the pattern model, the generation policy, the interface to the
//! upstream matcher, and the selection → building → trimming → encoding pipeline
//! that produces ClamAV, YARA or dialect-neutral signatures.
//!
//! All substantive logic lives here so it is fully testable and reusable from
//! multiple frontends (CLI, services, batch jobs).

pub mod error;
pub mod model;
pub mod policy;
pub mod regions;
pub mod schema;
pub mod services;
pub mod util;

pub use error::{GenerationError, GenerationResult};
pub use model::{Fragment, Pattern, Qualifier};
pub use policy::GenerationPolicy;
pub use services::assembler::{EncodedSignature, SignatureAssembler, SignatureBatch, SignatureSink};
pub use services::encoder::{Dialect, SignatureBody};

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
