//! Pipeline stages, run in a fixed order by [`assembler::SignatureAssembler`]:
//! selector → builder → trimmer → encoder.

pub mod assembler;
pub mod builder;
pub mod encoder;
pub mod selector;
pub mod trimmer;
