use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use siggen_core::{EncodedSignature, SignatureSink};

/// One line of a JSON-lines signature file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkRecord {
    pub variant_id: u32,
    pub text: String,
    pub signature: EncodedSignature,
}

/// Appends every published signature to a file, one JSON object per line.
pub struct JsonLinesSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open signature output {}", path.display()))?;
        Ok(Self { path, writer: Mutex::new(BufWriter::new(file)) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SignatureSink for JsonLinesSink {
    fn publish(&self, signature: &EncodedSignature) -> Result<()> {
        let record = SinkRecord {
            variant_id: signature.body.variant_id(),
            text: signature.body.text(),
            signature: signature.clone(),
        };
        let line = serde_json::to_string(&record).context("Failed to serialize signature")?;

        let mut writer =
            self.writer.lock().map_err(|_| anyhow!("Signature output writer is poisoned"))?;
        writeln!(writer, "{line}")
            .and_then(|_| writer.flush())
            .with_context(|| format!("Failed to write signature to {}", self.path.display()))?;
        Ok(())
    }
}
