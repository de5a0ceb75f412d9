//! Stable identifiers for persisted record fields and signature variants.
//!
//! Stored policies and signatures outlive the code that wrote them, so an
//! identifier, once assigned, belongs to its field forever. Removing a field
//! retires its identifier; it is never handed out again. The built-in tables are
//! append-only and checked at startup by [`verify_builtin_registries`].

use thiserror::Error;

/// Whether an identifier is still in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldStatus {
    Active,
    Retired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEntry {
    pub id: u32,
    pub name: &'static str,
    pub status: FieldStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("{record}: identifier {id} is already assigned to '{existing}'")]
    IdTaken { record: &'static str, id: u32, existing: &'static str },

    #[error("{record}: identifier {id} was retired from '{existing}' and cannot be reused")]
    IdRetired { record: &'static str, id: u32, existing: &'static str },

    #[error("{record}: field name '{name}' already has identifier {id}")]
    NameTaken { record: &'static str, name: &'static str, id: u32 },

    #[error("{record}: identifier {id} is not assigned")]
    Unknown { record: &'static str, id: u32 },

    #[error("{record}: identifier 0 is reserved")]
    ZeroId { record: &'static str },
}

/// Append-only identifier table for one record type.
#[derive(Debug, Clone)]
pub struct FieldRegistry {
    record: &'static str,
    entries: Vec<FieldEntry>,
}

impl FieldRegistry {
    pub fn new(record: &'static str) -> Self {
        Self { record, entries: Vec::new() }
    }

    /// Build a registry from a static table, rejecting duplicates.
    pub fn from_table(
        record: &'static str,
        table: &[(u32, &'static str, FieldStatus)],
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new(record);
        for &(id, name, status) in table {
            registry.assign(id, name)?;
            if status == FieldStatus::Retired {
                registry.retire(id)?;
            }
        }
        Ok(registry)
    }

    pub fn record(&self) -> &'static str {
        self.record
    }

    /// Assign `id` to `name`. Fails if either was ever assigned, retired included.
    pub fn assign(&mut self, id: u32, name: &'static str) -> Result<(), RegistryError> {
        if id == 0 {
            return Err(RegistryError::ZeroId { record: self.record });
        }
        if let Some(existing) = self.entries.iter().find(|e| e.id == id) {
            return Err(match existing.status {
                FieldStatus::Active => {
                    RegistryError::IdTaken { record: self.record, id, existing: existing.name }
                }
                FieldStatus::Retired => {
                    RegistryError::IdRetired { record: self.record, id, existing: existing.name }
                }
            });
        }
        if let Some(existing) = self.entries.iter().find(|e| e.name == name) {
            return Err(RegistryError::NameTaken { record: self.record, name, id: existing.id });
        }
        self.entries.push(FieldEntry { id, name, status: FieldStatus::Active });
        Ok(())
    }

    /// Mark `id` retired. Retiring twice is a no-op.
    pub fn retire(&mut self, id: u32) -> Result<(), RegistryError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(RegistryError::Unknown { record: self.record, id })?;
        entry.status = FieldStatus::Retired;
        Ok(())
    }

    pub fn id_of(&self, name: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|e| e.name == name && e.status == FieldStatus::Active)
            .map(|e| e.id)
    }

    pub fn entries(&self) -> &[FieldEntry] {
        &self.entries
    }

    /// Highest identifier ever assigned; new fields must use a larger one.
    pub fn high_water_mark(&self) -> u32 {
        self.entries.iter().map(|e| e.id).max().unwrap_or(0)
    }
}

/// Identifiers for `GenerationPolicy` fields. Append only.
pub const POLICY_FIELDS: &[(u32, &str, FieldStatus)] = &[
    (1, "requester", FieldStatus::Active),
    (2, "created_at", FieldStatus::Active),
    (3, "id", FieldStatus::Active),
    (4, "detection_name", FieldStatus::Active),
    (5, "items", FieldStatus::Active),
    (6, "trim_length", FieldStatus::Active),
    (7, "trim_algorithm", FieldStatus::Active),
    (8, "variant", FieldStatus::Active),
    (9, "min_piece_length", FieldStatus::Active),
    (10, "tags", FieldStatus::Active),
    (11, "metadata", FieldStatus::Active),
    (12, "item_selection", FieldStatus::Active),
    (13, "min_similarity", FieldStatus::Active),
    (14, "function_filter", FieldStatus::Active),
    (15, "filtered_functions", FieldStatus::Active),
    (16, "disable_nibble_masking", FieldStatus::Active),
    (17, "disable_publication", FieldStatus::Active),
    (18, "groups", FieldStatus::Active),
];

/// Identifiers for `SignatureBody` variants. Append only.
pub const SIGNATURE_VARIANTS: &[(u32, &str, FieldStatus)] = &[
    (1, "generic", FieldStatus::Active),
    (2, "clamav", FieldStatus::Active),
    (3, "yara", FieldStatus::Active),
];

pub fn policy_registry() -> Result<FieldRegistry, RegistryError> {
    FieldRegistry::from_table("GenerationPolicy", POLICY_FIELDS)
}

pub fn signature_registry() -> Result<FieldRegistry, RegistryError> {
    FieldRegistry::from_table("SignatureBody", SIGNATURE_VARIANTS)
}

/// Startup check that the built-in tables never reuse an identifier or name.
pub fn verify_builtin_registries() -> Result<(), RegistryError> {
    policy_registry()?;
    signature_registry()?;
    Ok(())
}
