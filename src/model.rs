//! Strongly-typed document records.
//!
//! Every document that flows through the engine is a [`Document`]: a fixed
//! record, never a loosely-typed map. Unknown fields are rejected when a
//! record is deserialised, and [`NewDocument::validate`] runs at the registry
//! boundary before anything is stored.

use crate::storage::StoragePath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Surrogate identity of a [`Document`]. Unique within a registry.
///
/// Ordering follows registration order, which breaks `order_index` ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the parent case (service order) that owns documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(pub u64);

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One uploaded or generated file belonging to exactly one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Document {
    pub id: DocumentId,
    pub case_id: CaseId,
    /// User-facing filename.
    pub display_name: String,
    /// Opaque handle to the stored bytes.
    pub storage_path: StoragePath,
    pub byte_size: u64,
    /// File extension or content type as declared at upload time.
    pub declared_type: String,
    /// Merge position within the case. Not unique; ties fall back to `id`.
    pub order_index: i64,
    /// `true` for the merged artifact produced by a consolidation run.
    pub is_consolidated_output: bool,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Sort key for the default merge order: `order_index`, then identity.
    pub fn merge_order_key(&self) -> (i64, DocumentId) {
        (self.order_index, self.id)
    }
}

/// Fields of a document about to be registered. The registry assigns the id
/// and creation timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewDocument {
    pub case_id: CaseId,
    pub display_name: String,
    pub storage_path: StoragePath,
    pub byte_size: u64,
    pub declared_type: String,
    #[serde(default)]
    pub order_index: i64,
    #[serde(default)]
    pub is_consolidated_output: bool,
}

impl NewDocument {
    /// Check the record before it is stored.
    pub fn validate(&self) -> Result<(), String> {
        if self.display_name.trim().is_empty() {
            return Err("display name must not be empty".into());
        }
        if self.storage_path.as_str().is_empty() {
            return Err("storage path must not be empty".into());
        }
        if self.declared_type.trim().is_empty() {
            return Err("declared type must not be empty".into());
        }
        Ok(())
    }

    /// Materialise the stored record.
    pub fn into_document(self, id: DocumentId, created_at: DateTime<Utc>) -> Document {
        Document {
            id,
            case_id: self.case_id,
            display_name: self.display_name,
            storage_path: self.storage_path,
            byte_size: self.byte_size,
            declared_type: self.declared_type,
            order_index: self.order_index,
            is_consolidated_output: self.is_consolidated_output,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_doc() -> NewDocument {
        NewDocument {
            case_id: CaseId(1),
            display_name: "scan.jpg".into(),
            storage_path: StoragePath::new("scan.jpg"),
            byte_size: 10,
            declared_type: "jpg".into(),
            order_index: 0,
            is_consolidated_output: false,
        }
    }

    #[test]
    fn validate_rejects_blank_name() {
        let mut d = new_doc();
        d.display_name = "  ".into();
        assert!(d.validate().is_err());
        assert!(new_doc().validate().is_ok());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let json = r#"{
            "case_id": 1, "display_name": "a.pdf", "storage_path": "a.pdf",
            "byte_size": 3, "declared_type": "pdf", "colour": "blue"
        }"#;
        assert!(serde_json::from_str::<NewDocument>(json).is_err());
    }

    #[test]
    fn merge_order_breaks_ties_by_id() {
        let now = Utc::now();
        let a = new_doc().into_document(DocumentId(5), now);
        let b = new_doc().into_document(DocumentId(2), now);
        let mut docs = [a, b];
        docs.sort_by_key(Document::merge_order_key);
        assert_eq!(docs[0].id, DocumentId(2));
    }
}
