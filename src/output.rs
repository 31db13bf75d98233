//! Result types returned by the consolidation engine.
//!
//! [`ConsolidationReport`] is what a successful run hands back: the new
//! artifact's registry row plus a per-document account of what happened.
//! Partial success is still success; skipped documents and their reasons are
//! listed rather than turned into an error.

use crate::error::DocumentError;
use crate::model::{CaseId, Document, DocumentId};
use crate::pipeline::DocumentKind;
use serde::{Deserialize, Serialize};

/// Outcome of a successful consolidation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationReport {
    pub case_id: CaseId,

    /// The registry row of the freshly published artifact.
    pub produced_document: Document,

    /// Total pages in the artifact.
    pub pages_produced: usize,

    /// Number of input documents that contributed at least one page.
    pub documents_processed: usize,

    /// Inputs that were skipped, in input order.
    pub documents_skipped: Vec<SkippedDocument>,

    /// Inputs that contributed pages, in input order.
    pub processed: Vec<ProcessedDocument>,

    /// Previous consolidated documents removed by this publish.
    pub retired_documents: Vec<DocumentId>,

    /// Previous consolidated documents the registry failed to remove. They
    /// stay registered with their files intact until [`crate::Consolidator::repair`].
    #[serde(default)]
    pub unretired_documents: Vec<DocumentId>,

    /// Size of the artifact in bytes.
    pub byte_length: usize,

    /// Wall-clock time of the whole run, publish included.
    pub duration_ms: u64,
}

impl ConsolidationReport {
    /// Number of inputs attempted.
    pub fn documents_attempted(&self) -> usize {
        self.documents_processed + self.documents_skipped.len()
    }

    /// `true` if every input contributed pages.
    pub fn is_complete(&self) -> bool {
        self.documents_skipped.is_empty()
    }
}

/// A document that could not be merged, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedDocument {
    pub document_id: DocumentId,
    pub display_name: String,
    pub reason: DocumentError,
}

/// A document that contributed pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedDocument {
    pub document_id: DocumentId,
    pub kind: DocumentKind,
    pub pages: usize,
}

/// Dry-run view of a consolidation: the resolved input set, in merge order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationPlan {
    pub case_id: CaseId,
    pub documents: Vec<PlannedDocument>,
    /// Sum of declared byte sizes.
    pub total_bytes: u64,
    /// The configured ceiling `total_bytes` is checked against.
    pub limit_bytes: u64,
}

impl ConsolidationPlan {
    /// Documents the classifier will route to a renderer or the splicer.
    pub fn supported(&self) -> impl Iterator<Item = &PlannedDocument> {
        self.documents
            .iter()
            .filter(|d| d.kind != DocumentKind::Unsupported)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedDocument {
    pub document_id: DocumentId,
    pub display_name: String,
    pub declared_type: String,
    pub kind: DocumentKind,
    pub byte_size: u64,
}
