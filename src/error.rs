//! Error types for the case-consolidate library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ConsolidationError`] is **fatal**: the run cannot produce or publish an
//!   artifact at all (unknown case, empty selection, every document failed,
//!   the registry swap failed, another run holds the case). Returned as
//!   `Err(ConsolidationError)` from [`crate::Consolidator`] entry points.
//!
//! * [`DocumentError`] is **non-fatal**: a single document could not be
//!   decoded or spliced, but every other document is fine. Stored inside
//!   [`crate::output::SkippedDocument`] so callers see partial success
//!   ("7 of 9 merged, 2 skipped") instead of losing the whole case to one
//!   bad upload.
//!
//! Collaborator failures have their own types, [`RegistryError`] and
//! [`StorageError`], so that registry and storage implementations do not need
//! to know anything about consolidation.

use crate::model::{CaseId, DocumentId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// All fatal errors returned by the consolidation engine.
///
/// Document-level failures use [`DocumentError`] and are stored in the
/// report's skip list rather than propagated here.
#[derive(Debug, Error)]
pub enum ConsolidationError {
    // ── Validation errors ─────────────────────────────────────────────────
    /// The case id does not refer to a known case.
    #[error("Case {case_id} does not exist")]
    CaseNotFound { case_id: CaseId },

    /// The explicit document selection is empty or references documents that
    /// cannot be used (unknown, duplicated, or owned by another case).
    #[error("Invalid document selection for case {case_id}: {reason}")]
    InvalidSelection { case_id: CaseId, reason: String },

    /// The resolved input set is empty; there is nothing to consolidate.
    #[error("Nothing to process: case {case_id} has no consolidatable documents")]
    NothingToProcess { case_id: CaseId },

    /// The sum of the inputs' declared sizes exceeds the configured ceiling.
    #[error("Input for case {case_id} is {total_bytes} bytes, above the {limit_bytes}-byte limit")]
    InputTooLarge {
        case_id: CaseId,
        total_bytes: u64,
        limit_bytes: u64,
    },

    /// A single-document operation named a document the registry lacks.
    #[error("Document {document_id} does not exist")]
    DocumentNotFound { document_id: DocumentId },

    /// A rename asked for a blank display name.
    #[error("Document {document_id} cannot be renamed to a blank name")]
    BlankDisplayName { document_id: DocumentId },

    // ── Run errors ────────────────────────────────────────────────────────
    /// Every input document failed; output would be empty. No artifact was
    /// published and any previous artifact is untouched.
    #[error("All {attempted} documents of case {case_id} failed.\nFirst error: {first_error}")]
    NoProcessableDocuments {
        case_id: CaseId,
        attempted: usize,
        first_error: String,
    },

    /// Another consolidation of the same case is in flight.
    #[error("A consolidation of case {case_id} is already in progress")]
    ConsolidationInProgress { case_id: CaseId },

    /// The caller cancelled the run before the artifact was published.
    #[error("Consolidation of case {case_id} was cancelled")]
    Cancelled { case_id: CaseId },

    // ── Publish errors ────────────────────────────────────────────────────
    /// Writing the artifact or swapping the registry record failed after a
    /// successful merge. The merged bytes were discarded.
    #[error("Publishing the artifact for case {case_id} failed while {stage}: {detail}")]
    Publish {
        case_id: CaseId,
        stage: PublishStage,
        detail: String,
    },

    // ── Collaborator errors ───────────────────────────────────────────────
    /// The document registry could not be read or updated.
    #[error("Document registry error: {0}")]
    Registry(#[from] RegistryError),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`ConsolidationError`].
///
/// Callers (an HTTP layer, a job runner) usually only need to know which
/// bucket an error falls into to pick a status code or a retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Bad caller input; no side effects happened.
    Validation,
    /// Every document failed; no artifact change.
    NoProcessableDocuments,
    /// Merge succeeded but persisting it did not; no artifact change.
    Publish,
    /// Another run holds the case; retry later.
    ConcurrencyConflict,
    /// The caller cancelled; no artifact change.
    Cancelled,
    /// Collaborator or internal failure.
    Internal,
}

impl ConsolidationError {
    /// Map this error onto its [`ErrorKind`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConsolidationError::CaseNotFound { .. }
            | ConsolidationError::InvalidSelection { .. }
            | ConsolidationError::NothingToProcess { .. }
            | ConsolidationError::InputTooLarge { .. }
            | ConsolidationError::DocumentNotFound { .. }
            | ConsolidationError::BlankDisplayName { .. } => ErrorKind::Validation,
            ConsolidationError::NoProcessableDocuments { .. } => ErrorKind::NoProcessableDocuments,
            ConsolidationError::ConsolidationInProgress { .. } => ErrorKind::ConcurrencyConflict,
            ConsolidationError::Cancelled { .. } => ErrorKind::Cancelled,
            ConsolidationError::Publish { .. } => ErrorKind::Publish,
            ConsolidationError::Registry(_)
            | ConsolidationError::InvalidConfig(_)
            | ConsolidationError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// The publish step that failed, carried by [`ConsolidationError::Publish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublishStage {
    /// Writing the artifact bytes to storage.
    WriteArtifact,
    /// Committing the new consolidated record.
    RegisterArtifact,
}

impl fmt::Display for PublishStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishStage::WriteArtifact => f.write_str("writing the artifact"),
            PublishStage::RegisterArtifact => f.write_str("registering the artifact"),
        }
    }
}

/// A non-fatal error for a single document.
///
/// Stored alongside [`crate::output::SkippedDocument`] when a document is
/// skipped. The run continues unless ALL documents fail.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum DocumentError {
    /// The declared type is neither a supported image nor a PDF.
    #[error("unsupported document type '{declared_type}'")]
    Unsupported { declared_type: String },

    /// The stored bytes could not be read.
    #[error("could not read stored file: {detail}")]
    Read { detail: String },

    /// The image bytes are corrupt or in an unrecognised format.
    #[error("image decode failed: {detail}")]
    Decode { detail: String },

    /// The image decoded to zero width or height.
    #[error("image has no area ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    /// The image uses a colour model the renderer cannot place on a page.
    #[error("unsupported colour model: {color}")]
    UnsupportedColorModel { color: String },

    /// Re-encoding the decoded image failed.
    #[error("image re-encode failed: {detail}")]
    Encode { detail: String },

    /// The PDF structure could not be parsed.
    #[error("malformed PDF: {detail}")]
    MalformedPdf { detail: String },

    /// The PDF is encrypted.
    #[error("PDF is encrypted")]
    EncryptedPdf,

    /// The PDF parsed but has no pages.
    #[error("PDF has no pages")]
    EmptyPdf,

    /// Processing exceeded the per-document timeout.
    #[error("processing timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// Errors raised by a [`crate::registry::DocumentRegistry`] implementation.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No document with this id exists.
    #[error("document {0} not found")]
    NotFound(DocumentId),

    /// The record was rejected at the registry boundary.
    #[error("invalid document record: {0}")]
    Invalid(String),

    /// The backing store failed or is unavailable.
    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by a [`crate::storage::FileStorage`] implementation.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A file with this name already exists; writes never overwrite.
    #[error("file '{0}' already exists")]
    AlreadyExists(String),

    /// No file at this path.
    #[error("file '{0}' not found")]
    NotFound(String),

    /// The name cannot be used as a storage name.
    #[error("invalid file name '{0}'")]
    InvalidName(String),

    /// Underlying I/O failure.
    #[error("storage I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
