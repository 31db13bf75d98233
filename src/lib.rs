//! # case-consolidate
//!
//! Merge every document attached to a case (photos, scans, PDFs) into one
//! page-ordered PDF and publish it as the case's single current artifact.
//!
//! ## Pipeline Overview
//!
//! ```text
//! case
//!  │
//!  ├─ 1. Resolve   documents in merge order, validate selection and size
//!  ├─ 2. Classify  declared type → image │ PDF │ unsupported
//!  ├─ 3. Prepare   decode + fit images, parse PDFs (concurrent, timed)
//!  ├─ 4. Append    one page per image, every page of each PDF, in order
//!  ├─ 5. Finish    page tree, prune, serialise
//!  └─ 6. Publish   write new file → swap registry row → delete old file
//! ```
//!
//! A document that cannot be processed is skipped with a reason; the run
//! fails only if nothing at all could be merged. The previous artifact is
//! retired only after its replacement is committed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use case_consolidate::{
//!     CaseId, ConsolidationConfig, Consolidator, InMemoryRegistry, LocalFileStorage,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(InMemoryRegistry::new());
//!     registry.add_case(CaseId(1));
//!     let storage = Arc::new(LocalFileStorage::new("/var/lib/cases"));
//!
//!     let consolidator = Consolidator::new(
//!         registry.clone(),
//!         registry.clone(),
//!         storage,
//!         ConsolidationConfig::default(),
//!     );
//!     let report = consolidator.consolidate(CaseId(1), None).await?;
//!     println!(
//!         "{} pages, {} skipped → {}",
//!         report.pages_produced,
//!         report.documents_skipped.len(),
//!         report.produced_document.display_name
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `consolidate` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! case-consolidate = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod consolidate;
pub mod error;
pub mod lock;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod publish;
pub mod registry;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConsolidationConfig, ConsolidationConfigBuilder, PageSize, RenderSettings};
pub use consolidate::{CancelToken, Consolidator};
pub use error::{
    ConsolidationError, DocumentError, ErrorKind, PublishStage, RegistryError, StorageError,
};
pub use model::{CaseId, Document, DocumentId, NewDocument};
pub use output::{
    ConsolidationPlan, ConsolidationReport, PlannedDocument, ProcessedDocument, SkippedDocument,
};
pub use pipeline::{classify, DocumentKind};
pub use progress::{ConsolidationProgressCallback, NoopProgressCallback, ProgressCallback};
pub use publish::{artifact_name, Clock};
pub use registry::{CaseDirectory, DocumentRegistry, InMemoryRegistry, PublishedRecord};
pub use storage::{FileStorage, InMemoryStorage, LocalFileStorage, StoragePath};
