//! The consolidation orchestrator.
//!
//! [`Consolidator::consolidate`] is the engine's one real entry point:
//!
//! ```text
//! lock case ─▶ resolve inputs ─▶ size ceiling ─▶ prepare (concurrent, timed)
//!                                                   │
//!       publish ◀─ finish PDF ◀─ append in input order (skip failures)
//! ```
//!
//! Documents are read and decoded ahead of time, up to `concurrency` at once,
//! but pages are appended strictly in input order, so the artifact's page
//! sequence depends only on the resolved input list. A document that cannot
//! be read, decoded, or parsed is recorded as skipped and the run continues.

use crate::config::{ConsolidationConfig, RenderSettings};
use crate::error::{ConsolidationError, DocumentError, RegistryError};
use crate::lock::{CaseLockGuard, CaseLocks};
use crate::model::{CaseId, Document, DocumentId};
use crate::output::{
    ConsolidationPlan, ConsolidationReport, PlannedDocument, ProcessedDocument, SkippedDocument,
};
use crate::pipeline::render::{render_image_as_page, RenderedPage};
use crate::pipeline::splice::{append_source, load_source, SourcePdf};
use crate::pipeline::{classify, DocumentKind, OutputDocument};
use crate::publish::{system_clock, ArtifactPublisher, Clock};
use crate::registry::{CaseDirectory, DocumentRegistry};
use crate::storage::FileStorage;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Cooperative cancellation flag shared between a caller and a run.
///
/// Checked between documents and once more right before publishing. Once
/// publishing has started the run completes regardless.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A document made ready on the blocking pool, waiting for its turn.
enum Prepared {
    Image(RenderedPage),
    Pdf(SourcePdf),
}

/// The merged document plus the per-document account.
struct Merged {
    bytes: Vec<u8>,
    pages: usize,
    processed: Vec<ProcessedDocument>,
    skipped: Vec<SkippedDocument>,
}

/// Consolidates the documents of a case into one published PDF.
///
/// Cheap to share behind an `Arc`; all state is in the collaborators and the
/// per-case lock set.
pub struct Consolidator {
    registry: Arc<dyn DocumentRegistry>,
    cases: Arc<dyn CaseDirectory>,
    storage: Arc<dyn FileStorage>,
    config: ConsolidationConfig,
    locks: CaseLocks,
    publisher: ArtifactPublisher,
}

impl Consolidator {
    pub fn new(
        registry: Arc<dyn DocumentRegistry>,
        cases: Arc<dyn CaseDirectory>,
        storage: Arc<dyn FileStorage>,
        config: ConsolidationConfig,
    ) -> Self {
        let publisher = ArtifactPublisher::new(
            Arc::clone(&registry),
            Arc::clone(&storage),
            config.artifact_prefix.clone(),
            system_clock(),
        );
        Self {
            registry,
            cases,
            storage,
            config,
            locks: CaseLocks::new(),
            publisher,
        }
    }

    /// Replace the clock used for artifact names.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.publisher = ArtifactPublisher::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.storage),
            self.config.artifact_prefix.clone(),
            clock,
        );
        self
    }

    pub fn config(&self) -> &ConsolidationConfig {
        &self.config
    }

    // ── Consolidation ────────────────────────────────────────────────────

    /// Merge a case's documents into one PDF and publish it as the case's
    /// consolidated artifact.
    ///
    /// With `document_ids`, exactly those documents are used in that order
    /// (consolidated outputs among them are ignored). Without, every
    /// non-consolidated document of the case is used, ordered by
    /// `order_index` and then id.
    ///
    /// # Errors
    /// Validation errors happen before anything is read. After that the only
    /// failures are [`ConsolidationError::NoProcessableDocuments`],
    /// [`ConsolidationError::Publish`], and cancellation; in every error case
    /// the registry's current artifact is unchanged.
    pub async fn consolidate(
        &self,
        case_id: CaseId,
        document_ids: Option<&[DocumentId]>,
    ) -> Result<ConsolidationReport, ConsolidationError> {
        self.consolidate_with_cancel(case_id, document_ids, &CancelToken::new())
            .await
    }

    /// [`Self::consolidate`] with a cancellation token.
    pub async fn consolidate_with_cancel(
        &self,
        case_id: CaseId,
        document_ids: Option<&[DocumentId]>,
        cancel: &CancelToken,
    ) -> Result<ConsolidationReport, ConsolidationError> {
        let start = Instant::now();
        let guard = self.lock(case_id)?;
        info!("Starting consolidation of case {}", case_id);

        let inputs = self.resolve_inputs(case_id, document_ids).await?;
        self.check_ceiling(case_id, &inputs)?;
        debug!("Resolved {} input documents for case {}", inputs.len(), case_id);

        let merged = self.merge(case_id, &inputs, cancel).await?;

        if cancel.is_cancelled() {
            info!("Consolidation of case {} cancelled before publish", case_id);
            return Err(ConsolidationError::Cancelled { case_id });
        }

        let byte_length = merged.bytes.len();
        let record = self.publish_detached(case_id, merged.bytes, guard).await?;

        let report = ConsolidationReport {
            case_id,
            produced_document: record.document,
            pages_produced: merged.pages,
            documents_processed: merged.processed.len(),
            documents_skipped: merged.skipped,
            processed: merged.processed,
            retired_documents: record.retired.iter().map(|d| d.id).collect(),
            unretired_documents: record.unretired.iter().map(|d| d.id).collect(),
            byte_length,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Consolidated case {}: {} pages from {}/{} documents, {} bytes, {}ms",
            case_id,
            report.pages_produced,
            report.documents_processed,
            report.documents_attempted(),
            report.byte_length,
            report.duration_ms
        );
        Ok(report)
    }

    /// Run the publisher on its own task so that dropping the caller's
    /// future cannot interrupt the registry swap halfway. The case lock moves
    /// with it and is released only when publishing is over.
    async fn publish_detached(
        &self,
        case_id: CaseId,
        bytes: Vec<u8>,
        guard: CaseLockGuard,
    ) -> Result<crate::registry::PublishedRecord, ConsolidationError> {
        let publisher = self.publisher.clone();
        let task = tokio::spawn(async move {
            let result = publisher.publish(case_id, &bytes).await;
            debug!("Releasing case {} after publish", guard.case_id());
            drop(guard);
            result
        });
        task.await
            .map_err(|e| ConsolidationError::Internal(format!("publish task failed: {e}")))?
    }

    fn lock(&self, case_id: CaseId) -> Result<CaseLockGuard, ConsolidationError> {
        self.locks.try_acquire(case_id).ok_or_else(|| {
            warn!("Rejecting consolidation of case {}: already in progress", case_id);
            ConsolidationError::ConsolidationInProgress { case_id }
        })
    }

    /// Resolve the ordered input set.
    async fn resolve_inputs(
        &self,
        case_id: CaseId,
        document_ids: Option<&[DocumentId]>,
    ) -> Result<Vec<Document>, ConsolidationError> {
        self.ensure_case(case_id).await?;

        let inputs = match document_ids {
            None => {
                let mut all: Vec<Document> = self
                    .registry
                    .list_documents(case_id)
                    .await?
                    .into_iter()
                    .filter(|d| !d.is_consolidated_output)
                    .collect();
                all.sort_by_key(Document::merge_order_key);
                all
            }
            Some([]) => {
                return Err(ConsolidationError::InvalidSelection {
                    case_id,
                    reason: "the document list is empty".into(),
                })
            }
            Some(ids) => {
                let selected = self.select(case_id, ids).await?;
                selected
                    .into_iter()
                    .filter(|d| {
                        if d.is_consolidated_output {
                            debug!("Ignoring consolidated document {} in selection", d.id);
                        }
                        !d.is_consolidated_output
                    })
                    .collect()
            }
        };

        if inputs.is_empty() {
            return Err(ConsolidationError::NothingToProcess { case_id });
        }
        Ok(inputs)
    }

    /// Look up an explicit id list: every id must exist, belong to the case,
    /// and appear once.
    async fn select(
        &self,
        case_id: CaseId,
        ids: &[DocumentId],
    ) -> Result<Vec<Document>, ConsolidationError> {
        let mut seen = HashSet::with_capacity(ids.len());
        let mut selected = Vec::with_capacity(ids.len());
        for &id in ids {
            if !seen.insert(id) {
                return Err(ConsolidationError::InvalidSelection {
                    case_id,
                    reason: format!("document {id} is listed more than once"),
                });
            }
            let doc = self.registry.get_document(id).await?.ok_or_else(|| {
                ConsolidationError::InvalidSelection {
                    case_id,
                    reason: format!("document {id} does not exist"),
                }
            })?;
            if doc.case_id != case_id {
                return Err(ConsolidationError::InvalidSelection {
                    case_id,
                    reason: format!("document {id} belongs to case {}", doc.case_id),
                });
            }
            selected.push(doc);
        }
        Ok(selected)
    }

    async fn ensure_case(&self, case_id: CaseId) -> Result<(), ConsolidationError> {
        if self.cases.case_exists(case_id).await? {
            Ok(())
        } else {
            Err(ConsolidationError::CaseNotFound { case_id })
        }
    }

    fn check_ceiling(&self, case_id: CaseId, inputs: &[Document]) -> Result<u64, ConsolidationError> {
        let total_bytes = total_bytes(inputs);
        let limit_bytes = self.config.max_total_input_bytes;
        if total_bytes > limit_bytes {
            warn!(
                "Rejecting case {}: {} input bytes exceed the {}-byte ceiling",
                case_id, total_bytes, limit_bytes
            );
            return Err(ConsolidationError::InputTooLarge {
                case_id,
                total_bytes,
                limit_bytes,
            });
        }
        Ok(total_bytes)
    }

    /// Prepare every input concurrently, append in order, finish the PDF.
    async fn merge(
        &self,
        case_id: CaseId,
        inputs: &[Document],
        cancel: &CancelToken,
    ) -> Result<Merged, ConsolidationError> {
        let total = inputs.len();
        let callback = self.config.progress_callback.clone();
        if let Some(ref cb) = callback {
            cb.on_run_start(total);
        }

        let settings = self.config.render_settings();
        let timeout = self.config.document_timeout();
        let max_bytes = self.config.max_total_input_bytes;
        let mut prepared = stream::iter(inputs.iter().cloned())
            .map(|doc| {
                let storage = Arc::clone(&self.storage);
                async move {
                    let result = prepare_with_timeout(storage, &doc, settings, timeout, max_bytes).await;
                    (doc, result)
                }
            })
            .buffered(self.config.concurrency.max(1));

        let mut out = OutputDocument::new();
        let mut processed = Vec::new();
        let mut skipped = Vec::new();
        let mut position = 0;

        while let Some((doc, result)) = prepared.next().await {
            position += 1;
            if cancel.is_cancelled() {
                info!(
                    "Consolidation of case {} cancelled after {} of {} documents",
                    case_id,
                    position - 1,
                    total
                );
                return Err(ConsolidationError::Cancelled { case_id });
            }
            if let Some(ref cb) = callback {
                cb.on_document_start(position, total, &doc);
            }

            match result.and_then(|p| append(&mut out, p)) {
                Ok((kind, pages)) => {
                    debug!(
                        "Document {} ({}) contributed {} pages",
                        doc.id, doc.display_name, pages
                    );
                    if let Some(ref cb) = callback {
                        cb.on_document_complete(position, total, pages);
                    }
                    processed.push(ProcessedDocument {
                        document_id: doc.id,
                        kind,
                        pages,
                    });
                }
                Err(reason) => {
                    warn!(
                        "Skipping document {} ({}) of case {}: {}",
                        doc.id, doc.display_name, case_id, reason
                    );
                    if let Some(ref cb) = callback {
                        cb.on_document_skipped(position, total, &reason);
                    }
                    skipped.push(SkippedDocument {
                        document_id: doc.id,
                        display_name: doc.display_name,
                        reason,
                    });
                }
            }
        }

        let pages = out.page_count();
        if let Some(ref cb) = callback {
            cb.on_run_complete(total, processed.len(), pages);
        }

        if pages == 0 {
            let first_error = skipped
                .first()
                .map(|s| format!("{}: {}", s.display_name, s.reason))
                .unwrap_or_else(|| "no pages were produced".to_string());
            return Err(ConsolidationError::NoProcessableDocuments {
                case_id,
                attempted: total,
                first_error,
            });
        }

        let title = format!("Case {case_id}");
        let bytes = tokio::task::spawn_blocking(move || out.finish(&title))
            .await
            .map_err(|e| ConsolidationError::Internal(format!("finalise task failed: {e}")))?
            .map_err(|e| ConsolidationError::Internal(format!("PDF serialisation failed: {e}")))?;

        Ok(Merged {
            bytes,
            pages,
            processed,
            skipped,
        })
    }

    // ── Other operations ─────────────────────────────────────────────────

    /// Set `order_index` of the listed documents to their list position.
    ///
    /// Every id is validated before any row changes. Documents not listed
    /// keep their index. Does not consolidate.
    pub async fn reorder_documents(
        &self,
        case_id: CaseId,
        ordered_ids: &[DocumentId],
    ) -> Result<(), ConsolidationError> {
        self.ensure_case(case_id).await?;
        if ordered_ids.is_empty() {
            return Err(ConsolidationError::InvalidSelection {
                case_id,
                reason: "the document list is empty".into(),
            });
        }
        let docs = self.select(case_id, ordered_ids).await?;
        for (position, doc) in docs.iter().enumerate() {
            self.registry
                .update_document_order(doc.id, position as i64)
                .await?;
        }
        info!("Reordered {} documents of case {}", docs.len(), case_id);
        Ok(())
    }

    /// Dry run: the ordered input set as [`Self::consolidate`] would see it,
    /// classified and totalled. Fails with the same validation errors,
    /// including the size ceiling, and has no side effects.
    pub async fn plan(
        &self,
        case_id: CaseId,
        document_ids: Option<&[DocumentId]>,
    ) -> Result<ConsolidationPlan, ConsolidationError> {
        let inputs = self.resolve_inputs(case_id, document_ids).await?;
        let total_bytes = self.check_ceiling(case_id, &inputs)?;
        let documents = inputs
            .into_iter()
            .map(|d| PlannedDocument {
                document_id: d.id,
                kind: classify(&d.declared_type),
                display_name: d.display_name,
                declared_type: d.declared_type,
                byte_size: d.byte_size,
            })
            .collect();
        Ok(ConsolidationPlan {
            case_id,
            documents,
            total_bytes,
            limit_bytes: self.config.max_total_input_bytes,
        })
    }

    /// The case's current consolidated artifact, if any.
    ///
    /// Should a crash have left more than one, the newest is reported.
    pub async fn current_artifact(
        &self,
        case_id: CaseId,
    ) -> Result<Option<Document>, ConsolidationError> {
        self.ensure_case(case_id).await?;
        Ok(self
            .consolidated_of(case_id)
            .await?
            .into_iter()
            .max_by_key(|d| (d.created_at, d.id)))
    }

    /// Retire every consolidated artifact of the case except the newest.
    ///
    /// Returns the ids removed; empty when the case is already consistent.
    pub async fn repair(&self, case_id: CaseId) -> Result<Vec<DocumentId>, ConsolidationError> {
        let _guard = self.lock(case_id)?;
        self.ensure_case(case_id).await?;

        let mut artifacts = self.consolidated_of(case_id).await?;
        if artifacts.len() <= 1 {
            return Ok(Vec::new());
        }
        artifacts.sort_by_key(|d| (d.created_at, d.id));
        let keep = artifacts.pop();
        warn!(
            "Case {} has {} consolidated artifacts; keeping {:?}",
            case_id,
            artifacts.len() + 1,
            keep.as_ref().map(|d| d.id)
        );
        Ok(self.publisher.retire(artifacts).await?)
    }

    /// Change a document's display name.
    pub async fn rename_document(
        &self,
        document_id: DocumentId,
        display_name: &str,
    ) -> Result<(), ConsolidationError> {
        let name = display_name.trim();
        if name.is_empty() {
            return Err(ConsolidationError::BlankDisplayName { document_id });
        }
        match self.registry.rename_document(document_id, name).await {
            Ok(()) => Ok(()),
            Err(RegistryError::NotFound(_)) => Err(ConsolidationError::DocumentNotFound { document_id }),
            Err(e) => Err(e.into()),
        }
    }

    async fn consolidated_of(&self, case_id: CaseId) -> Result<Vec<Document>, ConsolidationError> {
        Ok(self
            .registry
            .list_documents(case_id)
            .await?
            .into_iter()
            .filter(|d| d.is_consolidated_output)
            .collect())
    }
}

fn total_bytes(inputs: &[Document]) -> u64 {
    inputs
        .iter()
        .fold(0u64, |acc, d| acc.saturating_add(d.byte_size))
}

/// Append a prepared document; returns its kind and page count.
fn append(out: &mut OutputDocument, prepared: Prepared) -> Result<(DocumentKind, usize), DocumentError> {
    match prepared {
        Prepared::Image(page) => out
            .add_image_page(page)
            .map(|_| (DocumentKind::Image, 1))
            .map_err(|e| DocumentError::Encode {
                detail: e.to_string(),
            }),
        Prepared::Pdf(source) => Ok((DocumentKind::Pdf, append_source(out, source))),
    }
}

/// [`prepare`] bounded by the per-document timeout.
///
/// A blocking task cannot be aborted; on timeout it runs to completion in the
/// background and its result is dropped.
async fn prepare_with_timeout(
    storage: Arc<dyn FileStorage>,
    doc: &Document,
    settings: RenderSettings,
    timeout: Duration,
    max_bytes: u64,
) -> Result<Prepared, DocumentError> {
    match tokio::time::timeout(timeout, prepare(storage, doc, settings, max_bytes)).await {
        Ok(result) => result,
        Err(_) => Err(DocumentError::Timeout {
            secs: timeout.as_secs(),
        }),
    }
}

/// Classify, read and decode or parse one document.
async fn prepare(
    storage: Arc<dyn FileStorage>,
    doc: &Document,
    settings: RenderSettings,
    max_bytes: u64,
) -> Result<Prepared, DocumentError> {
    let kind = classify(&doc.declared_type);
    let job: fn(&[u8], &RenderSettings) -> Result<Prepared, DocumentError> = match kind {
        DocumentKind::Image => |bytes, settings| render_image_as_page(bytes, settings).map(Prepared::Image),
        DocumentKind::Pdf => |bytes, _| load_source(bytes).map(Prepared::Pdf),
        DocumentKind::Unsupported => {
            return Err(DocumentError::Unsupported {
                declared_type: doc.declared_type.clone(),
            })
        }
    };

    let bytes = storage
        .read_file(&doc.storage_path)
        .await
        .map_err(|e| DocumentError::Read {
            detail: e.to_string(),
        })?;
    // Declared sizes were checked up front; the stored bytes may disagree.
    if bytes.len() as u64 > max_bytes {
        return Err(DocumentError::Read {
            detail: format!(
                "stored file is {} bytes, above the {max_bytes}-byte input ceiling",
                bytes.len()
            ),
        });
    }

    tokio::task::spawn_blocking(move || job(&bytes, &settings))
        .await
        .map_err(|e| {
            let detail = format!("processing aborted: {e}");
            match kind {
                DocumentKind::Image => DocumentError::Decode { detail },
                _ => DocumentError::MalformedPdf { detail },
            }
        })?
}
