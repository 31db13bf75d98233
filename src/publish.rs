//! Artifact publishing: make merged bytes durable and current.
//!
//! ```text
//! bytes ──▶ write (create-new, name fallback) ──▶ publish_consolidated ──▶ delete retired files
//!                 │ fails: nothing to undo            │ fails: delete new file
//! ```
//!
//! The new registry row is committed before any old row disappears, so a
//! case that has had an artifact never has zero. Old files are deleted only
//! after their rows are gone, so no row ever points at a deleted file.

use crate::error::{ConsolidationError, PublishStage, RegistryError, StorageError};
use crate::model::{CaseId, Document, DocumentId, NewDocument};
use crate::registry::{DocumentRegistry, PublishedRecord};
use crate::storage::FileStorage;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Source of the current time; injectable for tests.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The wall clock.
pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Name candidates tried before giving up on a free one.
const MAX_NAME_ATTEMPTS: usize = 100;

/// Artifact name for the `attempt`-th candidate.
///
/// * `0` → `<prefix>_<case>_<YYYY-MM-DD>.pdf`
/// * `1` → `<prefix>_<case>_<YYYY-MM-DD>_<HHMMSS>.pdf`
/// * `n` → `<prefix>_<case>_<YYYY-MM-DD>_<HHMMSS>-<n-1>.pdf`
pub fn artifact_name(prefix: &str, case_id: CaseId, now: DateTime<Utc>, attempt: usize) -> String {
    let date = now.format("%Y-%m-%d");
    match attempt {
        0 => format!("{prefix}_{case_id}_{date}.pdf"),
        1 => format!("{prefix}_{case_id}_{date}_{}.pdf", now.format("%H%M%S")),
        n => format!(
            "{prefix}_{case_id}_{date}_{}-{}.pdf",
            now.format("%H%M%S"),
            n - 1
        ),
    }
}

/// Writes artifacts to storage and swaps the registry's current one.
#[derive(Clone)]
pub struct ArtifactPublisher {
    registry: Arc<dyn DocumentRegistry>,
    storage: Arc<dyn FileStorage>,
    prefix: String,
    clock: Clock,
}

impl ArtifactPublisher {
    pub fn new(
        registry: Arc<dyn DocumentRegistry>,
        storage: Arc<dyn FileStorage>,
        prefix: impl Into<String>,
        clock: Clock,
    ) -> Self {
        Self {
            registry,
            storage,
            prefix: prefix.into(),
            clock,
        }
    }

    /// Publish `bytes` as the case's consolidated artifact.
    pub async fn publish(
        &self,
        case_id: CaseId,
        bytes: &[u8],
    ) -> Result<PublishedRecord, ConsolidationError> {
        let now = (self.clock)();
        let (name, path) = self.write_new(case_id, bytes, now).await?;
        debug!("Wrote artifact {} ({} bytes)", path, bytes.len());

        let fields = NewDocument {
            case_id,
            display_name: name,
            storage_path: path.clone(),
            byte_size: bytes.len() as u64,
            declared_type: "pdf".into(),
            order_index: 0,
            is_consolidated_output: true,
        };

        let record = match self.registry.publish_consolidated(fields).await {
            Ok(record) => record,
            Err(e) => {
                // An error means the row never committed, so the file is
                // unreferenced.
                if let Err(cleanup) = self.storage.delete_file(&path).await {
                    warn!("Could not remove unregistered artifact {}: {}", path, cleanup);
                }
                return Err(ConsolidationError::Publish {
                    case_id,
                    stage: PublishStage::RegisterArtifact,
                    detail: e.to_string(),
                });
            }
        };

        for old in &record.retired {
            self.delete_file_best_effort(old).await;
        }
        if !record.unretired.is_empty() {
            warn!(
                "Case {} still has {} older consolidated artifacts; run repair to retire them",
                case_id,
                record.unretired.len()
            );
        }

        info!(
            "Published {} as document {} for case {} (retired {})",
            record.document.display_name,
            record.document.id,
            case_id,
            record.retired.len()
        );
        Ok(record)
    }

    /// Remove consolidated documents: row first, then file.
    ///
    /// Returns the ids whose rows are gone (including rows that were already
    /// missing).
    pub async fn retire(&self, documents: Vec<Document>) -> Result<Vec<DocumentId>, RegistryError> {
        let mut retired = Vec::with_capacity(documents.len());
        for doc in documents {
            match self.registry.delete_document(doc.id).await {
                Ok(()) | Err(RegistryError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
            self.delete_file_best_effort(&doc).await;
            retired.push(doc.id);
        }
        Ok(retired)
    }

    async fn write_new(
        &self,
        case_id: CaseId,
        bytes: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(String, crate::storage::StoragePath), ConsolidationError> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = artifact_name(&self.prefix, case_id, now, attempt);
            match self.storage.write_file(&name, bytes).await {
                Ok(path) => return Ok((name, path)),
                Err(StorageError::AlreadyExists(_)) => {
                    debug!("Artifact name {} taken, trying the next one", name);
                }
                Err(e) => {
                    return Err(ConsolidationError::Publish {
                        case_id,
                        stage: PublishStage::WriteArtifact,
                        detail: e.to_string(),
                    })
                }
            }
        }
        Err(ConsolidationError::Publish {
            case_id,
            stage: PublishStage::WriteArtifact,
            detail: format!("no free artifact name after {MAX_NAME_ATTEMPTS} attempts"),
        })
    }

    async fn delete_file_best_effort(&self, doc: &Document) {
        if let Err(e) = self.storage.delete_file(&doc.storage_path).await {
            warn!(
                "Could not delete file {} of retired document {}: {}",
                doc.storage_path, doc.id, e
            );
        }
    }
}
