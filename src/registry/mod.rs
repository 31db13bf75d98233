//! Document registry abstraction.
//!
//! The [`DocumentRegistry`] trait is the engine's only view of document
//! metadata: which files a case owns, in what order, and which one is the
//! current consolidated artifact. [`CaseDirectory`] answers the single
//! question the engine asks about cases themselves: does this one exist?
//!
//! Persistence technology is the implementor's business. The crate ships
//! [`memory::InMemoryRegistry`], which implements both traits.

pub mod memory;

use crate::error::RegistryError;
use crate::model::{CaseId, Document, DocumentId, NewDocument};
use async_trait::async_trait;
use tracing::warn;

pub use memory::InMemoryRegistry;

/// Outcome of [`DocumentRegistry::publish_consolidated`].
#[derive(Debug, Clone)]
pub struct PublishedRecord {
    /// The freshly committed consolidated document.
    pub document: Document,
    /// Previous consolidated documents whose rows were removed. Their backing
    /// files still exist and are the caller's to delete.
    pub retired: Vec<Document>,
    /// Previous consolidated documents still registered after the new row
    /// committed. Their rows and files are untouched; `Consolidator::repair`
    /// retires them later.
    pub unretired: Vec<Document>,
}

/// Existence check for parent cases.
#[async_trait]
pub trait CaseDirectory: Send + Sync {
    async fn case_exists(&self, case_id: CaseId) -> Result<bool, RegistryError>;
}

/// Metadata store mapping a case to its documents.
#[async_trait]
pub trait DocumentRegistry: Send + Sync {
    /// All documents of a case, in no particular order.
    async fn list_documents(&self, case_id: CaseId) -> Result<Vec<Document>, RegistryError>;

    async fn get_document(&self, id: DocumentId) -> Result<Option<Document>, RegistryError>;

    /// Register a new document. Implementations must call
    /// [`NewDocument::validate`] and reject invalid records.
    async fn insert_document(&self, fields: NewDocument) -> Result<Document, RegistryError>;

    /// Remove a document row. Fails with [`RegistryError::NotFound`] if absent.
    async fn delete_document(&self, id: DocumentId) -> Result<(), RegistryError>;

    async fn update_document_order(
        &self,
        id: DocumentId,
        order_index: i64,
    ) -> Result<(), RegistryError>;

    async fn rename_document(&self, id: DocumentId, display_name: &str)
        -> Result<(), RegistryError>;

    /// Register `fields` as the case's consolidated output and remove every
    /// previous consolidated row of that case.
    ///
    /// An `Err` means the new row did not commit. Once it has committed the
    /// call succeeds, even if old rows could not be removed; those are
    /// returned in [`PublishedRecord::unretired`].
    ///
    /// The default implementation inserts first and deletes afterwards, so a
    /// failure in between leaves two consolidated rows (recoverable) but never
    /// zero. Registries with transactions should override this and perform
    /// both steps atomically.
    async fn publish_consolidated(
        &self,
        fields: NewDocument,
    ) -> Result<PublishedRecord, RegistryError> {
        if !fields.is_consolidated_output {
            return Err(RegistryError::Invalid(
                "published record must be marked as consolidated output".into(),
            ));
        }
        let case_id = fields.case_id;
        let document = self.insert_document(fields).await?;

        let previous: Vec<Document> = match self.list_documents(case_id).await {
            Ok(docs) => docs
                .into_iter()
                .filter(|d| d.is_consolidated_output && d.id != document.id)
                .collect(),
            Err(e) => {
                warn!(
                    "Document {} committed but previous artifacts of case {} could not be listed: {}",
                    document.id, case_id, e
                );
                Vec::new()
            }
        };

        let mut retired = Vec::with_capacity(previous.len());
        let mut unretired = Vec::new();
        for old in previous {
            match self.delete_document(old.id).await {
                Ok(()) | Err(RegistryError::NotFound(_)) => retired.push(old),
                Err(e) => {
                    warn!("Could not retire consolidated document {}: {}", old.id, e);
                    unretired.push(old);
                }
            }
        }
        Ok(PublishedRecord {
            document,
            retired,
            unretired,
        })
    }
}
