//! In-memory [`DocumentRegistry`] for testing and embedding.
//!
//! Uses a `BTreeMap` behind a `std::sync::RwLock`. Ids are assigned from a
//! monotonically increasing counter, so identity order is registration order.

use super::{CaseDirectory, DocumentRegistry, PublishedRecord};
use crate::error::RegistryError;
use crate::model::{CaseId, Document, DocumentId, NewDocument};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    cases: HashSet<CaseId>,
    documents: BTreeMap<DocumentId, Document>,
}

impl State {
    fn insert(&mut self, fields: NewDocument) -> Result<Document, RegistryError> {
        fields.validate().map_err(RegistryError::Invalid)?;
        if !self.cases.contains(&fields.case_id) {
            return Err(RegistryError::Invalid(format!(
                "case {} does not exist",
                fields.case_id
            )));
        }
        self.next_id += 1;
        let doc = fields.into_document(DocumentId(self.next_id), Utc::now());
        self.documents.insert(doc.id, doc.clone());
        Ok(doc)
    }

    fn get_mut(&mut self, id: DocumentId) -> Result<&mut Document, RegistryError> {
        self.documents
            .get_mut(&id)
            .ok_or(RegistryError::NotFound(id))
    }
}

/// Registry holding cases and documents in process memory.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    state: RwLock<State>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a case so documents can be attached to it.
    pub fn add_case(&self, case_id: CaseId) {
        // Inserting into a set cannot leave it half-updated, so a poisoned
        // lock still guards consistent state.
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.cases.insert(case_id);
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, RegistryError> {
        self.state
            .read()
            .map_err(|_| RegistryError::Unavailable("registry lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, RegistryError> {
        self.state
            .write()
            .map_err(|_| RegistryError::Unavailable("registry lock poisoned".into()))
    }
}

#[async_trait]
impl CaseDirectory for InMemoryRegistry {
    async fn case_exists(&self, case_id: CaseId) -> Result<bool, RegistryError> {
        Ok(self.read()?.cases.contains(&case_id))
    }
}

#[async_trait]
impl DocumentRegistry for InMemoryRegistry {
    async fn list_documents(&self, case_id: CaseId) -> Result<Vec<Document>, RegistryError> {
        Ok(self
            .read()?
            .documents
            .values()
            .filter(|d| d.case_id == case_id)
            .cloned()
            .collect())
    }

    async fn get_document(&self, id: DocumentId) -> Result<Option<Document>, RegistryError> {
        Ok(self.read()?.documents.get(&id).cloned())
    }

    async fn insert_document(&self, fields: NewDocument) -> Result<Document, RegistryError> {
        self.write()?.insert(fields)
    }

    async fn delete_document(&self, id: DocumentId) -> Result<(), RegistryError> {
        self.write()?
            .documents
            .remove(&id)
            .map(|_| ())
            .ok_or(RegistryError::NotFound(id))
    }

    async fn update_document_order(
        &self,
        id: DocumentId,
        order_index: i64,
    ) -> Result<(), RegistryError> {
        self.write()?.get_mut(id)?.order_index = order_index;
        Ok(())
    }

    async fn rename_document(
        &self,
        id: DocumentId,
        display_name: &str,
    ) -> Result<(), RegistryError> {
        if display_name.trim().is_empty() {
            return Err(RegistryError::Invalid("display name must not be empty".into()));
        }
        self.write()?.get_mut(id)?.display_name = display_name.to_string();
        Ok(())
    }

    /// Insert and retire under one write lock: readers see either the old
    /// artifact or the new one, never both and never neither.
    async fn publish_consolidated(
        &self,
        fields: NewDocument,
    ) -> Result<PublishedRecord, RegistryError> {
        if !fields.is_consolidated_output {
            return Err(RegistryError::Invalid(
                "published record must be marked as consolidated output".into(),
            ));
        }
        let mut state = self.write()?;
        let case_id = fields.case_id;
        let document = state.insert(fields)?;

        let old_ids: Vec<DocumentId> = state
            .documents
            .values()
            .filter(|d| d.case_id == case_id && d.is_consolidated_output && d.id != document.id)
            .map(|d| d.id)
            .collect();
        let retired = old_ids
            .into_iter()
            .filter_map(|id| state.documents.remove(&id))
            .collect();

        Ok(PublishedRecord {
            document,
            retired,
            unretired: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoragePath;

    fn fields(case: u64, name: &str, consolidated: bool) -> NewDocument {
        NewDocument {
            case_id: CaseId(case),
            display_name: name.into(),
            storage_path: StoragePath::new(name),
            byte_size: 1,
            declared_type: "pdf".into(),
            order_index: 0,
            is_consolidated_output: consolidated,
        }
    }

    #[tokio::test]
    async fn ids_are_assigned_in_order() {
        let reg = InMemoryRegistry::new();
        reg.add_case(CaseId(1));
        let a = reg.insert_document(fields(1, "a.pdf", false)).await.unwrap();
        let b = reg.insert_document(fields(1, "b.pdf", false)).await.unwrap();
        assert!(a.id < b.id);
        assert_eq!(reg.list_documents(CaseId(1)).await.unwrap().len(), 2);
    }

    #[test]
    fn add_case_recovers_poisoned_lock() {
        let reg = std::sync::Arc::new(InMemoryRegistry::new());
        let poisoner = std::sync::Arc::clone(&reg);
        let _ = std::thread::spawn(move || {
            let _state = poisoner.state.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();
        assert!(reg.state.is_poisoned());

        reg.add_case(CaseId(3));
        let state = reg.state.read().unwrap_or_else(|e| e.into_inner());
        assert!(state.cases.contains(&CaseId(3)));
    }

    #[tokio::test]
    async fn insert_requires_known_case() {
        let reg = InMemoryRegistry::new();
        let err = reg.insert_document(fields(9, "a.pdf", false)).await.unwrap_err();
        assert!(matches!(err, RegistryError::Invalid(_)));
    }

    #[tokio::test]
    async fn publish_keeps_exactly_one_consolidated_row() {
        let reg = InMemoryRegistry::new();
        reg.add_case(CaseId(1));
        reg.add_case(CaseId(2));
        // Simulate the crash state: two consolidated rows.
        reg.insert_document(fields(1, "old1.pdf", true)).await.unwrap();
        reg.insert_document(fields(1, "old2.pdf", true)).await.unwrap();
        let other = reg.insert_document(fields(2, "other.pdf", true)).await.unwrap();

        let published = reg
            .publish_consolidated(fields(1, "new.pdf", true))
            .await
            .unwrap();
        assert_eq!(published.retired.len(), 2);

        let current: Vec<_> = reg
            .list_documents(CaseId(1))
            .await
            .unwrap()
            .into_iter()
            .filter(|d| d.is_consolidated_output)
            .collect();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].id, published.document.id);
        // Other cases are untouched.
        assert!(reg.get_document(other.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn publish_rejects_unflagged_record() {
        let reg = InMemoryRegistry::new();
        reg.add_case(CaseId(1));
        let err = reg
            .publish_consolidated(fields(1, "x.pdf", false))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Invalid(_)));
    }

    #[tokio::test]
    async fn reorder_and_rename() {
        let reg = InMemoryRegistry::new();
        reg.add_case(CaseId(1));
        let a = reg.insert_document(fields(1, "a.pdf", false)).await.unwrap();
        reg.update_document_order(a.id, 5).await.unwrap();
        reg.rename_document(a.id, "renamed.pdf").await.unwrap();
        let got = reg.get_document(a.id).await.unwrap().unwrap();
        assert_eq!(got.order_index, 5);
        assert_eq!(got.display_name, "renamed.pdf");
        assert!(reg.rename_document(a.id, " ").await.is_err());
        assert!(matches!(
            reg.update_document_order(DocumentId(99), 1).await,
            Err(RegistryError::NotFound(_))
        ));
    }
}
