//! Progress-callback trait for per-document consolidation events.
//!
//! Inject an [`Arc<dyn ConsolidationProgressCallback>`] via
//! [`crate::config::ConsolidationConfigBuilder::progress_callback`] to receive
//! events as the orchestrator walks a case's documents.
//!
//! Events arrive in input order: documents may be decoded ahead concurrently,
//! but they are appended, and reported, one at a time.
//!
//! # Example
//!
//! ```rust
//! use case_consolidate::{ConsolidationConfig, ConsolidationProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct PageCounter {
//!     pages: AtomicUsize,
//! }
//!
//! impl ConsolidationProgressCallback for PageCounter {
//!     fn on_document_complete(&self, _position: usize, _total: usize, pages: usize) {
//!         self.pages.fetch_add(pages, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(PageCounter { pages: AtomicUsize::new(0) });
//! let config = ConsolidationConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConsolidationProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::DocumentError;
use crate::model::Document;
use std::sync::Arc;

/// Called by the orchestrator as it processes each document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Positions are 1-indexed.
pub trait ConsolidationProgressCallback: Send + Sync {
    /// Called once after the input set is resolved, before any document is read.
    fn on_run_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called just before a document's pages are appended to the output.
    fn on_document_start(&self, position: usize, total_documents: usize, document: &Document) {
        let _ = (position, total_documents, document);
    }

    /// Called when a document contributed `pages` pages.
    fn on_document_complete(&self, position: usize, total_documents: usize, pages: usize) {
        let _ = (position, total_documents, pages);
    }

    /// Called when a document was skipped.
    fn on_document_skipped(&self, position: usize, total_documents: usize, error: &DocumentError) {
        let _ = (position, total_documents, error);
    }

    /// Called once after every document has been attempted, before publish.
    fn on_run_complete(&self, total_documents: usize, processed: usize, pages: usize) {
        let _ = (total_documents, processed, pages);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConsolidationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConsolidationConfig`].
pub type ProgressCallback = Arc<dyn ConsolidationProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        completes: AtomicUsize,
        skips: AtomicUsize,
        pages: AtomicUsize,
    }

    impl ConsolidationProgressCallback for TrackingCallback {
        fn on_document_complete(&self, _position: usize, _total: usize, pages: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
            self.pages.fetch_add(pages, Ordering::SeqCst);
        }

        fn on_document_skipped(&self, _position: usize, _total: usize, _error: &DocumentError) {
            self.skips.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(3);
        cb.on_document_complete(1, 3, 2);
        cb.on_document_skipped(2, 3, &DocumentError::EmptyPdf);
        cb.on_run_complete(3, 1, 2);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_document_complete(1, 3, 1);
        tracker.on_document_complete(2, 3, 4);
        tracker.on_document_skipped(3, 3, &DocumentError::Timeout { secs: 1 });

        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.skips.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.pages.load(Ordering::SeqCst), 5);
    }
}
