//! PDF page splicing.
//!
//! A source PDF is loaded and validated in full by [`load_source`] before the
//! output is touched; [`append_source`] then moves its pages, and everything
//! they reference, into the [`OutputDocument`] without re-encoding a byte of
//! content. A source that fails to load therefore never leaves half its pages
//! behind.
//!
//! Attributes a page inherits from its page tree (`Resources`, `MediaBox`,
//! `CropBox`, `Rotate`) are copied onto the page itself first, because the
//! source's intermediate `Pages` nodes are not carried over.

use crate::error::DocumentError;
use crate::pipeline::assemble::OutputDocument;
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::debug;

const INHERITABLE: &[&[u8]] = &[b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Page trees deeper than this are treated as malformed (or cyclic).
const MAX_TREE_DEPTH: usize = 64;

/// Object types that belong to the source's document structure rather than
/// to any page.
const STRUCTURAL_TYPES: &[&[u8]] = &[
    b"Catalog", b"Pages", b"Outlines", b"Outline", b"ObjStm", b"XRef",
];

/// A parsed, validated source PDF ready to be appended.
pub struct SourcePdf {
    doc: Document,
    page_count: usize,
}

impl std::fmt::Debug for SourcePdf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourcePdf")
            .field("page_count", &self.page_count)
            .field("objects", &self.doc.objects.len())
            .finish()
    }
}

/// Parse `bytes` and prepare every page for splicing.
pub fn load_source(bytes: &[u8]) -> Result<SourcePdf, DocumentError> {
    let mut doc = Document::load_mem(bytes).map_err(|e| {
        let detail = e.to_string();
        if looks_encrypted(&detail) {
            DocumentError::EncryptedPdf
        } else {
            DocumentError::MalformedPdf { detail }
        }
    })?;

    if doc.trailer.get(b"Encrypt").is_ok() {
        return Err(DocumentError::EncryptedPdf);
    }

    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
    if page_ids.is_empty() {
        return Err(DocumentError::EmptyPdf);
    }

    for &page_id in &page_ids {
        flatten_inherited(&mut doc, page_id)?;
    }

    debug!(
        "Loaded source PDF: {} pages, {} objects",
        page_ids.len(),
        doc.objects.len()
    );
    Ok(SourcePdf {
        page_count: page_ids.len(),
        doc,
    })
}

fn looks_encrypted(detail: &str) -> bool {
    let lower = detail.to_ascii_lowercase();
    lower.contains("encrypt") || lower.contains("decrypt") || lower.contains("password")
}

/// Copy inheritable attributes from the page's ancestors onto the page.
fn flatten_inherited(doc: &mut Document, page_id: ObjectId) -> Result<(), DocumentError> {
    let page = doc
        .get_dictionary(page_id)
        .map_err(|e| malformed(format!("page {page_id:?}: {e}")))?;

    let mut missing: Vec<&[u8]> = INHERITABLE
        .iter()
        .copied()
        .filter(|key| !page.has(key))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    let mut inherited: Vec<(&[u8], Object)> = Vec::new();
    let mut parent = parent_of(page);
    let mut depth = 0;
    while let Some(parent_id) = parent {
        depth += 1;
        if depth > MAX_TREE_DEPTH {
            return Err(malformed(format!(
                "page tree deeper than {MAX_TREE_DEPTH} levels"
            )));
        }
        let node = doc
            .get_dictionary(parent_id)
            .map_err(|e| malformed(format!("page tree node {parent_id:?}: {e}")))?;
        missing.retain(|key| match node.get(key) {
            Ok(value) => {
                inherited.push((*key, value.clone()));
                false
            }
            Err(_) => true,
        });
        if missing.is_empty() {
            break;
        }
        parent = parent_of(node);
    }

    // A page with no MediaBox anywhere in its tree gets US Letter.
    if missing.contains(&&b"MediaBox"[..]) {
        inherited.push((
            &b"MediaBox"[..],
            Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]),
        ));
    }

    if inherited.is_empty() {
        return Ok(());
    }
    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| malformed(format!("page {page_id:?}: {e}")))?;
    for (key, value) in inherited {
        page.set(key.to_vec(), value);
    }
    Ok(())
}

fn parent_of(dict: &Dictionary) -> Option<ObjectId> {
    dict.get(b"Parent").and_then(Object::as_reference).ok()
}

fn malformed(detail: String) -> DocumentError {
    DocumentError::MalformedPdf { detail }
}

/// Move every page of `source`, in order, to the end of `out`.
///
/// Returns the number of pages appended. Infallible: all validation happened
/// in [`load_source`].
pub fn append_source(out: &mut OutputDocument, source: SourcePdf) -> usize {
    let mut doc = source.doc;
    doc.renumber_objects_with(out.next_free_id());

    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
    let parent = out.pages_id();

    for (id, object) in std::mem::take(&mut doc.objects) {
        let kind = object.type_name().unwrap_or(b"");
        if STRUCTURAL_TYPES.contains(&kind) {
            continue;
        }
        out.insert_object(id, object);
    }

    for &page_id in &page_ids {
        // Non-page objects were inserted above; pages were too, re-parent them.
        if let Some(Object::Dictionary(page)) = out.object_mut(page_id) {
            page.set("Parent", Object::Reference(parent));
        }
        out.push_page(page_id);
    }

    debug!("Spliced {} pages", page_ids.len());
    page_ids.len()
}

/// Load `bytes` and append all of its pages to `out`.
pub fn splice_all_pages(bytes: &[u8], out: &mut OutputDocument) -> Result<usize, DocumentError> {
    let source = load_source(bytes)?;
    Ok(append_source(out, source))
}
