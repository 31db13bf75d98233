//! Shared fixtures for the integration tests.
//!
//! Inputs are generated on the fly: rasters with `image`, PDFs with `lopdf`.
//! Every PDF page draws one text marker so tests can read the page sequence
//! of an artifact back as a list of strings.

#![allow(dead_code)]

use case_consolidate::{
    CaseId, ConsolidationConfig, Consolidator, Document, DocumentRegistry, FileStorage,
    InMemoryRegistry, InMemoryStorage, NewDocument,
};
use image::{DynamicImage, ImageFormat, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document as PdfDocument, Object, Stream};
use std::io::Cursor;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub const CASE: CaseId = CaseId(100);

// ── Fixture bytes ────────────────────────────────────────────────────────────

pub fn image_bytes(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    }));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format)
        .expect("encode fixture image");
    buf
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    image_bytes(width, height, ImageFormat::Png)
}

pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    image_bytes(width, height, ImageFormat::Jpeg)
}

/// A PDF with one page per marker, each page showing its marker as text.
pub fn pdf(markers: &[&str]) -> Vec<u8> {
    let mut doc = PdfDocument::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for marker in markers {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal(*marker)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            content.encode().expect("encode fixture content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).expect("save fixture pdf");
    out
}

/// Read an artifact back as one entry per page: the text marker of a spliced
/// page, or `image:<width>` for an image page.
pub fn page_markers(bytes: &[u8]) -> Vec<String> {
    let doc = PdfDocument::load_mem(bytes).expect("artifact must be a loadable PDF");
    doc.get_pages()
        .into_values()
        .map(|page_id| {
            let content = doc.get_page_content(page_id).expect("page content");
            let text = String::from_utf8_lossy(&content);
            if let (Some(start), Some(end)) = (text.find('('), text.rfind(')')) {
                return text[start + 1..end].to_string();
            }
            let page = doc.get_dictionary(page_id).expect("page dictionary");
            let width = page
                .get(b"Resources")
                .and_then(Object::as_dict)
                .and_then(|r| r.get(b"XObject"))
                .and_then(Object::as_dict)
                .and_then(|x| x.get(b"Im0"))
                .and_then(Object::as_reference)
                .and_then(|id| doc.get_object(id))
                .and_then(Object::as_stream)
                .and_then(|s| s.dict.get(b"Width"))
                .and_then(Object::as_i64)
                .expect("image page must reference Im0");
            format!("image:{width}")
        })
        .collect()
}

/// Send library logs to the captured test output; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ── Harness ──────────────────────────────────────────────────────────────────

/// In-memory registry + storage with one case, and a consolidator over them.
pub struct Harness {
    pub registry: Arc<InMemoryRegistry>,
    pub storage: Arc<InMemoryStorage>,
    pub consolidator: Arc<Consolidator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ConsolidationConfig::default())
    }

    pub fn with_config(config: ConsolidationConfig) -> Self {
        init_tracing();
        let registry = Arc::new(InMemoryRegistry::new());
        registry.add_case(CASE);
        let storage = Arc::new(InMemoryStorage::new());
        let consolidator = Arc::new(Consolidator::new(
            registry.clone(),
            registry.clone(),
            storage.clone(),
            config,
        ));
        Self {
            registry,
            storage,
            consolidator,
        }
    }

    /// Store `bytes` and register them as the next document of [`CASE`].
    pub async fn add(&self, name: &str, declared_type: &str, bytes: &[u8]) -> Document {
        add_document(&*self.registry, &*self.storage, name, declared_type, bytes).await
    }

    /// Bytes of the case's current artifact.
    pub async fn artifact_bytes(&self, doc: &Document) -> Vec<u8> {
        self.storage
            .read_file(&doc.storage_path)
            .await
            .expect("artifact file must exist")
    }

    pub async fn consolidated_rows(&self) -> Vec<Document> {
        self.registry
            .list_documents(CASE)
            .await
            .unwrap()
            .into_iter()
            .filter(|d| d.is_consolidated_output)
            .collect()
    }
}

pub async fn add_document(
    registry: &dyn DocumentRegistry,
    storage: &dyn FileStorage,
    name: &str,
    declared_type: &str,
    bytes: &[u8],
) -> Document {
    let existing = registry.list_documents(CASE).await.unwrap().len();
    let storage_path = storage
        .write_file(&format!("src-{existing}-{name}"), bytes)
        .await
        .expect("store fixture");
    registry
        .insert_document(NewDocument {
            case_id: CASE,
            display_name: name.to_string(),
            storage_path,
            byte_size: bytes.len() as u64,
            declared_type: declared_type.to_string(),
            order_index: existing as i64,
            is_consolidated_output: false,
        })
        .await
        .expect("register fixture")
}
