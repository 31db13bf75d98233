//! The consolidated output document under construction.
//!
//! [`OutputDocument`] owns a single `lopdf::Document` with one flat page tree.
//! Image pages are generated here; spliced pages are moved in by
//! [`crate::pipeline::splice`]. Pages are only ever appended, so the page
//! sequence is exactly the order of the calls that produced it.

use crate::pipeline::render::RenderedPage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

const PRODUCER: &str = concat!("case-consolidate ", env!("CARGO_PKG_VERSION"));

/// A growing PDF with a cursor at its last page.
pub struct OutputDocument {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
}

impl Default for OutputDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputDocument {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.7");
        // Reserved now, written in `finish` once the kids are known.
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    /// Number of pages appended so far.
    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Append one image page.
    ///
    /// The JPEG bytes become the image XObject stream as-is (`/DCTDecode`).
    pub fn add_image_page(&mut self, page: RenderedPage) -> Result<ObjectId, lopdf::Error> {
        let p = page.placement;
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        p.width.into(),
                        0.into(),
                        0.into(),
                        p.height.into(),
                        p.x.into(),
                        p.y.into(),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        // Encode before touching the document so a failure adds nothing.
        let content_bytes = content.encode()?;

        let img = page.image;
        let image_id = self.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => img.width as i64,
                "Height" => img.height as i64,
                "ColorSpace" => Object::Name(img.color_space.pdf_name().to_vec()),
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            img.data,
        ));
        let content_id = self
            .doc
            .add_object(Stream::new(lopdf::Dictionary::new(), content_bytes));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), p.page_width.into(), p.page_height.into()],
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Im0" => image_id,
                },
            },
            "Contents" => content_id,
        });
        self.kids.push(page_id);
        debug!("Appended image page {} as object {:?}", self.kids.len(), page_id);
        Ok(page_id)
    }

    // ── Splice support ───────────────────────────────────────────────────

    /// First object number guaranteed not to collide with this document.
    pub(crate) fn next_free_id(&self) -> u32 {
        self.doc.max_id + 1
    }

    pub(crate) fn pages_id(&self) -> ObjectId {
        self.pages_id
    }

    /// Insert an object under an id obtained via [`Self::next_free_id`].
    pub(crate) fn insert_object(&mut self, id: ObjectId, object: Object) {
        self.doc.max_id = self.doc.max_id.max(id.0);
        self.doc.objects.insert(id, object);
    }

    pub(crate) fn object_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.doc.objects.get_mut(&id)
    }

    /// Append an already-inserted page object to the page sequence.
    pub(crate) fn push_page(&mut self, page_id: ObjectId) {
        self.kids.push(page_id);
    }

    /// Write the page tree, catalog and info dictionary, drop unreachable
    /// objects, and serialise.
    pub fn finish(mut self, title: &str) -> Result<Vec<u8>, lopdf::Error> {
        let count = self.kids.len() as i64;
        let kids: Vec<Object> = self.kids.iter().map(|&id| Object::Reference(id)).collect();
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        let info_id = self.doc.add_object(dictionary! {
            "Title" => Object::string_literal(title),
            "Producer" => Object::string_literal(PRODUCER),
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.trailer.set("Info", info_id);

        let pruned = self.doc.prune_objects();
        if !pruned.is_empty() {
            debug!("Pruned {} unreachable objects", pruned.len());
        }

        let mut out = Vec::new();
        self.doc.save_to(&mut out)?;
        debug!("Finished output: {} pages, {} bytes", count, out.len());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderSettings;
    use crate::pipeline::render::render_image_as_page;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, image::Rgb([200, 10, 10])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    #[test]
    fn image_pages_round_trip() {
        let settings = RenderSettings::default();
        let mut out = OutputDocument::new();
        for (w, h) in [(40, 20), (20, 40)] {
            let page = render_image_as_page(&png(w, h), &settings).unwrap();
            out.add_image_page(page).unwrap();
        }
        assert_eq!(out.page_count(), 2);

        let bytes = out.finish("test").unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 2);

        // The first page's image keeps the first input's pixel size.
        let first = doc.get_dictionary(pages[&1]).unwrap();
        let resources = first.get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        let im = xobjects.get(b"Im0").unwrap().as_reference().unwrap();
        let stream = doc.get_object(im).unwrap().as_stream().unwrap();
        assert_eq!(stream.dict.get(b"Width").unwrap().as_i64().unwrap(), 40);
        assert_eq!(stream.dict.get(b"Filter").unwrap().as_name().unwrap(), b"DCTDecode");
    }

    #[test]
    fn empty_document_still_serialises() {
        let bytes = OutputDocument::new().finish("empty").unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert!(doc.get_pages().is_empty());
    }
}
