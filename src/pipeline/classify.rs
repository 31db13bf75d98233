//! Format classification: route a document by its declared type.
//!
//! The declared type is whatever the upload layer recorded: a bare extension
//! (`jpg`, `.PDF`), a filename (`scan.png`), or a MIME type
//! (`image/jpeg; charset=binary`). Classification is a pure function of that
//! string; it never looks at the bytes and never fails. Anything it does not
//! recognise is [`DocumentKind::Unsupported`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// How a document takes part in a consolidation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    /// A raster image rendered onto one page.
    Image,
    /// A PDF whose pages are spliced verbatim.
    Pdf,
    /// Skipped with a recorded reason.
    Unsupported,
}

/// Raster types the page renderer can decode.
const IMAGE_TYPES: &[&str] = &[
    "jpg", "jpeg", "jpe", "jfif", "pjpeg", "png", "gif", "bmp", "webp", "tif", "tiff",
];

/// `type/subtype` with an optional `x-` vendor prefix on the subtype.
static RE_MIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-z]+)/(?:x-)?([a-z0-9.+-]+)$").expect("static regex"));

/// Classify a declared type.
pub fn classify(declared_type: &str) -> DocumentKind {
    let token = normalise(declared_type);
    if token == "pdf" {
        DocumentKind::Pdf
    } else if IMAGE_TYPES.contains(&token.as_str()) {
        DocumentKind::Image
    } else {
        DocumentKind::Unsupported
    }
}

/// Reduce a declared type to a bare lowercase token such as `jpeg` or `pdf`.
fn normalise(declared_type: &str) -> String {
    // Drop MIME parameters ("; charset=…") before anything else.
    let raw = declared_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if let Some(caps) = RE_MIME.captures(&raw) {
        return match (&caps[1], &caps[2]) {
            ("application", "pdf") | ("application", "acrobat") => "pdf".to_string(),
            ("image", subtype) => subtype.to_string(),
            _ => String::new(),
        };
    }

    // Extension, ".ext", or a filename ending in one.
    match raw.rsplit_once('.') {
        Some((_, ext)) => ext.to_string(),
        None => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions() {
        assert_eq!(classify("jpg"), DocumentKind::Image);
        assert_eq!(classify(".JPEG"), DocumentKind::Image);
        assert_eq!(classify("png"), DocumentKind::Image);
        assert_eq!(classify("tiff"), DocumentKind::Image);
        assert_eq!(classify("pdf"), DocumentKind::Pdf);
        assert_eq!(classify(" PDF "), DocumentKind::Pdf);
    }

    #[test]
    fn filenames() {
        assert_eq!(classify("scan.final.png"), DocumentKind::Image);
        assert_eq!(classify("contract.pdf"), DocumentKind::Pdf);
        assert_eq!(classify("notes.docx"), DocumentKind::Unsupported);
    }

    #[test]
    fn mime_types() {
        assert_eq!(classify("image/jpeg"), DocumentKind::Image);
        assert_eq!(classify("image/x-png"), DocumentKind::Image);
        assert_eq!(classify("application/pdf"), DocumentKind::Pdf);
        assert_eq!(classify("application/x-pdf"), DocumentKind::Pdf);
        assert_eq!(classify("application/pdf; charset=binary"), DocumentKind::Pdf);
        assert_eq!(classify("image/svg+xml"), DocumentKind::Unsupported);
        assert_eq!(classify("text/plain"), DocumentKind::Unsupported);
        assert_eq!(classify("application/png"), DocumentKind::Unsupported);
    }

    #[test]
    fn garbage_is_unsupported() {
        assert_eq!(classify(""), DocumentKind::Unsupported);
        assert_eq!(classify("   "), DocumentKind::Unsupported);
        assert_eq!(classify("///"), DocumentKind::Unsupported);
        assert_eq!(classify("xlsx"), DocumentKind::Unsupported);
        assert_eq!(classify("\u{1F4C4}"), DocumentKind::Unsupported);
    }
}
