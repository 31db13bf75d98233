//! Pipeline stages for turning case documents into one PDF.
//!
//! Each submodule implements one step and none of them does I/O; bytes come
//! in from storage and bytes go out to the publisher, both handled by
//! [`crate::consolidate`].
//!
//! ## Data Flow
//!
//! ```text
//!                ┌──▶ render ──▶ encode ──┐
//! classify ──────┤    (decode,   (JPEG)   ├──▶ assemble ──▶ PDF bytes
//! (declared type)│     layout)            │    (page tree,
//!                └──▶ splice ─────────────┘     prune, save)
//!                     (load, flatten, renumber)
//! ```
//!
//! 1. [`classify`] maps a declared type to image, PDF, or unsupported
//! 2. [`render`] decodes one image and fits it to a page via [`layout`]
//! 3. [`encode`] produces the JPEG stream embedded with `/DCTDecode`
//! 4. [`splice`] loads a source PDF and moves its pages across untouched
//! 5. [`assemble`] owns the output document and serialises it

pub mod assemble;
pub mod classify;
pub mod encode;
pub mod layout;
pub mod render;
pub mod splice;

pub use assemble::OutputDocument;
pub use classify::{classify, DocumentKind};
