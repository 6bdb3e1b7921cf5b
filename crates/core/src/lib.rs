//! xrefine - fault-tolerant PDF object resolution and CMap parsing.
//!
//! [`PDFDocument`] locates objects through the cross-reference index, object
//! streams, or a sequential scan of the file body, and builds object trees
//! from them. [`font::CMapParser`] reads embedded CMap programs into code
//! range tables.

pub mod codec;
pub mod config;
pub mod document;
pub mod error;
pub mod font;
pub mod model;
pub mod parser;

pub use config::ParseOptions;
pub use document::{Node, PDFDocument};
pub use error::{PdfError, Result};
pub use model::{IndirectObject, PDFObjRef, PDFObject, PDFStream};
