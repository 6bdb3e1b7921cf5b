//! PDF model types.
//!
//! - `objects` - PDF object types (PDFObject, PDFStream, PDFObjRef, IndirectObject)

pub mod objects;

// Re-export main types for convenience
pub use objects::{IndirectObject, PDFObjRef, PDFObject, PDFStream};
