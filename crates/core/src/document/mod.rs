//! PDF Document module - index, registry, resolution and pages.
//!
//! This module contains:
//! - `catalog` - the resolution engine (PDFDocument)
//! - `registry` - memo of located objects
//! - `xref` - cross-reference sections, trailer and header
//! - `factory` - domain object kinds and the built object tree
//! - `page` - page tree walk

pub mod catalog;
pub mod factory;
pub mod page;
pub mod registry;
pub mod xref;

// Re-export main types for convenience
pub use catalog::PDFDocument;
pub use factory::{DomainObject, Node, ObjectFactory, ObjectKind, TypeFactory};
pub use page::Page;
pub use registry::Registry;
pub use xref::{Header, Trailer, XRefEntry, XRefSection};
