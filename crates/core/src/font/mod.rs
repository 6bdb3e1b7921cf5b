//! Character map support.
//!
//! - `ranges`: code ranges and mapped code ranges
//! - `cmap`: CMap program parser

pub mod cmap;
pub mod ranges;

// Re-export main types for convenience
pub use cmap::{CMap, CMapParser, MappingKind};
pub use ranges::{CodespaceRanges, MapRange, MappedCodespaceRanges, Range, code_from_bytes};
