//! PDF parsing modules.
//!
//! - `lexer`: byte cursor and primitive scanning
//! - `pdf_parser`: backtrackable PDF object parser

pub mod lexer;
pub mod pdf_parser;

// Re-export main types for convenience
pub use lexer::{Keyword, Lexer};
pub use pdf_parser::{BodyElement, ObjectOrToken, PDFParser, ParserState};
