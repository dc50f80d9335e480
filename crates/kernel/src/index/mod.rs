//! Typed document index.

pub mod indexer;
pub mod projection;

pub use indexer::{Document, DocumentEvent, DocumentIndexer, IndexReport};
pub use projection::{IndexEntry, project};
