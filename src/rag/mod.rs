//! Document Q&A: loading, chunking, indexing and retrieval

pub mod loader;
pub mod pipeline;
pub mod splitter;

pub use loader::{load_documents, SourceDocument, INDEXABLE_EXTENSIONS};
pub use pipeline::{RagPipeline, NO_DOCUMENTS_ANSWER};
pub use splitter::TextSplitter;
