pub mod chunker;

// Re-export the main chunking types for external use
pub use chunker::{Chunk, ChunkerError, TokenChunker};
