pub mod streaming;
pub mod text_chunker;
