//! Text chunking for streaming already-complete answers.
//!
//! The first inference call returns a finished text when no tools are needed;
//! chunking it keeps the caller-facing stream incremental either way.

use futures::stream::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Interval, interval};

/// Configuration for text chunking
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Size of each chunk in characters
    pub chunk_size: usize,
    /// Delay between chunks in milliseconds
    pub chunk_delay_ms: u64,
    /// Whether to split at word boundaries
    pub word_boundary: bool,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 32,
            chunk_delay_ms: 8,
            word_boundary: true,
        }
    }
}

/// A stream that yields text in small delayed chunks.
pub struct TextChunker {
    text: String,
    position: usize,
    config: ChunkConfig,
    interval: Interval,
}

impl TextChunker {
    pub fn new(text: String, config: ChunkConfig) -> Self {
        let interval = interval(Duration::from_millis(config.chunk_delay_ms.max(1)));
        Self {
            text,
            position: 0,
            config,
            interval,
        }
    }

    fn next_chunk(&mut self) -> Option<String> {
        if self.position >= self.text.len() {
            return None;
        }

        let remaining = &self.text[self.position..];
        let mut chunk_end = self.config.chunk_size.min(remaining.len());

        while !remaining.is_char_boundary(chunk_end) {
            chunk_end += 1;
        }

        if self.config.word_boundary && chunk_end < remaining.len() {
            if let Some(last_space) = remaining[..chunk_end].rfind(' ') {
                if last_space > 0 {
                    chunk_end = last_space + 1; // Include the space
                }
            } else if let Some(next_space) = remaining[chunk_end..].find(' ') {
                chunk_end = chunk_end + next_space + 1;
            }
        }

        let chunk = remaining[..chunk_end].to_string();
        self.position += chunk_end;
        Some(chunk)
    }
}

impl Stream for TextChunker {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.interval.poll_tick(cx) {
            Poll::Ready(_) => Poll::Ready(self.next_chunk()),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Create a chunked stream from text
pub fn chunk_text(text: String, config: Option<ChunkConfig>) -> impl Stream<Item = String> {
    TextChunker::new(text, config.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn collect(text: &str, config: ChunkConfig) -> Vec<String> {
        chunk_text(text.to_string(), Some(config)).collect().await
    }

    #[tokio::test]
    async fn test_chunks_reassemble_to_original() {
        let text = "Voltage is currently 121.3 V with no active alerts.";
        let chunks = collect(
            text,
            ChunkConfig {
                chunk_size: 10,
                chunk_delay_ms: 1,
                word_boundary: true,
            },
        )
        .await;

        assert!(chunks.len() > 1);
        assert_eq!(chunks.concat(), text);
    }

    #[tokio::test]
    async fn test_word_boundary_splitting() {
        let chunks = collect(
            "Hello world, this is a test message.",
            ChunkConfig {
                chunk_size: 10,
                chunk_delay_ms: 1,
                word_boundary: true,
            },
        )
        .await;

        assert_eq!(chunks[0], "Hello ");
        assert_eq!(chunks[1], "world, ");
    }

    #[tokio::test]
    async fn test_fixed_size_splitting() {
        let chunks = collect(
            "Hello world, this is a test message.",
            ChunkConfig {
                chunk_size: 10,
                chunk_delay_ms: 1,
                word_boundary: false,
            },
        )
        .await;

        assert_eq!(chunks[0], "Hello worl");
        assert_eq!(chunks[1], "d, this is");
    }

    #[tokio::test]
    async fn test_empty_text_yields_nothing() {
        let chunks = collect("", ChunkConfig::default()).await;
        assert!(chunks.is_empty());
    }
}
