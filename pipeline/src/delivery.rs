//! Chunked delivery with per-chunk failure tracking.
//!
//! A message is escaped, split into transport-sized chunks and sent chunk by
//! chunk. A failing chunk is logged and recorded; the remaining chunks are
//! still sent. The caller decides what a partial failure means, the
//! orchestrator persists the report either way.

use async_trait::async_trait;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chunking::{chunk_lines, escape_html};
use crate::error::{PipelineError, TransportError};

/// Something that can post one already-escaped chunk of text.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Send a single chunk. Implementations must not split or escape it.
    async fn send(&self, text: &str) -> Result<(), TransportError>;

    /// Short name used in logs
    fn name(&self) -> &str {
        "transport"
    }
}

#[async_trait]
impl<T: MessageTransport + ?Sized> MessageTransport for Arc<T> {
    async fn send(&self, text: &str) -> Result<(), TransportError> {
        (**self).send(text).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[async_trait]
impl<T: MessageTransport + ?Sized> MessageTransport for Box<T> {
    async fn send(&self, text: &str) -> Result<(), TransportError> {
        (**self).send(text).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// What happened to one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkStatus {
    Sent,
    /// Whitespace-only chunk, nothing to transmit
    Skipped,
    Failed(TransportError),
}

/// Per-chunk delivery record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOutcome {
    /// 0-based position of the chunk in the message
    pub index: usize,
    /// Length in characters of the transmitted (escaped) chunk
    pub chars: usize,
    pub status: ChunkStatus,
}

impl ChunkOutcome {
    pub fn is_ok(&self) -> bool {
        !matches!(self.status, ChunkStatus::Failed(_))
    }
}

/// Result of delivering one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub chunks: Vec<ChunkOutcome>,
}

impl DeliveryReport {
    /// True only when every chunk went through (vacuously true for no chunks).
    pub fn is_success(&self) -> bool {
        self.chunks.iter().all(ChunkOutcome::is_ok)
    }

    pub fn failed_count(&self) -> usize {
        self.chunks.iter().filter(|c| !c.is_ok()).count()
    }

    /// Chunks a send was attempted for, failed ones included.
    pub fn attempted(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| c.status != ChunkStatus::Skipped)
            .count()
    }

    pub fn sent_count(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Sent)
            .count()
    }
}

/// Splits messages into transport-safe chunks and sends all of them.
pub struct ChunkedDelivery<T> {
    transport: T,
    max_chunk_len: NonZeroUsize,
}

impl<T: MessageTransport> ChunkedDelivery<T> {
    pub fn new(transport: T, max_chunk_len: usize) -> Result<Self, PipelineError> {
        let max_chunk_len =
            NonZeroUsize::new(max_chunk_len).ok_or(PipelineError::InvalidChunkSize)?;
        Ok(Self {
            transport,
            max_chunk_len,
        })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn max_chunk_len(&self) -> usize {
        self.max_chunk_len.get()
    }

    /// Escape, split and send `message`; never stops at a failed chunk.
    pub async fn deliver(&self, message: &str) -> DeliveryReport {
        let escaped = escape_html(message);
        let chunks = chunk_lines(&escaped, self.max_chunk_len);
        let total = chunks.len();
        let mut report = DeliveryReport::default();

        for (index, chunk) in chunks.iter().enumerate() {
            let chars = chunk.chars().count();
            let status = if chunk.trim().is_empty() {
                debug!(chunk = index + 1, total, "Skipping whitespace-only chunk");
                ChunkStatus::Skipped
            } else {
                match self.transport.send(chunk).await {
                    Ok(()) => {
                        debug!(
                            transport = self.transport.name(),
                            chunk = index + 1,
                            total,
                            chars,
                            "Chunk delivered"
                        );
                        ChunkStatus::Sent
                    }
                    Err(e) => {
                        warn!(
                            transport = self.transport.name(),
                            chunk = index + 1,
                            total,
                            error = %e,
                            "Chunk delivery failed, continuing with remaining chunks"
                        );
                        ChunkStatus::Failed(e)
                    }
                }
            };
            report.chunks.push(ChunkOutcome {
                index,
                chars,
                status,
            });
        }

        info!(
            transport = self.transport.name(),
            chunks = total,
            sent = report.sent_count(),
            failed = report.failed_count(),
            "Delivery finished"
        );
        report
    }

    /// [`deliver`](Self::deliver) reduced to overall success.
    pub async fn deliver_ok(&self, message: &str) -> bool {
        self.deliver(message).await.is_success()
    }
}
