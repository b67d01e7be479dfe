//! Report Diff-and-Notify Pipeline
//!
//! This library provides the reusable core of the digest relay:
//! - Whitespace-insensitive change detection between two report texts
//! - Splitting a report into numbered sections (`1)`, `2)`, ...)
//! - Fuzzy similarity scoring between sections
//! - Building a reduced report where unchanged sections become placeholders
//! - Chunked, markup-safe delivery with per-chunk failure tracking
//! - Snapshot + append-only history persistence
//!
//! # Flow
//!
//! ```text
//! new report ─┬─ normalize_equal(new, snapshot)? ── yes ──> nothing to do
//!             └─ no ──> ReportDiffer::diff ──> ChunkedDelivery::deliver
//!                                                   │
//!                            ReportStore::save + ReportStore::append
//! ```
//!
//! The library never reads the process environment and never builds an HTTP
//! client; transports are plugged in through [`delivery::MessageTransport`].

pub mod chunking;
pub mod delivery;
pub mod differ;
pub mod error;
pub mod lines;
pub mod normalize;
pub mod sections;
pub mod similarity;
pub mod store;

pub use chunking::{chunk_lines, escape_html, split_message, unescape_html, DEFAULT_MAX_CHUNK_LEN};
pub use delivery::{ChunkOutcome, ChunkedDelivery, DeliveryReport, MessageTransport};
pub use differ::{ChangeDetection, DiffBlock, ReportDiffer, NO_UPDATE_PLACEHOLDER};
pub use error::{PipelineError, StoreError, TransportError};
pub use lines::{added_lines, added_lines_message};
pub use normalize::{collapse_whitespace, normalize_equal};
pub use sections::{
    missing_markers, missing_markers_with, split, split_with, MarkerAnchor, Section, EXPECTED_SECTIONS,
};
pub use similarity::{ratio, similar, SimilarityComparer, DEFAULT_SIMILARITY_THRESHOLD};
pub use store::{HistoryEntry, ReportStore, StoreLock};
