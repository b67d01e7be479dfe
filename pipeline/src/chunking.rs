//! Message preparation for size-limited, HTML-parsing transports.
//!
//! Escape first, then split: chunk lengths are measured on the text that is
//! actually transmitted, and the splitter never cuts through an entity.
//! Lengths are counted in UTF-16 code units, the unit Telegram's limit uses;
//! for text without astral-plane symbols (emoji) that equals the char count.

use std::num::NonZeroUsize;

use crate::error::PipelineError;

/// Maximum UTF-16 code units per chunk. Telegram rejects messages above 4096.
pub const DEFAULT_MAX_CHUNK_LEN: usize = 3900;

/// Longest entity produced by [`escape_html`] (`&amp;`).
const MAX_ENTITY_LEN: usize = 5;

/// Escape the characters HTML parse mode treats as markup.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Inverse of [`escape_html`].
pub fn unescape_html(text: &str) -> String {
    // `&amp;` last so `&amp;lt;` decodes to `&lt;`, not `<`
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Split `text` into chunks of at most `max_len` UTF-16 code units.
///
/// Cuts right after the last newline inside the window; when the window has
/// no newline the chunk is hard-cut at `max_len`, moved back before any
/// entity it would otherwise split. Concatenating the chunks gives `text`
/// back unchanged.
pub fn split_message(text: &str, max_len: usize) -> Result<Vec<String>, PipelineError> {
    let max_len = NonZeroUsize::new(max_len).ok_or(PipelineError::InvalidChunkSize)?;
    Ok(chunk_lines(text, max_len))
}

/// [`split_message`] for an already validated length.
pub fn chunk_lines(text: &str, max_len: NonZeroUsize) -> Vec<String> {
    let max_len = max_len.get();
    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let Some(window_end) = window_end(rest, max_len) else {
            chunks.push(rest.to_string());
            break;
        };
        let window = &rest[..window_end];
        let cut = match window.rfind('\n') {
            Some(newline) => newline + 1,
            None => entity_safe_cut(window),
        };
        let (chunk, tail) = rest.split_at(cut);
        chunks.push(chunk.to_string());
        rest = tail;
    }
    chunks
}

/// Byte offset where the first `max_len` UTF-16 code units of `text` end,
/// `None` when the whole text fits. Never zero: a single symbol wider than
/// `max_len` still makes up a chunk of its own.
fn window_end(text: &str, max_len: usize) -> Option<usize> {
    let mut units = 0;
    for (offset, ch) in text.char_indices() {
        units += ch.len_utf16();
        if units > max_len {
            return Some(if offset == 0 { ch.len_utf8() } else { offset });
        }
    }
    None
}

/// Byte offset to hard-cut `window` at without leaving a dangling `&...`.
fn entity_safe_cut(window: &str) -> usize {
    match window.rfind('&') {
        Some(amp)
            if amp > 0
                && window.len() - amp < MAX_ENTITY_LEN
                && !window[amp..].contains(';') =>
        {
            amp
        }
        _ => window.len(),
    }
}
