//! Outbound chunking: split long responses at natural boundaries and
//! deliver the pieces in order.
//!
//! Lengths are counted in UTF-16 code units, which is how Telegram measures
//! message text. Cuts always land on a `char` boundary, so surrogate pairs and
//! multi-byte characters are never split.

use std::time::Duration;

use tracing::debug;

use crate::channels::{Channel, ReplyTarget};
use crate::error::ChannelError;

/// Length of `text` in UTF-16 code units.
pub fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}

/// Split `text` into chunks of at most `max_units` UTF-16 code units.
///
/// Each cut prefers the last paragraph break (`"\n\n"`) in the window, then
/// the last line break, provided the break sits in the second half of the
/// window; otherwise the window is cut at its end. Newlines at the start of
/// the remainder are dropped. Text that already fits comes back unchanged.
pub fn split_message(text: &str, max_units: usize) -> Vec<String> {
    if utf16_len(text) <= max_units {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if utf16_len(remaining) <= max_units {
            chunks.push(remaining.to_string());
            break;
        }

        let window = &remaining[..window_end(remaining, max_units)];
        let cut = cut_point(window);

        chunks.push(remaining[..cut].to_string());
        remaining = remaining[cut..].trim_start_matches('\n');
    }

    chunks
}

/// Byte offset of the longest prefix within `max_units`. Always at least one
/// character, so a character wider than the limit still makes progress.
fn window_end(text: &str, max_units: usize) -> usize {
    let mut units = 0;
    for (idx, ch) in text.char_indices() {
        units += ch.len_utf16();
        if units > max_units {
            return if idx == 0 { ch.len_utf8() } else { idx };
        }
    }
    text.len()
}

/// Byte offset to cut `window` at. A break counts only if it starts at or
/// after the window's midpoint, measured in UTF-16 units.
fn cut_point(window: &str) -> usize {
    let half = utf16_len(window) / 2;
    let usable = |idx: usize| idx > 0 && utf16_len(&window[..idx]) >= half;

    if let Some(idx) = window.rfind("\n\n")
        && usable(idx)
    {
        return idx;
    }
    if let Some(idx) = window.rfind('\n')
        && usable(idx)
    {
        return idx;
    }
    window.len()
}

/// Send `chunks` in order with `pause` between consecutive sends.
///
/// Stops at the first failure; later chunks are not sent.
pub async fn deliver(
    channel: &dyn Channel,
    target: &ReplyTarget,
    chunks: &[String],
    pause: Duration,
) -> Result<(), ChannelError> {
    for (i, chunk) in chunks.iter().enumerate() {
        if i > 0 && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        channel.send_text(target, chunk).await?;
    }

    if chunks.len() > 1 {
        debug!(
            channel = channel.name(),
            chat_id = %target.chat_id,
            chunks = chunks.len(),
            "Delivered multi-part response"
        );
    }
    Ok(())
}
