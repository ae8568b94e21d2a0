//! Utility functions for TG Wordcloud

use crate::types::CHANNEL_ID_OFFSET;
use html_escape::encode_text;

/// Escape text for an SVG/XML text node and flatten newlines
pub fn escape_content(content: &str) -> String {
    encode_text(content).replace('\n', " ")
}

/// Get a brief version of content for logging
pub fn brief_content(content: &str, trim_len: usize) -> String {
    let chars: Vec<char> = content.chars().collect();
    if chars.len() < trim_len || trim_len < 4 {
        content.to_string()
    } else {
        let head: String = chars[..trim_len - 4].iter().collect();
        let tail: String = chars[chars.len() - 2..].iter().collect();
        format!("{}…{}", head, tail)
    }
}

/// Get normalized share ID from Telegram chat ID
///
/// Channels and supergroups are addressed as `-100XXXXXXXXXX` in dialog ids
/// but as `XXXXXXXXXX` in `t.me/c/` links.
pub fn get_share_id(chat_id: i64) -> i64 {
    if chat_id < 0 {
        let abs_id = chat_id.unsigned_abs() as i64;
        if abs_id >= CHANNEL_ID_OFFSET {
            abs_id - CHANNEL_ID_OFFSET
        } else {
            abs_id
        }
    } else {
        chat_id
    }
}

/// Dialog id of the channel whose share id is `share_id`
pub fn channel_dialog_id(share_id: i64) -> Option<i64> {
    share_id.checked_add(CHANNEL_ID_OFFSET).map(|id| -id)
}
