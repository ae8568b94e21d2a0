//! Channel link resolution
//!
//! Turns a user-entered `t.me` link into a [`ChannelRef`] without touching
//! the network.

use crate::types::ChannelRef;
use crate::utils::channel_dialog_id;
use regex::Regex;
use std::sync::LazyLock;

static PRIVATE_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:https?://)?t\.me/c/([0-9]+)").expect("valid regex"));

static PUBLIC_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:https?://)?t\.me/([A-Za-z0-9_]+)").expect("valid regex"));

/// Resolve a link to a channel reference
///
/// `t.me/c/<id>` links take priority and map to the channel's dialog id.
/// Otherwise `t.me/<username>` maps to the username, ignoring anything after
/// it (such as a post id). Returns `None` for anything else.
pub fn resolve(link: &str) -> Option<ChannelRef> {
    let link = link.trim();

    if let Some(caps) = PRIVATE_LINK_RE.captures(link) {
        let share_id: i64 = caps[1].parse().ok()?;
        return channel_dialog_id(share_id).map(ChannelRef::NumericId);
    }

    PUBLIC_LINK_RE
        .captures(link)
        .map(|caps| ChannelRef::Username(caps[1].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_link() {
        assert_eq!(
            resolve("https://t.me/c/123456789/1"),
            Some(ChannelRef::NumericId(-1000123456789))
        );
        assert_eq!(
            resolve("t.me/c/42"),
            Some(ChannelRef::NumericId(-1000000000042))
        );
        assert_eq!(
            resolve("http://t.me/c/0"),
            Some(ChannelRef::NumericId(-1000000000000))
        );
    }

    #[test]
    fn test_public_link() {
        assert_eq!(
            resolve("https://t.me/examplechannel"),
            Some(ChannelRef::Username("examplechannel".to_string()))
        );
        assert_eq!(
            resolve("t.me/some_channel42/1234"),
            Some(ChannelRef::Username("some_channel42".to_string()))
        );
        // Longest [A-Za-z0-9_] run, stops at the first other character
        assert_eq!(
            resolve("https://t.me/news-ua"),
            Some(ChannelRef::Username("news".to_string()))
        );
        assert_eq!(
            resolve("  https://t.me/padded  "),
            Some(ChannelRef::Username("padded".to_string()))
        );
    }

    #[test]
    fn test_private_link_without_digits_falls_back_to_username() {
        assert_eq!(
            resolve("https://t.me/c/"),
            Some(ChannelRef::Username("c".to_string()))
        );
    }

    #[test]
    fn test_not_recognized() {
        assert_eq!(resolve(""), None);
        assert_eq!(resolve("   "), None);
        assert_eq!(resolve("not a link"), None);
        assert_eq!(resolve("t.me/"), None);
        assert_eq!(resolve("https://t.me/"), None);
        assert_eq!(resolve("htp://t.me/examplechannel"), None);
        assert_eq!(resolve("ftp://t.me/examplechannel"), None);
        assert_eq!(resolve("https://example.com/examplechannel"), None);
        assert_eq!(resolve("https://t.me/c/99999999999999999999"), None);
    }

    #[test]
    fn test_canonical_link_round_trip() {
        let refs = [
            ChannelRef::Username("examplechannel".to_string()),
            ChannelRef::Username("a_b_9".to_string()),
            ChannelRef::NumericId(-1000123456789),
            ChannelRef::NumericId(-1000000000000),
        ];
        for channel in refs {
            assert_eq!(resolve(&channel.canonical_link()), Some(channel.clone()));
        }

        for link in ["t.me/c/7/100", "https://t.me/durov/5", "http://t.me/c/987654321"] {
            let channel = resolve(link).unwrap();
            assert_eq!(resolve(&channel.canonical_link()), Some(channel));
        }
    }
}
