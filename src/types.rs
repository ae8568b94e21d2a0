//! Core types for TG Wordcloud

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinError;

/// Main error type for TG Wordcloud
#[derive(Error, Debug)]
pub enum Error {
    #[error("Please provide all credentials (API ID, API hash and phone number)")]
    CredentialsMissing,

    #[error("API ID must be an integer, got {0:?}")]
    InvalidNumericId(String),

    #[error("Sign in failed: {0}")]
    AuthFailed(String),

    #[error("Two-factor authentication is enabled but no password was given")]
    TwoFactorRequired,

    #[error("Channel link not recognised: {0:?}")]
    LinkNotRecognized(String),

    #[error("Error retrieving channel: {0}")]
    ResolutionFailed(String),

    #[error("Download interrupted: {0}")]
    Interrupted(String),

    #[error("No posts with text found")]
    EmptyCorpus,

    #[error("Telegram client error: {0}")]
    Telegram(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Task join error: {0}")]
    Join(#[from] JoinError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Offset Telegram adds to a channel's share id to form its dialog id
pub const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

/// A chat reference parsed from a user-supplied link
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelRef {
    /// Public username (`t.me/<username>`)
    Username(String),

    /// Dialog id of a private channel or supergroup (`t.me/c/<share_id>`),
    /// stored as `-(share_id + CHANNEL_ID_OFFSET)`
    NumericId(i64),
}

impl ChannelRef {
    /// Link form that resolves back to this reference
    pub fn canonical_link(&self) -> String {
        match self {
            ChannelRef::Username(name) => format!("https://t.me/{}", name),
            ChannelRef::NumericId(id) => {
                format!("https://t.me/c/{}", crate::utils::get_share_id(*id))
            }
        }
    }

    /// Short label used in logs and default output file names
    pub fn label(&self) -> String {
        match self {
            ChannelRef::Username(name) => name.clone(),
            ChannelRef::NumericId(id) => crate::utils::get_share_id(*id).to_string(),
        }
    }
}

impl std::fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelRef::Username(name) => write!(f, "@{}", name),
            ChannelRef::NumericId(id) => write!(f, "{}", id),
        }
    }
}

/// A message as seen by the history fetcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    /// Provider-assigned sequence number
    pub id: i32,

    /// Message text, empty for media-only messages
    pub text: String,
}

/// Progress update emitted once per retrieved message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchProgress {
    /// Number of messages retrieved so far
    pub seen: usize,

    /// Approximate message count (id of the newest message), 0 if unknown
    pub estimated_total: usize,

    /// Completion percentage, `None` when the total is unknown
    pub percent: Option<u8>,
}

impl FetchProgress {
    pub fn new(seen: usize, estimated_total: usize) -> Self {
        let percent = if estimated_total > 0 {
            let pct = seen.saturating_mul(100) / estimated_total;
            Some(pct.min(100) as u8)
        } else {
            None
        };
        Self {
            seen,
            estimated_total,
            percent,
        }
    }
}

/// Text of all retrieved messages, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextCorpus {
    messages: Vec<String>,
}

impl TextCorpus {
    pub fn new(messages: Vec<String>) -> Self {
        Self { messages }
    }

    #[cfg(test)]
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// All message bodies joined with single spaces
    pub fn joined(&self) -> String {
        self.messages.join(" ")
    }
}

/// Result of a completed history fetch
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub corpus: TextCorpus,

    /// Progress state after the last message
    pub progress: FetchProgress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percent() {
        assert_eq!(FetchProgress::new(1, 3).percent, Some(33));
        assert_eq!(FetchProgress::new(3, 3).percent, Some(100));
        // Estimate is the newest id, so more messages than the estimate is possible
        assert_eq!(FetchProgress::new(5, 3).percent, Some(100));
        assert_eq!(FetchProgress::new(0, 10).percent, Some(0));
    }

    #[test]
    fn test_progress_unknown_total() {
        let progress = FetchProgress::new(7, 0);
        assert_eq!(progress.seen, 7);
        assert_eq!(progress.percent, None);
    }

    #[test]
    fn test_corpus_joined() {
        let corpus = TextCorpus::new(vec!["hello world".to_string(), "again".to_string()]);
        assert_eq!(corpus.joined(), "hello world again");
        assert_eq!(corpus.len(), 2);
        assert!(TextCorpus::default().is_empty());
        assert_eq!(TextCorpus::default().joined(), "");
    }

    #[test]
    fn test_canonical_link() {
        assert_eq!(
            ChannelRef::Username("examplechannel".to_string()).canonical_link(),
            "https://t.me/examplechannel"
        );
        assert_eq!(
            ChannelRef::NumericId(-1000123456789).canonical_link(),
            "https://t.me/c/123456789"
        );
    }
}
