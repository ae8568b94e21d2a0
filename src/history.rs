//! Chat history fetching
//!
//! Pulls every message of a chat through a [`HistoryProvider`], keeping the
//! text bodies and reporting progress after each message.

/// Interval (in messages) between progress log lines
const FETCH_LOG_BATCH_SIZE: usize = 100;

use crate::types::{
    ChannelRef, Error, FetchOutcome, FetchProgress, HistoryMessage, Result, TextCorpus,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Read-only access to a chat's message history
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Resolved chat handle
    type Entity: Send + Sync;

    /// Message cursor over one chat
    type Cursor: MessageCursor;

    /// Resolve a channel reference to a chat handle
    async fn get_entity(&self, channel: &ChannelRef) -> Result<Self::Entity>;

    /// Id of the newest message in the chat, `None` if the chat is empty
    async fn latest_message_id(&self, entity: &Self::Entity) -> Result<Option<i32>>;

    /// Start iterating over all messages of the chat
    fn messages(&self, entity: &Self::Entity) -> Self::Cursor;
}

/// Lazy sequence of messages; each call may block on network I/O
#[async_trait]
pub trait MessageCursor: Send {
    async fn next(&mut self) -> Result<Option<HistoryMessage>>;
}

/// Cooperative cancellation, checked between message retrievals
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Download the full history of `channel` and collect its text
///
/// The `progress_callback` is called after every message and should be quick
/// as it blocks the download loop. Any failure after the chat was resolved
/// aborts the fetch with [`Error::Interrupted`]; no partial corpus is returned.
pub async fn fetch_history<P, F>(
    provider: &P,
    channel: &ChannelRef,
    progress_callback: Option<F>,
    cancel: &CancelFlag,
) -> Result<FetchOutcome>
where
    P: HistoryProvider,
    F: Fn(FetchProgress),
{
    info!("Resolving {}", channel);
    let entity = provider
        .get_entity(channel)
        .await
        .map_err(|e| Error::ResolutionFailed(cause(e)))?;

    // Newest id approximates the message count; deleted messages make it over-count
    let estimated_total = provider
        .latest_message_id(&entity)
        .await
        .map_err(|e| Error::Interrupted(cause(e)))?
        .map(|id| id.max(0) as usize)
        .unwrap_or(0);

    if estimated_total == 0 {
        info!("Downloading history of {} (total unknown)", channel);
    } else {
        info!(
            "Downloading history of {} (about {} messages)",
            channel, estimated_total
        );
    }

    // Keyed by id so the corpus comes out oldest first whatever order the provider uses
    let mut texts: BTreeMap<i32, String> = BTreeMap::new();
    let mut progress = FetchProgress::new(0, estimated_total);
    let mut cursor = provider.messages(&entity);

    loop {
        if cancel.is_cancelled() {
            info!("Download of {} cancelled after {} messages", channel, progress.seen);
            return Err(Error::Interrupted("cancelled".to_string()));
        }

        let Some(message) = cursor.next().await.map_err(|e| Error::Interrupted(cause(e)))?
        else {
            break;
        };

        progress = FetchProgress::new(progress.seen + 1, estimated_total);

        if !message.text.is_empty() {
            debug!(
                "Message {}: {:?}",
                message.id,
                crate::utils::brief_content(&message.text, 40)
            );
            texts.insert(message.id, message.text);
        }

        if let Some(ref callback) = progress_callback {
            callback(progress);
        }

        if progress.seen.is_multiple_of(FETCH_LOG_BATCH_SIZE) {
            info!("Update: fetched {} messages", progress.seen);
        }
    }

    info!(
        "Download complete for {}: fetched {}, {} with text",
        channel,
        progress.seen,
        texts.len()
    );

    Ok(FetchOutcome {
        corpus: TextCorpus::new(texts.into_values().collect()),
        progress,
    })
}

/// Unwrap the message of errors that are already fetch-level so causes don't nest
fn cause(e: Error) -> String {
    match e {
        Error::ResolutionFailed(msg) | Error::Interrupted(msg) | Error::Telegram(msg) => msg,
        other => other.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Provider over a fixed message list; `fail_after` injects a mid-stream error
    /// and `fail_latest` makes the newest-message lookup fail
    pub(crate) struct MockHistory {
        pub known: Vec<ChannelRef>,
        pub messages: Vec<HistoryMessage>,
        pub fail_after: Option<usize>,
        pub fail_latest: bool,
    }

    impl MockHistory {
        pub(crate) fn new(channel: ChannelRef, messages: Vec<(i32, &str)>) -> Self {
            Self {
                known: vec![channel],
                messages: messages
                    .into_iter()
                    .map(|(id, text)| HistoryMessage {
                        id,
                        text: text.to_string(),
                    })
                    .collect(),
                fail_after: None,
                fail_latest: false,
            }
        }
    }

    pub(crate) struct MockCursor {
        queue: VecDeque<HistoryMessage>,
        served: usize,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl MessageCursor for MockCursor {
        async fn next(&mut self) -> Result<Option<HistoryMessage>> {
            if self.fail_after == Some(self.served) {
                return Err(Error::Telegram("connection reset".to_string()));
            }
            self.served += 1;
            Ok(self.queue.pop_front())
        }
    }

    #[async_trait]
    impl HistoryProvider for MockHistory {
        type Entity = ChannelRef;
        type Cursor = MockCursor;

        async fn get_entity(&self, channel: &ChannelRef) -> Result<ChannelRef> {
            if self.known.contains(channel) {
                Ok(channel.clone())
            } else {
                Err(Error::Telegram(format!("No such chat: {}", channel)))
            }
        }

        async fn latest_message_id(&self, _entity: &ChannelRef) -> Result<Option<i32>> {
            if self.fail_latest {
                return Err(Error::Telegram("FLOOD_WAIT_30".to_string()));
            }
            Ok(self.messages.iter().map(|m| m.id).max())
        }

        fn messages(&self, _entity: &ChannelRef) -> MockCursor {
            // Newest first, like the Telegram API
            let mut queue: Vec<HistoryMessage> = self.messages.clone();
            queue.sort_by(|a, b| b.id.cmp(&a.id));
            MockCursor {
                queue: queue.into(),
                served: 0,
                fail_after: self.fail_after,
            }
        }
    }

    fn channel() -> ChannelRef {
        ChannelRef::Username("examplechannel".to_string())
    }

    async fn fetch_collecting(
        provider: &MockHistory,
        channel: &ChannelRef,
    ) -> (Result<FetchOutcome>, Vec<FetchProgress>) {
        let events = Mutex::new(Vec::new());
        let result = fetch_history(
            provider,
            channel,
            Some(|p: FetchProgress| events.lock().unwrap().push(p)),
            &CancelFlag::new(),
        )
        .await;
        (result, events.into_inner().unwrap())
    }

    #[tokio::test]
    async fn test_fetch_skips_empty_messages() {
        let provider = MockHistory::new(channel(), vec![(1, "hello world"), (2, ""), (3, "")]);
        let (result, events) = fetch_collecting(&provider, &channel()).await;
        let outcome = result.unwrap();

        assert_eq!(outcome.corpus.joined(), "hello world");
        assert_eq!(outcome.progress.seen, 3);
        assert_eq!(outcome.progress.percent, Some(100));
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn test_fetch_progress_is_monotonic() {
        let messages: Vec<(i32, &str)> = (1..=7).map(|id| (id, "text")).collect();
        let provider = MockHistory::new(channel(), messages);
        let (result, events) = fetch_collecting(&provider, &channel()).await;
        result.unwrap();

        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.seen, i + 1);
            assert_eq!(event.estimated_total, 7);
        }
        for pair in events.windows(2) {
            assert!(pair[0].percent <= pair[1].percent);
        }
        assert_eq!(events.last().unwrap().percent, Some(100));
    }

    #[tokio::test]
    async fn test_fetch_orders_oldest_first() {
        let provider = MockHistory::new(
            channel(),
            vec![(10, "third"), (2, "first"), (5, "second")],
        );
        let (result, _) = fetch_collecting(&provider, &channel()).await;
        let outcome = result.unwrap();
        assert_eq!(outcome.corpus.messages(), ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_fetch_deleted_messages_keep_estimate() {
        // Ids 2..=9 were deleted, so the estimate of 10 over-counts
        let provider = MockHistory::new(channel(), vec![(1, "a"), (10, "b")]);
        let (result, _) = fetch_collecting(&provider, &channel()).await;
        let outcome = result.unwrap();
        assert_eq!(outcome.progress.seen, 2);
        assert_eq!(outcome.progress.estimated_total, 10);
        assert_eq!(outcome.progress.percent, Some(20));
    }

    #[tokio::test]
    async fn test_fetch_empty_chat_has_no_percentage() {
        let provider = MockHistory::new(channel(), vec![]);
        let (result, events) = fetch_collecting(&provider, &channel()).await;
        let outcome = result.unwrap();
        assert!(outcome.corpus.is_empty());
        assert_eq!(outcome.progress.seen, 0);
        assert_eq!(outcome.progress.percent, None);
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_unknown_channel() {
        let provider = MockHistory::new(channel(), vec![(1, "hi")]);
        let other = ChannelRef::Username("missing".to_string());
        let (result, events) = fetch_collecting(&provider, &other).await;
        assert!(matches!(result, Err(Error::ResolutionFailed(_))));
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_latest_message_failure_is_interrupted() {
        let mut provider = MockHistory::new(channel(), vec![(1, "a")]);
        provider.fail_latest = true;
        let (result, events) = fetch_collecting(&provider, &channel()).await;
        match result {
            Err(Error::Interrupted(msg)) => assert_eq!(msg, "FLOOD_WAIT_30"),
            other => panic!("expected Interrupted, got {:?}", other),
        }
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_keeps_duplicate_ids_once() {
        let provider = MockHistory::new(
            channel(),
            vec![(2, "second"), (1, "first"), (2, "second")],
        );
        let (result, events) = fetch_collecting(&provider, &channel()).await;
        let outcome = result.unwrap();
        assert_eq!(outcome.corpus.messages(), ["first", "second"]);
        assert_eq!(outcome.progress.seen, 3);
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn test_fetch_interrupted_mid_stream() {
        let mut provider = MockHistory::new(channel(), vec![(1, "a"), (2, "b"), (3, "c")]);
        provider.fail_after = Some(2);
        let (result, events) = fetch_collecting(&provider, &channel()).await;
        match result {
            Err(Error::Interrupted(msg)) => assert_eq!(msg, "connection reset"),
            other => panic!("expected Interrupted, got {:?}", other),
        }
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_cancelled() {
        let provider = MockHistory::new(channel(), vec![(1, "a"), (2, "b")]);
        let cancel = CancelFlag::new();
        let flag = cancel.clone();
        let result = fetch_history(
            &provider,
            &channel(),
            Some(move |_: FetchProgress| flag.cancel()),
            &cancel,
        )
        .await;
        assert!(matches!(result, Err(Error::Interrupted(msg)) if msg == "cancelled"));
    }
}
