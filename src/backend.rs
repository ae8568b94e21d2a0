//! Telegram access through grammers
//!
//! Implements [`AuthProvider`] and [`HistoryProvider`] on top of a
//! grammers [`Client`].

/// Messages pulled per history request
const PAGE_SIZE: usize = 100;

use crate::history::{HistoryProvider, MessageCursor};
use crate::session::{AuthProvider, CodeOutcome};
use crate::types::{ChannelRef, Error, HistoryMessage, Result};
use crate::utils::get_share_id;
use async_trait::async_trait;
use grammers_client::types::{LoginToken, PasswordToken, Peer};
use grammers_client::{Client, SignInError};
use std::collections::VecDeque;
use tracing::{debug, info};

/// Signed-in (or signing-in) Telegram client
pub struct TelegramClient {
    client: Client,
    api_hash: String,
}

impl TelegramClient {
    pub fn new(client: Client, api_hash: String) -> Self {
        Self { client, api_hash }
    }

    /// Find the dialog whose Bot API id is exactly `dialog_id`
    async fn find_peer_in_dialogs(&self, dialog_id: i64) -> Result<Option<Peer>> {
        let mut dialogs = self.client.iter_dialogs();

        while let Some(dialog) = dialogs
            .next()
            .await
            .map_err(|e| Error::Telegram(format!("Failed to iterate dialogs: {}", e)))?
        {
            let peer = dialog.peer();
            if is_dialog(peer.id().bot_api_dialog_id(), dialog_id) {
                return Ok(Some(peer.clone()));
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl AuthProvider for TelegramClient {
    type LoginToken = LoginToken;
    type PasswordToken = PasswordToken;

    async fn is_authorized(&self) -> Result<bool> {
        self.client
            .is_authorized()
            .await
            .map_err(|e| Error::Telegram(format!("Failed to check authorization: {}", e)))
    }

    async fn request_code(&self, phone: &str) -> Result<LoginToken> {
        self.client
            .request_login_code(phone, &self.api_hash)
            .await
            .map_err(|e| Error::AuthFailed(format!("Failed to request login code: {}", e)))
    }

    async fn submit_code(
        &self,
        token: &LoginToken,
        code: &str,
    ) -> Result<CodeOutcome<PasswordToken>> {
        match self.client.sign_in(token, code).await {
            Ok(_) => Ok(CodeOutcome::SignedIn),
            Err(SignInError::PasswordRequired(password_token)) => {
                let hint = password_token.hint().map(str::to_string);
                Ok(CodeOutcome::PasswordRequired {
                    token: password_token,
                    hint,
                })
            }
            Err(e) => Err(Error::AuthFailed(e.to_string())),
        }
    }

    async fn submit_password(&self, token: PasswordToken, password: &str) -> Result<()> {
        self.client
            .check_password(token, password)
            .await
            .map(|_| ())
            .map_err(|e| Error::AuthFailed(format!("Password authentication failed: {}", e)))
    }
}

#[async_trait]
impl HistoryProvider for TelegramClient {
    type Entity = Peer;
    type Cursor = TelegramCursor;

    async fn get_entity(&self, channel: &ChannelRef) -> Result<Peer> {
        let peer = match channel {
            ChannelRef::Username(username) => self
                .client
                .resolve_username(username)
                .await
                .map_err(|e| Error::Telegram(format!("Failed to resolve username: {}", e)))?
                .ok_or_else(|| {
                    Error::ResolutionFailed(format!("No chat with username @{}", username))
                })?,
            ChannelRef::NumericId(id) => {
                self.find_peer_in_dialogs(*id).await?.ok_or_else(|| {
                    Error::ResolutionFailed(format!(
                        "Chat {} not found in dialogs. Make sure you have access to this chat.",
                        get_share_id(*id)
                    ))
                })?
            }
        };

        info!(
            "Resolved {} to \"{}\"",
            channel,
            peer.name().unwrap_or("unnamed chat")
        );
        Ok(peer)
    }

    async fn latest_message_id(&self, entity: &Peer) -> Result<Option<i32>> {
        // Iteration starts at the newest message
        let mut messages = self.client.iter_messages(entity).limit(1);
        let newest = messages
            .next()
            .await
            .map_err(|e| Error::Telegram(format!("Failed to get latest message: {}", e)))?;
        Ok(newest.map(|m| m.id()))
    }

    fn messages(&self, entity: &Peer) -> TelegramCursor {
        TelegramCursor {
            client: self.client.clone(),
            peer: entity.clone(),
            offset_id: 0,
            buffer: VecDeque::with_capacity(PAGE_SIZE),
            exhausted: false,
        }
    }
}

/// Users, basic groups and channels share id digits, so only the full
/// dialog id identifies a chat
fn is_dialog(candidate: i64, dialog_id: i64) -> bool {
    candidate == dialog_id
}

/// Pages through a chat's history, newest to oldest
pub struct TelegramCursor {
    client: Client,
    peer: Peer,

    /// Next page starts below this message id (0 = from the newest)
    offset_id: i32,
    buffer: VecDeque<HistoryMessage>,
    exhausted: bool,
}

impl TelegramCursor {
    async fn fetch_page(&mut self) -> Result<()> {
        let mut messages = self
            .client
            .iter_messages(&self.peer)
            .offset_id(self.offset_id)
            .limit(PAGE_SIZE);
        let mut fetched = 0;

        while fetched < PAGE_SIZE {
            let Some(message) = messages
                .next()
                .await
                .map_err(|e| Error::Telegram(format!("Failed to iterate messages: {}", e)))?
            else {
                self.exhausted = true;
                break;
            };

            fetched += 1;
            self.offset_id = message.id();
            self.buffer.push_back(HistoryMessage {
                id: message.id(),
                text: message.text().to_string(),
            });
        }

        debug!(
            "Fetched page of {} messages (down to msg_id {})",
            fetched, self.offset_id
        );
        Ok(())
    }
}

#[async_trait]
impl MessageCursor for TelegramCursor {
    async fn next(&mut self) -> Result<Option<HistoryMessage>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_page().await?;
        }
        Ok(self.buffer.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::channel_dialog_id;

    #[test]
    fn test_private_link_matches_only_its_channel() {
        let channel = channel_dialog_id(123456789).unwrap();
        assert_eq!(channel, -1000123456789);

        assert!(is_dialog(-1000123456789, channel));
        // Same digits, different chats
        assert!(!is_dialog(123456789, channel));
        assert!(!is_dialog(-123456789, channel));
        assert_eq!(get_share_id(123456789), get_share_id(channel));
    }
}
