//! Channel trait and the message types that cross it.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use uuid::Uuid;

use crate::error::ChannelError;

/// A message received from a remote user.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Name of the channel it arrived on.
    pub channel: String,
    /// Stable identifier of the remote user on that channel.
    pub user_id: String,
    pub user_name: Option<String>,
    pub content: String,
    pub received_at: DateTime<Utc>,
    /// Channel-specific routing data (e.g. Telegram `chat_id`).
    pub metadata: serde_json::Value,
}

impl IncomingMessage {
    pub fn new(
        channel: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.into(),
            user_id: user_id.into(),
            user_name: None,
            content: content.into(),
            received_at: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    /// Session key: users on different channels never share a session.
    pub fn session_key(&self) -> String {
        format!("{}:{}", self.channel, self.user_id)
    }
}

/// Response keyboard attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyMarkup {
    /// One button per option.
    Options(Vec<String>),
    /// Hide any keyboard shown earlier.
    Remove,
}

/// A message to send back to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingResponse {
    pub content: String,
    pub markup: Option<ReplyMarkup>,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            markup: None,
        }
    }

    /// Attach response options; an empty list removes the keyboard.
    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.markup = Some(if options.is_empty() {
            ReplyMarkup::Remove
        } else {
            ReplyMarkup::Options(options)
        });
        self
    }

    pub fn options(&self) -> &[String] {
        match &self.markup {
            Some(ReplyMarkup::Options(options)) => options,
            _ => &[],
        }
    }
}

pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A transport that delivers user messages and sends replies.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Begin receiving messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Send one response to the originator of `msg`.
    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
