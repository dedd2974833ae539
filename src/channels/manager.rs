//! Fan-in of every registered channel into one message stream.

use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::error::ChannelError;

#[derive(Default)]
pub struct ChannelManager {
    channels: Vec<Arc<dyn Channel>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, channel: Arc<dyn Channel>) {
        tracing::info!(channel = %channel.name(), "Registered channel");
        self.channels.push(channel);
    }

    pub fn names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name().to_string()).collect()
    }

    fn get(&self, name: &str) -> Option<&Arc<dyn Channel>> {
        self.channels.iter().find(|c| c.name() == name)
    }

    /// Start every channel and merge their streams. A channel that fails to
    /// start is logged and skipped; it is an error only if none start.
    pub async fn start_all(&self) -> Result<MessageStream, ChannelError> {
        let mut streams = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            match channel.start().await {
                Ok(stream) => {
                    tracing::info!(channel = %channel.name(), "Channel started");
                    streams.push(stream);
                }
                Err(e) => tracing::error!(channel = %channel.name(), "Channel failed to start: {e}"),
            }
        }

        if streams.is_empty() {
            return Err(ChannelError::StartupFailed {
                name: "all".into(),
                reason: "no channel could be started".into(),
            });
        }
        Ok(Box::pin(stream::select_all(streams)))
    }

    /// Route a response to the channel the message arrived on.
    pub async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let channel = self
            .get(&msg.channel)
            .ok_or_else(|| ChannelError::UnknownChannel {
                name: msg.channel.clone(),
            })?;
        channel.respond(msg, response).await
    }

    pub async fn health_check_all(&self) {
        for channel in &self.channels {
            if let Err(e) = channel.health_check().await {
                tracing::warn!(channel = %channel.name(), "Health check failed: {e}");
            }
        }
    }

    pub async fn shutdown_all(&self) {
        for channel in &self.channels {
            if let Err(e) = channel.shutdown().await {
                tracing::warn!(channel = %channel.name(), "Channel shutdown failed: {e}");
            }
        }
    }
}
