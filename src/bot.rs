//! Main bot loop.
//!
//! Every `(channel, user)` pair gets its own lane: a task fed by a queue,
//! so one user's messages are handled in arrival order while different
//! users are handled in parallel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::channels::{ChannelManager, IncomingMessage};
use crate::dispatcher::Dispatcher;
use crate::error::ChannelError;

/// How long in-flight events may run after shutdown begins.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct SurveyBot {
    dispatcher: Arc<Dispatcher>,
    channels: Arc<ChannelManager>,
}

impl SurveyBot {
    pub fn new(dispatcher: Arc<Dispatcher>, channels: ChannelManager) -> Self {
        Self {
            dispatcher,
            channels: Arc::new(channels),
        }
    }

    /// Run until Ctrl+C or until every channel stream ends.
    pub async fn run(self) -> Result<(), ChannelError> {
        let mut message_stream = self.channels.start_all().await?;
        let mut lanes: HashMap<String, mpsc::UnboundedSender<IncomingMessage>> = HashMap::new();
        let mut tasks = JoinSet::new();

        tracing::info!(channels = ?self.channels.names(), "Survey bot ready and listening");

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                msg = message_stream.next() => {
                    match msg {
                        Some(m) => m,
                        None => {
                            tracing::info!("All channel streams ended, shutting down...");
                            break;
                        }
                    }
                }
            };

            let key = message.session_key();
            let message = match lanes.get(&key) {
                Some(lane) => match lane.send(message) {
                    Ok(()) => continue,
                    // Lane exited; start a fresh one with the same message.
                    Err(mpsc::error::SendError(message)) => message,
                },
                None => message,
            };

            let (tx, rx) = mpsc::unbounded_channel();
            tracing::debug!(lane = %key, "Opening user lane");
            tasks.spawn(run_lane(
                key.clone(),
                Arc::clone(&self.dispatcher),
                Arc::clone(&self.channels),
                rx,
            ));
            if tx.send(message).is_err() {
                tracing::warn!(lane = %key, "User lane closed before first message");
            }
            lanes.insert(key, tx);
        }

        // Closing the queues lets each lane finish what it already received.
        drop(lanes);
        let drain = async { while tasks.join_next().await.is_some() {} };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            tracing::warn!("User lanes still busy after {SHUTDOWN_GRACE:?}, aborting them");
        }

        tracing::info!("Survey bot shutting down...");
        self.channels.shutdown_all().await;
        Ok(())
    }
}

/// Handle one user's messages strictly in order.
async fn run_lane(
    key: String,
    dispatcher: Arc<Dispatcher>,
    channels: Arc<ChannelManager>,
    mut rx: mpsc::UnboundedReceiver<IncomingMessage>,
) {
    while let Some(message) = rx.recv().await {
        let replies = dispatcher.handle_event(&key, &message.content).await;
        for reply in replies {
            if let Err(e) = channels.respond(&message, reply).await {
                tracing::warn!(lane = %key, "Failed to deliver reply: {e}");
                break;
            }
        }
    }
    tracing::debug!(lane = %key, "User lane closed");
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use futures::stream;
    use tokio::sync::Mutex;

    use super::*;
    use crate::channels::{Channel, MessageStream, OutgoingResponse};
    use crate::llm::{BackendCatalog, BackendRegistry, STATIC_BACKEND, StaticBackend, StaticLoader};
    use crate::survey::steps::tests::sample_json;
    use crate::survey::{StepRegistry, SurveyState};

    /// Channel that replays a fixed inbox and records replies per user.
    struct ScriptedChannel {
        inbox: Vec<(&'static str, &'static str)>,
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Channel for ScriptedChannel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn start(&self) -> Result<MessageStream, ChannelError> {
            let messages: Vec<IncomingMessage> = self
                .inbox
                .iter()
                .map(|(user, text)| IncomingMessage::new("scripted", *user, *text))
                .collect();
            Ok(Box::pin(stream::iter(messages)))
        }

        async fn respond(
            &self,
            msg: &IncomingMessage,
            response: OutgoingResponse,
        ) -> Result<(), ChannelError> {
            self.sent
                .lock()
                .await
                .push((msg.user_id.clone(), response.content));
            Ok(())
        }

        async fn health_check(&self) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    fn dispatcher() -> Arc<Dispatcher> {
        let steps = StepRegistry::from_json(&sample_json(), "test").unwrap();
        let catalog = BackendCatalog::new()
            .with(STATIC_BACKEND, Arc::new(StaticLoader::new(STATIC_BACKEND)));
        let registry = BackendRegistry::new(
            Arc::new(StaticBackend::new(STATIC_BACKEND)),
            catalog,
            Duration::from_secs(1),
        );
        Arc::new(Dispatcher::new(Arc::new(steps), Arc::new(registry)))
    }

    #[tokio::test]
    async fn interleaved_users_are_handled_in_order_per_user() {
        let channel = Arc::new(ScriptedChannel {
            inbox: vec![
                ("alice", "/start"),
                ("bob", "/start"),
                ("alice", "Weekly"),
                ("bob", "Daily"),
                ("alice", "Yes"),
            ],
            sent: Mutex::new(vec![]),
        });
        let mut channels = ChannelManager::new();
        channels.add(channel.clone());
        let dispatcher = dispatcher();

        tokio::time::timeout(
            Duration::from_secs(5),
            SurveyBot::new(Arc::clone(&dispatcher), channels).run(),
        )
        .await
        .expect("bot should stop when the inbox is drained")
        .unwrap();

        let sessions = dispatcher.sessions();
        let alice = sessions.snapshot("scripted:alice").await.unwrap();
        let bob = sessions.snapshot("scripted:bob").await.unwrap();
        assert_eq!(alice.survey_state(), SurveyState::AwaitingDeliverySpeed);
        assert_eq!(bob.survey_state(), SurveyState::AwaitingOrderProcess);

        let sent = channel.sent.lock().await;
        let alice_replies: Vec<&str> = sent
            .iter()
            .filter(|(user, _)| user == "alice")
            .map(|(_, text)| text.as_str())
            .collect();
        assert_eq!(
            alice_replies,
            vec![
                "Hi! A few questions about your deliveries.",
                "How often do you order?",
                "Was ordering convenient?",
                "How fast was the delivery?",
            ]
        );
    }
}
