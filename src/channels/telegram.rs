//! Telegram channel: long-polls the Bot API for updates.
//!
//! Replies carry a reply keyboard built from the step's response options;
//! steps without options remove any keyboard left from the previous one.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse, ReplyMarkup};
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Commands advertised in the Telegram client menu.
const BOT_COMMANDS: [(&str, &str); 2] = [
    ("start", "Start the delivery survey"),
    ("model", "Choose the text generation backend"),
];

pub struct TelegramChannel {
    bot_token: String,
    allowed_users: Vec<String>,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: String, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowed_users,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.bot_token, method)
    }

    /// Check if a username or id is in the allowed list.
    pub fn is_user_allowed(&self, identity: &str) -> bool {
        check_user_allowed(&self.allowed_users, [identity])
    }

    /// Publish the command menu. Failure is logged and otherwise ignored.
    async fn register_commands(&self) {
        let commands: Vec<Value> = BOT_COMMANDS
            .iter()
            .map(|(command, description)| json!({"command": command, "description": description}))
            .collect();
        let result = self
            .client
            .post(self.api_url("setMyCommands"))
            .json(&json!({ "commands": commands }))
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!("Telegram command menu registered");
            }
            Ok(resp) => tracing::warn!(status = ?resp.status(), "Telegram setMyCommands rejected"),
            Err(e) => tracing::warn!("Telegram setMyCommands failed: {e}"),
        }
    }

    /// Send a text message, splitting at Telegram's limit. The keyboard rides
    /// on the last chunk so it sits under the question.
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        markup: Option<&ReplyMarkup>,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let markup = if i == last { markup } else { None };
            self.send_message_chunk(chat_id, chunk, markup).await?;
        }
        Ok(())
    }

    /// Send a single message chunk, Markdown-first with plain-text fallback.
    async fn send_message_chunk(
        &self,
        chat_id: &str,
        text: &str,
        markup: Option<&ReplyMarkup>,
    ) -> Result<(), ChannelError> {
        let markdown_body = message_body(chat_id, text, markup, Some("Markdown"));
        let markdown_resp = self.post_send_message(&markdown_body).await?;
        if markdown_resp.status().is_success() {
            return Ok(());
        }

        let markdown_status = markdown_resp.status();
        tracing::warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        let plain_body = message_body(chat_id, text, markup, None);
        let plain_resp = self.post_send_message(&plain_body).await?;
        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!(
                    "sendMessage failed (markdown: {}, plain: {})",
                    markdown_status, plain_err
                ),
            });
        }
        Ok(())
    }

    async fn post_send_message(&self, body: &Value) -> Result<reqwest::Response, ChannelError> {
        self.client
            .post(self.api_url("sendMessage"))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        self.register_commands().await;

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let bot_token = self.bot_token.clone();
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for messages...");

            loop {
                let body = json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message"]
                });

                let resp = match client
                    .post(api_url(&bot_token, "getUpdates"))
                    .json(&body)
                    .send()
                    .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let results = match update_batch(&data) {
                    Ok(results) => results,
                    Err(description) => {
                        tracing::warn!("Telegram getUpdates rejected: {description}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };
                for update in results {
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }
                    let Some(incoming) = parse_update(update, &allowed_users) else {
                        continue;
                    };
                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let chat_id = msg
            .metadata
            .get("chat_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: "No chat_id in message metadata".into(),
            })?;

        self.send_message(chat_id, &response.content, response.markup.as_ref())
            .await
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|_| ChannelError::HealthCheckFailed {
                name: "telegram".into(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            tracing::warn!(status = ?resp.status(), "Telegram getMe failed");
            Err(ChannelError::HealthCheckFailed {
                name: "telegram".into(),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn api_url(bot_token: &str, method: &str) -> String {
    format!("https://api.telegram.org/bot{bot_token}/{method}")
}

/// Turn one `getUpdates` entry into a message, dropping non-text updates
/// and senders outside the allowlist.
/// Updates from a `getUpdates` reply, or Telegram's description when it
/// answered `"ok": false` (bad token, a second poller on the same bot).
fn update_batch(data: &Value) -> Result<&[Value], String> {
    if data.get("ok").and_then(Value::as_bool) == Some(false) {
        let description = data
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("no description");
        return Err(description.to_string());
    }
    Ok(data
        .get("result")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default())
}

fn parse_update(update: &Value, allowed_users: &[String]) -> Option<IncomingMessage> {
    let message = update.get("message")?;
    let text = message.get("text").and_then(Value::as_str)?;

    let from = message.get("from");
    let username = from
        .and_then(|f| f.get("username"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let user_id = from
        .and_then(|f| f.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string());

    let mut identities = vec![username];
    if let Some(id) = user_id.as_deref() {
        identities.push(id);
    }
    if !check_user_allowed(allowed_users, identities) {
        tracing::warn!(
            "Telegram: ignoring message from unauthorized user: \
             username={username}, user_id={}",
            user_id.as_deref().unwrap_or("unknown")
        );
        return None;
    }

    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string())
        .unwrap_or_default();
    let display_name = from
        .and_then(|f| f.get("first_name"))
        .and_then(Value::as_str)
        .unwrap_or(username);

    Some(
        IncomingMessage::new("telegram", user_id.as_deref().unwrap_or(username), text)
            .with_metadata(json!({
                "chat_id": chat_id,
                "username": username,
            }))
            .with_user_name(display_name),
    )
}

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// Telegram `reply_markup` object: all options on one row, hidden after use.
fn reply_markup_json(markup: &ReplyMarkup) -> Value {
    match markup {
        ReplyMarkup::Options(options) => {
            let row: Vec<Value> = options.iter().map(|o| json!({ "text": o })).collect();
            json!({
                "keyboard": [row],
                "resize_keyboard": true,
                "one_time_keyboard": true,
            })
        }
        ReplyMarkup::Remove => json!({ "remove_keyboard": true }),
    }
}

fn message_body(
    chat_id: &str,
    text: &str,
    markup: Option<&ReplyMarkup>,
    parse_mode: Option<&str>,
) -> Value {
    let mut body = json!({
        "chat_id": chat_id,
        "text": text,
    });
    if let Some(mode) = parse_mode {
        body["parse_mode"] = json!(mode);
    }
    if let Some(markup) = markup {
        body["reply_markup"] = reply_markup_json(markup);
    }
    body
}

/// Split a message into chunks of at most `max_len` characters.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    loop {
        let Some((limit, _)) = remaining.char_indices().nth(max_len) else {
            chunks.push(remaining.to_string());
            break;
        };

        let window = &remaining[..limit];
        let split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(limit);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
        if remaining.is_empty() {
            break;
        }
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_poll_reports_description() {
        let data = serde_json::json!({
            "ok": false,
            "error_code": 409,
            "description": "Conflict: terminated by other getUpdates request"
        });
        let err = update_batch(&data).unwrap_err();
        assert!(err.starts_with("Conflict"));
    }

    #[test]
    fn poll_results_are_returned_in_order() {
        let data = serde_json::json!({
            "ok": true,
            "result": [{"update_id": 7}, {"update_id": 8}]
        });
        let updates = update_batch(&data).unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1]["update_id"], 8);
        assert!(update_batch(&serde_json::json!({"ok": true})).unwrap().is_empty());
    }

    fn update(username: &str, id: i64, text: &str) -> Value {
        json!({
            "update_id": 7,
            "message": {
                "text": text,
                "chat": {"id": 555},
                "from": {"id": id, "username": username, "first_name": "Ann"}
            }
        })
    }

    #[test]
    fn telegram_channel_name() {
        let ch = TelegramChannel::new("fake-token".into(), vec!["*".into()]);
        assert_eq!(ch.name(), "telegram");
    }

    #[test]
    fn telegram_api_url() {
        let ch = TelegramChannel::new("123:ABC".into(), vec![]);
        assert_eq!(
            ch.api_url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
    }

    // ── User allowlist tests ────────────────────────────────────────

    #[test]
    fn telegram_user_allowed_wildcard() {
        let ch = TelegramChannel::new("t".into(), vec!["*".into()]);
        assert!(ch.is_user_allowed("anyone"));
    }

    #[test]
    fn telegram_user_allowed_specific() {
        let ch = TelegramChannel::new("t".into(), vec!["alice".into(), "bob".into()]);
        assert!(ch.is_user_allowed("alice"));
        assert!(!ch.is_user_allowed("eve"));
        assert!(!ch.is_user_allowed("Alice"));
    }

    #[test]
    fn telegram_user_denied_empty() {
        let ch = TelegramChannel::new("t".into(), vec![]);
        assert!(!ch.is_user_allowed("anyone"));
    }

    // ── Update parsing ──────────────────────────────────────────────

    #[test]
    fn update_becomes_message_keyed_by_numeric_id() {
        let msg = parse_update(&update("ann", 42, "Weekly"), &["*".into()]).unwrap();
        assert_eq!(msg.channel, "telegram");
        assert_eq!(msg.user_id, "42");
        assert_eq!(msg.content, "Weekly");
        assert_eq!(msg.user_name.as_deref(), Some("Ann"));
        assert_eq!(msg.metadata["chat_id"], "555");
    }

    #[test]
    fn update_allowed_by_numeric_id() {
        assert!(parse_update(&update("ann", 42, "hi"), &["42".into()]).is_some());
        assert!(parse_update(&update("ann", 42, "hi"), &["bob".into()]).is_none());
    }

    #[test]
    fn non_text_update_is_skipped() {
        let sticker = json!({"update_id": 1, "message": {"chat": {"id": 1}, "sticker": {}}});
        assert!(parse_update(&sticker, &["*".into()]).is_none());
    }

    // ── Reply markup ────────────────────────────────────────────────

    #[test]
    fn options_become_one_keyboard_row() {
        let markup = ReplyMarkup::Options(vec!["Daily".into(), "Weekly".into()]);
        let body = message_body("1", "How often?", Some(&markup), Some("Markdown"));
        assert_eq!(body["parse_mode"], "Markdown");
        assert_eq!(
            body["reply_markup"]["keyboard"],
            json!([[{"text": "Daily"}, {"text": "Weekly"}]])
        );
        assert_eq!(body["reply_markup"]["one_time_keyboard"], true);
    }

    #[test]
    fn remove_markup_hides_keyboard() {
        let body = message_body("1", "Thanks", Some(&ReplyMarkup::Remove), None);
        assert_eq!(body["reply_markup"], json!({"remove_keyboard": true}));
        assert!(body.get("parse_mode").is_none());
    }

    #[test]
    fn no_markup_leaves_keyboard_alone() {
        let body = message_body("1", "Hi", None, None);
        assert!(body.get("reply_markup").is_none());
    }

    // ── Message splitting tests ─────────────────────────────────────

    #[test]
    fn split_message_short() {
        let chunks = split_message("Hello", 4096);
        assert_eq!(chunks, vec!["Hello"]);
    }

    #[test]
    fn split_message_exact_limit() {
        let msg = "a".repeat(4096);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 4096);
    }

    #[test]
    fn split_message_over_limit_on_newline() {
        let msg = format!("{}\n{}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks, vec!["a".repeat(2000), "b".repeat(3000)]);
    }

    #[test]
    fn split_message_no_good_split_point() {
        let msg = "a".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }

    #[test]
    fn split_message_counts_characters_not_bytes() {
        let msg = "ж".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 4096);
        assert_eq!(chunks[1].chars().count(), 904);
    }
}
