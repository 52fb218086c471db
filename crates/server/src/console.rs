//! JSON-lines chat transport for local runs.
//!
//! Each input line is one envelope:
//!
//! ```text
//! {"id":"1","type":"chat_created","chat_id":"c1","user_id":"u1"}
//! {"id":"2","type":"message","chat_id":"c1","user_id":"u1","username":"ivan","body":"/create-request"}
//! {"id":"3","type":"message","chat_id":"c1","user_id":"u1","body":"","attachment":{"filename":"log.txt","content_base64":"aGVsbG8="}}
//! ```
//!
//! Replies are written to the output as serialized `OutgoingMessage` lines.

use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::Mutex;
use tracing::warn;

use deskbot_chat::events::ChatCreatedEvent;
use deskbot_chat::{
    ChatEnvelope, ChatEvent, ChatTransport, IncomingAttachment, IncomingMessage, OutgoingMessage,
    Sender, TransportError,
};
use deskbot_core::domain::conversation::UserId;

pub type ConsoleTransport = LineTransport<BufReader<tokio::io::Stdin>, tokio::io::Stdout>;

pub fn console_transport(bot_id: impl Into<String>, host: impl Into<String>) -> ConsoleTransport {
    LineTransport::new(bot_id, host, BufReader::new(tokio::io::stdin()), tokio::io::stdout())
}

#[derive(Debug, Deserialize)]
struct WireEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    chat_id: Option<String>,
    user_id: Option<String>,
    username: Option<String>,
    platform: Option<String>,
    host: Option<String>,
    #[serde(default)]
    body: String,
    attachment: Option<WireAttachment>,
}

#[derive(Debug, Deserialize)]
struct WireAttachment {
    filename: String,
    content_base64: String,
}

/// Senders without a `host` field are attributed to the bot's own host.
pub struct LineTransport<R, W> {
    bot_id: String,
    host: String,
    lines: Mutex<Lines<R>>,
    writer: Mutex<W>,
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(bot_id: impl Into<String>, host: impl Into<String>, reader: R, writer: W) -> Self {
        Self {
            bot_id: bot_id.into(),
            host: host.into(),
            lines: Mutex::new(reader.lines()),
            writer: Mutex::new(writer),
        }
    }

    #[cfg(test)]
    pub fn into_writer(self) -> W {
        self.writer.into_inner()
    }

    fn decode(&self, line: &str) -> Result<ChatEnvelope, String> {
        let wire: WireEnvelope = serde_json::from_str(line).map_err(|error| error.to_string())?;
        let event = match wire.event_type.as_str() {
            "message" => {
                let chat_id = wire.chat_id.ok_or("message without chat_id")?;
                let user_id = wire.user_id.ok_or("message without user_id")?;
                let attachment = wire
                    .attachment
                    .map(|attachment| {
                        base64::engine::general_purpose::STANDARD
                            .decode(attachment.content_base64.as_bytes())
                            .map(|content| IncomingAttachment {
                                filename: attachment.filename,
                                content,
                            })
                            .map_err(|error| format!("attachment is not base64: {error}"))
                    })
                    .transpose()?;

                ChatEvent::Message(IncomingMessage {
                    bot_id: self.bot_id.clone(),
                    chat_id,
                    sender: Sender {
                        user_id: UserId(user_id),
                        username: wire.username,
                        platform: wire.platform,
                        host: Some(wire.host.unwrap_or_else(|| self.host.clone())),
                    },
                    body: wire.body,
                    attachment,
                })
            }
            "chat_created" => ChatEvent::ChatCreated(ChatCreatedEvent {
                bot_id: self.bot_id.clone(),
                chat_id: wire.chat_id.ok_or("chat_created without chat_id")?,
                creator_id: wire.user_id.map(UserId),
            }),
            other => ChatEvent::Unsupported { event_type: other.to_owned() },
        };

        Ok(ChatEnvelope { envelope_id: wire.id, event })
    }
}

#[async_trait]
impl<R, W> ChatTransport for LineTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<ChatEnvelope>, TransportError> {
        let mut lines = self.lines.lock().await;
        loop {
            let Some(line) = lines
                .next_line()
                .await
                .map_err(|error| TransportError::Receive(error.to_string()))?
            else {
                return Ok(None);
            };
            if line.trim().is_empty() {
                continue;
            }
            match self.decode(&line) {
                Ok(envelope) => return Ok(Some(envelope)),
                Err(detail) => {
                    warn!(
                        event_name = "ingress.console.invalid_line",
                        error = %detail,
                        "skipping undecodable console line"
                    );
                }
            }
        }
    }

    async fn acknowledge(&self, _envelope_id: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send(&self, message: &OutgoingMessage) -> Result<(), TransportError> {
        let mut encoded = serde_json::to_vec(message)
            .map_err(|error| TransportError::Send(error.to_string()))?;
        encoded.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&encoded).await.map_err(|error| TransportError::Send(error.to_string()))?;
        writer.flush().await.map_err(|error| TransportError::Send(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        writer.flush().await.map_err(|error| TransportError::Disconnect(error.to_string()))
    }
}
