//! Chat transport plumbing.
//!
//! The bot core only sees [`InboundEvent`]s and produces [`OutboundMessage`]s.
//! The stdio transport here speaks JSON lines so any chat gateway (or a shell
//! pipe) can drive the bot:
//!
//! ```text
//! stdin : {"chat_id":"123@c.us","sender_id":"123@c.us","text":"!daily"}
//! stdout: {"chat_id":"123@c.us","text":"Daily bonus: +120 coins, +30 XP. Streak: 1 day."}
//! ```
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::logutil::escape_log;

/// Channel capacity between the transport tasks and the dispatcher.
pub const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub chat_id: String,
    /// Who wrote the message. Defaults to the chat itself for direct chats.
    #[serde(default)]
    pub sender_id: String,
    pub text: String,
}

impl InboundEvent {
    pub fn new(chat_id: &str, sender_id: &str, text: &str) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            sender_id: sender_id.to_string(),
            text: text.to_string(),
        }
    }

    /// Event from a direct chat, where sender and chat are the same identity.
    pub fn direct(chat_id: &str, text: &str) -> Self {
        Self::new(chat_id, chat_id, text)
    }

    pub fn sender(&self) -> &str {
        if self.sender_id.is_empty() {
            &self.chat_id
        } else {
            &self.sender_id
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub chat_id: String,
    pub text: String,
}

/// Parse one JSON line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<InboundEvent>, serde_json::Error> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(trimmed).map(Some)
}

/// Read JSON lines from `reader` until EOF, forwarding each event.
pub fn spawn_reader<R>(reader: R, tx: mpsc::Sender<InboundEvent>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match parse_line(&line) {
                    Ok(Some(event)) => {
                        debug!("inbound {}: {}", event.chat_id, escape_log(&event.text));
                        if tx.send(event).await.is_err() {
                            debug!("dispatcher gone; reader stopping");
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Skipping malformed input line ({}): {}", e, escape_log(&line)),
                },
                Ok(None) => {
                    info!("Input closed");
                    break;
                }
                Err(e) => {
                    warn!("Input read error: {}", e);
                    break;
                }
            }
        }
    })
}

/// Write each outbound message as one JSON line to `writer`.
pub fn spawn_writer<W>(writer: W, mut rx: mpsc::Receiver<OutboundMessage>) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut writer = writer;
        while let Some(msg) = rx.recv().await {
            let mut line = match serde_json::to_string(&msg) {
                Ok(l) => l,
                Err(e) => {
                    warn!("Failed to encode reply for {}: {}", msg.chat_id, e);
                    continue;
                }
            };
            line.push('\n');
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                warn!("Output write error: {}", e);
                break;
            }
            if let Err(e) = writer.flush().await {
                warn!("Output flush error: {}", e);
                break;
            }
        }
    })
}

/// Wire stdin/stdout to a pair of channels for [`crate::bot::BotServer::run`].
pub fn spawn_stdio() -> (mpsc::Receiver<InboundEvent>, mpsc::Sender<OutboundMessage>) {
    let (in_tx, in_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (out_tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);
    spawn_reader(tokio::io::stdin(), in_tx);
    spawn_writer(tokio::io::stdout(), out_rx);
    (in_rx, out_tx)
}
