use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::actors::{
    Actor, ActorType, ControlMessage, ShutdownSignal, sleep_or_shutdown, wait_for_shutdown,
};
use teloxide::prelude::*;
use teloxide::types::UpdateKind;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::services::operator_desk::OperatorDesk;

/// Telegram rejects longer messages.
const MAX_MESSAGE_CHARS: usize = 4096;
const POLL_TIMEOUT_SECS: u32 = 10;
const POLL_ERROR_DELAY: Duration = Duration::from_secs(5);

/// Forwards notification strings to the operator chat. Delivery is
/// fire-and-forget: failures are logged and the message is dropped.
pub struct TelegramNotifier {
    id: Uuid,
    bot: Bot,
    chat_id: ChatId,
    rx: broadcast::Receiver<String>,
    shutdown: ShutdownSignal,
}

impl TelegramNotifier {
    pub fn new(
        bot: Bot,
        chat_id: i64,
        rx: broadcast::Receiver<String>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            bot,
            chat_id: ChatId(chat_id),
            rx,
            shutdown,
        }
    }

    async fn deliver(&self, msg: String) {
        for chunk in split_message(&msg, MAX_MESSAGE_CHARS) {
            if let Err(e) = self.bot.send_message(self.chat_id, chunk).await {
                error!("Failed to send Telegram message: {}", e);
            }
        }
    }
}

#[async_trait]
impl Actor for TelegramNotifier {
    fn name(&self) -> ActorType {
        ActorType::Notifier
    }

    fn id(&self) -> Uuid {
        self.id
    }

    async fn run(&mut self, supervisor_tx: mpsc::Sender<ControlMessage>) -> anyhow::Result<()> {
        let heartbeat_handle = self.spawn_heartbeat(supervisor_tx.clone());
        info!("Starting Telegram notifier");

        loop {
            let mut shutdown = self.shutdown.clone();
            let received = tokio::select! {
                received = self.rx.recv() => received,
                _ = wait_for_shutdown(&mut shutdown) => break,
            };

            match received {
                Ok(msg) => self.deliver(msg).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Telegram notifier lagged behind, skipped {} messages", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Notification channel closed");
                    break;
                }
            }
        }

        // Flush what was queued before the stop signal.
        while let Ok(msg) = self.rx.try_recv() {
            self.deliver(msg).await;
        }

        info!("Telegram notifier stopped");
        heartbeat_handle.abort();
        let _ = supervisor_tx
            .send(ControlMessage::Shutdown(self.name(), self.id))
            .await;
        Ok(())
    }
}

/// Long-polls the bot for operator messages and answers them through the
/// desk. Messages from any chat other than the configured one are ignored.
pub struct TelegramConsole {
    id: Uuid,
    bot: Bot,
    chat_id: ChatId,
    desk: Arc<OperatorDesk>,
    offset: i32,
    shutdown: ShutdownSignal,
}

impl TelegramConsole {
    pub fn new(bot: Bot, chat_id: i64, desk: Arc<OperatorDesk>, shutdown: ShutdownSignal) -> Self {
        Self {
            id: Uuid::new_v4(),
            bot,
            chat_id: ChatId(chat_id),
            desk,
            offset: 0,
            shutdown,
        }
    }

    async fn poll(&mut self) -> Result<(), teloxide::RequestError> {
        let mut request = self.bot.get_updates().timeout(POLL_TIMEOUT_SECS);
        if self.offset > 0 {
            request = request.offset(self.offset);
        }

        for update in request.await? {
            self.offset = update.id.0 as i32 + 1;

            let UpdateKind::Message(message) = update.kind else {
                continue;
            };
            if message.chat.id != self.chat_id {
                debug!("Ignoring message from chat {}", message.chat.id.0);
                continue;
            }
            let Some(text) = message.text() else {
                continue;
            };

            info!("Operator: {}", text);
            let reply = self.desk.handle(text).await;
            for chunk in split_message(&reply, MAX_MESSAGE_CHARS) {
                if let Err(e) = self.bot.send_message(self.chat_id, chunk).await {
                    error!("Failed to answer operator: {}", e);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Actor for TelegramConsole {
    fn name(&self) -> ActorType {
        ActorType::OperatorConsole
    }

    fn id(&self) -> Uuid {
        self.id
    }

    async fn run(&mut self, supervisor_tx: mpsc::Sender<ControlMessage>) -> anyhow::Result<()> {
        let heartbeat_handle = self.spawn_heartbeat(supervisor_tx.clone());
        info!("Starting Telegram operator console");

        loop {
            let mut shutdown = self.shutdown.clone();
            let polled = tokio::select! {
                polled = self.poll() => polled,
                _ = wait_for_shutdown(&mut shutdown) => break,
            };

            if let Err(e) = polled {
                warn!("Telegram polling failed: {}", e);
                if sleep_or_shutdown(POLL_ERROR_DELAY, &mut self.shutdown).await {
                    break;
                }
            }
        }

        info!("Telegram operator console stopped");
        heartbeat_handle.abort();
        let _ = supervisor_tx
            .send(ControlMessage::Shutdown(self.name(), self.id))
            .await;
        Ok(())
    }
}

/// Splits on line boundaries where possible so no chunk exceeds `limit`
/// characters.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let mut line_len = line.chars().count();
        if current_len + line_len > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        let mut rest = line;
        while line_len > limit {
            let cut = rest
                .char_indices()
                .nth(limit)
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
            chunks.push(rest[..cut].to_string());
            rest = &rest[cut..];
            line_len -= limit;
        }
        current.push_str(rest);
        current_len += line_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
