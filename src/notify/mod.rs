//! Transition announcements.
//!
//! The monitor does not talk to Discord directly; it writes to a
//! [`NotificationSink`]. The real sink posts an embed to the configured
//! channel, the log sink just emits a log line. Delivery is best effort:
//! failures are reported to the caller, logged there, and never retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::builder::{CreateEmbed, CreateMessage};
use serenity::http::Http;
use serenity::model::id::{ChannelId, RoleId};
use serenity::model::mention::Mentionable;
use serenity::model::Colour;
use thiserror::Error;
use tracing::info;

use crate::config::SharedConfigStore;
use crate::monitor::Transition;
use crate::probe::Endpoint;

/// Bound on a single announcement send, so a hung delivery cannot stall
/// the poll loop indefinitely.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification channel is not configured")]
    ChannelUnset,
    #[error("failed to deliver notification: {0}")]
    Delivery(String),
    #[error("notification send timed out")]
    Timeout,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn announce(
        &self,
        transition: Transition,
        endpoint: &Endpoint,
        at: DateTime<Utc>,
    ) -> Result<(), NotifyError>;
}

/// Shared trait-object handle held by the monitor session.
pub type SharedSink = Arc<dyn NotificationSink>;

/// Posts transition embeds to the configured Discord channel, mentioning
/// the configured role when one is set.
pub struct ChannelSink {
    http: Arc<Http>,
    config: SharedConfigStore,
    send_timeout: Duration,
}

impl ChannelSink {
    pub fn new(http: Arc<Http>, config: SharedConfigStore) -> Self {
        Self {
            http,
            config,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn announce(
        &self,
        transition: Transition,
        endpoint: &Endpoint,
        at: DateTime<Utc>,
    ) -> Result<(), NotifyError> {
        let snapshot = {
            let store = self.config.lock().unwrap_or_else(|p| p.into_inner());
            store.snapshot()
        };
        if snapshot.notification_channel_id == 0 {
            return Err(NotifyError::ChannelUnset);
        }
        let channel = ChannelId::new(snapshot.notification_channel_id);

        let (title, description, colour) = match transition {
            Transition::CameUp => (
                "Server Online!",
                format!("{endpoint} is back online!"),
                Colour::DARK_GREEN,
            ),
            Transition::WentDown => (
                "Server Offline!",
                format!("{endpoint} is now offline"),
                Colour::RED,
            ),
        };
        let embed = CreateEmbed::new()
            .title(title)
            .description(description)
            .colour(colour)
            .field("Time", at.format("%Y-%m-%d %H:%M:%S UTC").to_string(), false);

        let mut message = CreateMessage::new().embed(embed);
        if snapshot.mention_role_id != 0 {
            message = message.content(RoleId::new(snapshot.mention_role_id).mention().to_string());
        }

        tokio::time::timeout(self.send_timeout, channel.send_message(&*self.http, message))
            .await
            .map_err(|_| NotifyError::Timeout)?
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        Ok(())
    }
}

/// Sink that only writes a log line. Used in tests and headless runs.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn announce(
        &self,
        transition: Transition,
        endpoint: &Endpoint,
        at: DateTime<Utc>,
    ) -> Result<(), NotifyError> {
        info!("Announce: {} {} at {}", endpoint, transition, at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BotConfig, ConfigStore};
    use std::sync::Mutex;

    #[tokio::test]
    async fn unset_channel_is_rejected_before_any_network_io() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::with_values(&dir.path().join("config.json"), BotConfig::default());
        let sink = ChannelSink::new(
            Arc::new(Http::new("unused-token")),
            Arc::new(Mutex::new(store)),
        );
        let endpoint = Endpoint {
            host: "mc.example.com".to_string(),
            port: 25565,
        };
        match sink.announce(Transition::CameUp, &endpoint, Utc::now()).await {
            Err(NotifyError::ChannelUnset) => {}
            other => panic!("expected ChannelUnset, got {other:?}"),
        }
    }
}
