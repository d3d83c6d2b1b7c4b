//! Discord gateway integration.
//!
//! Connects to Discord as a bot, starts the monitor session once the
//! gateway is ready, and routes prefix commands (see [`commands`]).
//! Token is resolved (in order) from: DISCORD_BOT_TOKEN env, .config.env
//! in the working directory, `~/.mc-sentry/.config.env`. The token is
//! never logged.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context as _};
use serenity::client::{Client, Context, EventHandler};
use serenity::gateway::ActivityData;
use serenity::model::channel::Message;
use serenity::model::gateway::{GatewayIntents, Ready};
use tracing::{debug, error, info};

use crate::config::{Paths, SharedConfigStore};
use crate::monitor::{MonitorError, MonitorHandle};
use crate::notify::ChannelSink;
use crate::probe::{SharedProbe, SlpProbe};

pub mod commands;

/// Dependencies shared by the event handler, the monitor session and the
/// command surface. Injected rather than global so tests can substitute
/// an in-memory store or a scripted probe.
pub struct AppState {
    pub config: SharedConfigStore,
    pub probe: SharedProbe,
    pub monitor: MonitorHandle,
}

struct Handler {
    state: Arc<AppState>,
}

#[serenity::async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("Discord: connected as {}", ready.user.name);
        ctx.set_activity(Some(ActivityData::playing("Prefix is =")));

        // Auto-start the monitor. A reconnect fires ready again; the
        // handle rejects the duplicate.
        let sink = Arc::new(ChannelSink::new(ctx.http.clone(), self.state.config.clone()));
        match self
            .state
            .monitor
            .start(self.state.config.clone(), self.state.probe.clone(), sink)
        {
            Ok(()) => info!("Discord: monitor session started"),
            Err(MonitorError::AlreadyRunning) => {
                debug!("Discord: monitor already running, leaving it be");
            }
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        // Outermost fault boundary for the command path: log with
        // context, never crash the process.
        if let Err(e) = commands::dispatch(&self.state, &ctx, &msg).await {
            error!("Discord: command '{}' failed: {:#}", msg.content, e);
        }
    }
}

/// Runs the gateway client until it disconnects or errors.
pub async fn run(token: String, config: SharedConfigStore) -> anyhow::Result<()> {
    if token.trim().is_empty() {
        bail!("Discord token is empty");
    }

    info!("Discord: connecting to the gateway");
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let state = Arc::new(AppState {
        config,
        probe: Arc::new(SlpProbe::default()),
        monitor: MonitorHandle::new(),
    });
    let mut client = Client::builder(&token, intents)
        .event_handler(Handler { state })
        .await
        .context("Discord client build failed")?;

    client.start().await.context("Discord gateway error")?;
    Ok(())
}

/// Reads the token from a `.config.env`-style file (`DISCORD_BOT_TOKEN=`).
fn token_from_config_env_file(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    content
        .lines()
        .find(|l| l.starts_with("DISCORD_BOT_TOKEN="))
        .and_then(|l| l.split_once('='))
        .map(|(_, v)| v.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Token lookup: env, then `.config.env` (cwd), then the data directory.
pub fn resolve_token() -> Option<String> {
    if let Ok(t) = std::env::var("DISCORD_BOT_TOKEN") {
        let t = t.trim().to_string();
        if !t.is_empty() {
            info!("Discord: token from DISCORD_BOT_TOKEN env");
            return Some(t);
        }
    }
    if let Ok(cwd) = std::env::current_dir() {
        let p = cwd.join(".config.env");
        if p.is_file() {
            if let Some(t) = token_from_config_env_file(&p) {
                info!("Discord: token from .config.env (current dir)");
                return Some(t);
            }
        }
    }
    let p = Paths::config_env_path();
    if p.is_file() {
        if let Some(t) = token_from_config_env_file(&p) {
            info!("Discord: token from {:?}", p);
            return Some(t);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_file_parsing_ignores_other_lines_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".config.env");

        std::fs::write(&path, "# comment\nOTHER=x\nDISCORD_BOT_TOKEN= abc123 \n").unwrap();
        assert_eq!(token_from_config_env_file(&path).as_deref(), Some("abc123"));

        std::fs::write(&path, "DISCORD_BOT_TOKEN=\n").unwrap();
        assert_eq!(token_from_config_env_file(&path), None);

        assert_eq!(token_from_config_env_file(&dir.path().join("missing")), None);
    }
}
