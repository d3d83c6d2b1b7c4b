//! Prefix command surface.
//!
//! Commands start with `=`:
//! - `=ping`: liveness check.
//! - `=server_info <host[:port]>`: probe an arbitrary server.
//! - `=config [key value]`: show or change runtime settings.
//! - `=monitor <start|stop|status>`: control the monitor session.
//! - `=log`: upload the newest log file.
//!
//! `config` and `monitor` require the Manage Server permission and, when
//! a guild id is configured, only work in that guild. Argument-count
//! validation happens here; the config store only ever sees exactly one
//! key and one value.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use serenity::builder::{CreateAttachment, CreateEmbed, CreateMessage};
use serenity::client::Context;
use serenity::model::channel::Message;
use serenity::model::guild::{Member, PartialGuild};
use serenity::model::id::RoleId;
use tracing::debug;

use super::AppState;
use crate::config::{ConfigError, ConfigKey, Paths};
use crate::monitor::MonitorError;
use crate::notify::ChannelSink;
use crate::probe::{Endpoint, ProbeError};

pub const COMMAND_PREFIX: char = '=';

/// Splits `"=cmd a b"` into the command word and its arguments.
fn parse_command(content: &str) -> Option<(&str, Vec<&str>)> {
    let rest = content.trim().strip_prefix(COMMAND_PREFIX)?;
    let mut parts = rest.split_whitespace();
    let command = parts.next()?;
    Some((command, parts.collect()))
}

pub async fn dispatch(state: &AppState, ctx: &Context, msg: &Message) -> Result<()> {
    let Some((command, args)) = parse_command(&msg.content) else {
        return Ok(());
    };
    match command {
        "ping" => {
            msg.channel_id
                .say(&ctx.http, "Pong!")
                .await
                .context("sending pong")?;
        }
        "server_info" => server_info(state, ctx, msg, &args).await?,
        "config" => config_command(state, ctx, msg, &args).await?,
        "monitor" => monitor_command(state, ctx, msg, &args).await?,
        "log" => send_log(ctx, msg).await?,
        other => debug!("Commands: ignoring unknown command '{}'", other),
    }
    Ok(())
}

async fn server_info(state: &AppState, ctx: &Context, msg: &Message, args: &[&str]) -> Result<()> {
    let Some(raw) = args.first() else {
        msg.channel_id
            .say(&ctx.http, "Usage: =server_info <host[:port]>")
            .await?;
        return Ok(());
    };
    let endpoint: Endpoint = match raw.parse() {
        Ok(endpoint) => endpoint,
        Err(e) => {
            msg.channel_id.say(&ctx.http, e.to_string()).await?;
            return Ok(());
        }
    };

    match state.probe.status(&endpoint).await {
        Ok(status) => {
            let mut embed = CreateEmbed::new()
                .title(format!("Server Info for {endpoint}"))
                .field(
                    "Player Count:",
                    format!("{}/{}", status.players_online, status.players_max),
                    true,
                )
                .field("Latency:", format!("{}ms", status.latency_ms), true)
                .field("Version:", status.version.clone(), true);
            if let Some(details) = state.probe.details(&endpoint).await {
                if !details.player_names.is_empty() {
                    embed = embed.field(
                        "Online Players:",
                        clip_field(details.player_names.join("\n")),
                        false,
                    );
                }
                if !details.mods.is_empty() {
                    embed = embed.field("Mods:", clip_field(details.mods.join("\n")), false);
                }
            }
            msg.channel_id
                .send_message(&ctx.http, CreateMessage::new().embed(embed))
                .await
                .context("sending server info embed")?;
        }
        Err(ProbeError::Unreachable(_)) => {
            msg.channel_id
                .say(&ctx.http, format!("{endpoint} is unreachable."))
                .await?;
        }
        Err(ProbeError::InvalidEndpoint(_)) => {
            msg.channel_id
                .say(&ctx.http, format!("{endpoint} could not be resolved."))
                .await?;
        }
    }
    Ok(())
}

async fn config_command(state: &AppState, ctx: &Context, msg: &Message, args: &[&str]) -> Result<()> {
    if !require_manager(state, ctx, msg).await? {
        return Ok(());
    }

    match *args {
        [] => {}
        [_] => {
            msg.channel_id.say(&ctx.http, "Missing argument(s)!").await?;
        }
        [key, value] => {
            let result = {
                let mut store = state.config.lock().unwrap_or_else(|p| p.into_inner());
                store.set(key, value)
            };
            match result {
                Ok(()) => {}
                Err(ConfigError::UnknownKey(_)) => {
                    msg.channel_id.say(&ctx.http, "Invalid argument(s)!").await?;
                }
                Err(e @ ConfigError::Invalid { .. }) => {
                    msg.channel_id.say(&ctx.http, e.to_string()).await?;
                }
                Err(e) => {
                    // Persistence failed; memory and disk now diverge.
                    msg.channel_id
                        .say(&ctx.http, format!("Setting applied but not saved: {e}"))
                        .await?;
                }
            }
        }
        _ => {
            msg.channel_id.say(&ctx.http, "Too many arguments!").await?;
        }
    }

    // Echo the full configuration after every attempt so state is
    // always visible.
    let fields: Vec<(&'static str, String)> = {
        let store = state.config.lock().unwrap_or_else(|p| p.into_inner());
        ConfigKey::ALL
            .iter()
            .map(|&key| (key.as_str(), store.render(key)))
            .collect()
    };
    let mut embed = CreateEmbed::new()
        .title("Bot Configuration")
        .description("Runtime settings (=config <key> <value> to change)");
    for (name, value) in fields {
        embed = embed.field(name, value, false);
    }
    msg.channel_id
        .send_message(&ctx.http, CreateMessage::new().embed(embed))
        .await
        .context("sending config embed")?;
    Ok(())
}

async fn monitor_command(state: &AppState, ctx: &Context, msg: &Message, args: &[&str]) -> Result<()> {
    if !require_manager(state, ctx, msg).await? {
        return Ok(());
    }

    match args.first().copied() {
        Some("start") => {
            let sink = Arc::new(ChannelSink::new(ctx.http.clone(), state.config.clone()));
            let reply = match state
                .monitor
                .start(state.config.clone(), state.probe.clone(), sink)
            {
                Ok(()) => "Monitor started.",
                Err(MonitorError::AlreadyRunning) => "Monitor is already running.",
            };
            msg.channel_id.say(&ctx.http, reply).await?;
        }
        Some("stop") => {
            let reply = if state.monitor.stop() {
                "Monitor stopped."
            } else {
                "Monitor is not running."
            };
            msg.channel_id.say(&ctx.http, reply).await?;
        }
        Some("status") => {
            let reply = if state.monitor.is_running() {
                "Monitor is running."
            } else {
                "Monitor is not running."
            };
            msg.channel_id.say(&ctx.http, reply).await?;
        }
        _ => {
            msg.channel_id
                .say(&ctx.http, "Usage: =monitor <start|stop|status>")
                .await?;
        }
    }
    Ok(())
}

async fn send_log(ctx: &Context, msg: &Message) -> Result<()> {
    let dir = Paths::log_dir();
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    if let Ok(entries) = std::fs::read_dir(&dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
                if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
                    newest = Some((modified, path));
                }
            }
        }
    }
    let Some((_, path)) = newest else {
        msg.channel_id.say(&ctx.http, "No log file found.").await?;
        return Ok(());
    };

    let attachment = CreateAttachment::path(&path)
        .await
        .with_context(|| format!("reading log file {path:?}"))?;
    msg.channel_id
        .send_files(&ctx.http, [attachment], CreateMessage::new().content("Current log file"))
        .await
        .context("uploading log file")?;
    Ok(())
}

/// Guild-only + Manage Server gate for mutating commands. When a guild id
/// is configured, commands from other guilds are ignored outright.
async fn require_manager(state: &AppState, ctx: &Context, msg: &Message) -> Result<bool> {
    let Some(guild_id) = msg.guild_id else {
        msg.channel_id
            .say(&ctx.http, "This command only works in a server.")
            .await?;
        return Ok(false);
    };

    let configured_guild = {
        let store = state.config.lock().unwrap_or_else(|p| p.into_inner());
        store.snapshot().guild_id
    };
    if configured_guild != 0 && guild_id.get() != configured_guild {
        debug!("Commands: ignoring command from foreign guild {}", guild_id);
        return Ok(false);
    }

    let guild = guild_id
        .to_partial_guild(&ctx.http)
        .await
        .context("fetching guild")?;
    let member = guild_id
        .member(&ctx.http, msg.author.id)
        .await
        .context("fetching member")?;
    if !can_manage_guild(&guild, &member) {
        msg.channel_id
            .say(&ctx.http, "You need the Manage Server permission for that.")
            .await?;
        return Ok(false);
    }
    Ok(true)
}

/// Role-based Manage Server check. Computed by hand because the cache
/// feature is disabled.
fn can_manage_guild(guild: &PartialGuild, member: &Member) -> bool {
    if guild.owner_id == member.user.id {
        return true;
    }
    // The @everyone role shares the guild's id.
    let everyone = RoleId::new(guild.id.get());
    member
        .roles
        .iter()
        .chain(std::iter::once(&everyone))
        .filter_map(|id| guild.roles.get(id))
        .any(|role| role.permissions.administrator() || role.permissions.manage_guild())
}

/// Discord embed fields cap at 1024 characters.
fn clip_field(s: String) -> String {
    const MAX: usize = 1000;
    if s.chars().count() <= MAX {
        return s;
    }
    let mut clipped: String = s.chars().take(MAX).collect();
    clipped.push('…');
    clipped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefix_commands() {
        assert_eq!(parse_command("=ping"), Some(("ping", vec![])));
        assert_eq!(
            parse_command("  =config polling_interval_seconds 30  "),
            Some(("config", vec!["polling_interval_seconds", "30"]))
        );
        assert_eq!(
            parse_command("=server_info mc.example.com:25565"),
            Some(("server_info", vec!["mc.example.com:25565"]))
        );
    }

    #[test]
    fn ignores_non_commands() {
        assert_eq!(parse_command("hello there"), None);
        assert_eq!(parse_command("="), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn clips_oversized_embed_fields() {
        let short = clip_field("abc".to_string());
        assert_eq!(short, "abc");
        let long = clip_field("x".repeat(5000));
        assert!(long.chars().count() <= 1001);
        assert!(long.ends_with('…'));
    }
}
