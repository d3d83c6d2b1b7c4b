use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context as _;
use clap::Parser;

use mc_sentry::config::{ConfigStore, Paths};
use mc_sentry::{discord, init_tracing};

#[derive(Parser, Debug)]
#[command(name = "mc_sentry")]
#[command(about = "Discord bot that watches a Minecraft server", long_about = None)]
struct Args {
    /// Verbose output (-v, -vv)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file path (defaults to ~/.mc-sentry/config.json)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let verbosity = args.verbose.min(2);

    Paths::ensure_log_directory().ok();
    let _log_guard = init_tracing(verbosity, Some(Paths::log_dir()));

    let config_path = args.config.unwrap_or_else(Paths::config_file_path);
    let store = ConfigStore::load_or_init(&config_path)
        .with_context(|| format!("loading configuration from {config_path:?}"))?;
    let config = Arc::new(Mutex::new(store));

    let token = discord::resolve_token()
        .context("no Discord token found (set DISCORD_BOT_TOKEN or create .config.env)")?;
    discord::run(token, config).await
}
