//! mc_sentry
//!
//! A Discord bot that watches one Minecraft server and announces in a
//! configured channel when it goes online or offline.
//!
//! ## Architecture
//!
//! - `probe`: single-shot server status probes (server list ping)
//! - `monitor`: the polling loop and its transition state machine
//! - `notify`: where transition announcements go (Discord channel or log)
//! - `config`: validated, persisted runtime settings
//! - `discord`: gateway client and the `=` prefix command surface
//! - `logging`: tracing setup (console + rolling file)
//!
//! The monitor and command surface share injected state (`AppState`)
//! instead of process-wide globals, so every piece is testable with an
//! in-memory config store, a scripted probe and a recording sink.

pub mod config;
pub mod discord;
pub mod logging;
pub mod monitor;
pub mod notify;
pub mod probe;

pub use logging::init_tracing;
