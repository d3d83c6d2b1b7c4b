//! Minecraft server status probing.
//!
//! A probe is a single liveness request against one `host:port` target.
//! The wire protocol (server list ping) is delegated to the `craftping`
//! crate; this module only classifies outcomes:
//! - resolution failure -> [`ProbeError::InvalidEndpoint`]
//! - refused / IO error / timeout -> [`ProbeError::Unreachable`]
//!
//! No retries happen here. A single failed probe is a "down" observation.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::{debug, trace};

/// Default Minecraft server port.
pub const DEFAULT_PORT: u16 = 25565;

/// Bound on a single probe (resolve + connect + ping).
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// The monitored `host:port` target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // IPv6 hosts render bracketed so the output reparses.
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid server address: {0}")]
pub struct EndpointParseError(String);

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    /// Parses `"host"` (default port 25565), `"host:port"`, or a
    /// bracketed IPv6 literal `"[addr]"` / `"[addr]:port"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(EndpointParseError("empty address".into()));
        }
        if let Some(rest) = s.strip_prefix('[') {
            let Some((host, after)) = rest.split_once(']') else {
                return Err(EndpointParseError(format!("missing ']' in '{s}'")));
            };
            if host.is_empty() {
                return Err(EndpointParseError(format!("missing host in '{s}'")));
            }
            let port = match after {
                "" => DEFAULT_PORT,
                _ => after
                    .strip_prefix(':')
                    .and_then(|p| p.parse::<u16>().ok())
                    .ok_or_else(|| EndpointParseError(format!("bad port in '{s}'")))?,
            };
            return Ok(Endpoint {
                host: host.to_string(),
                port,
            });
        }
        // A bare IPv6 literal is ambiguous: is the last group a port?
        if s.matches(':').count() > 1 {
            return Err(EndpointParseError(format!(
                "IPv6 addresses need brackets, like [{s}]"
            )));
        }
        match s.rsplit_once(':') {
            Some((host, port)) => {
                if host.is_empty() {
                    return Err(EndpointParseError(format!("missing host in '{s}'")));
                }
                let port = port
                    .parse::<u16>()
                    .map_err(|_| EndpointParseError(format!("bad port in '{s}'")))?;
                Ok(Endpoint {
                    host: host.to_string(),
                    port,
                })
            }
            None => Ok(Endpoint {
                host: s.to_string(),
                port: DEFAULT_PORT,
            }),
        }
    }
}

/// Result of a successful probe.
#[derive(Debug, Clone)]
pub struct ServerStatus {
    pub latency_ms: u64,
    pub players_online: u32,
    pub players_max: u32,
    pub version: String,
}

/// Extended data from a richer query. Optional; absence never blocks
/// basic status reporting.
#[derive(Debug, Clone, Default)]
pub struct ServerDetails {
    pub player_names: Vec<String>,
    pub mods: Vec<String>,
}

/// Probe failure classification.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The target hostname could not be resolved. Fatal to a monitor
    /// session: operator intervention required.
    #[error("could not resolve {0}")]
    InvalidEndpoint(String),
    /// Connection refused, IO error or timeout. A normal "down"
    /// observation, not a fault.
    #[error("unreachable: {0}")]
    Unreachable(String),
}

/// Seam between the monitor / command surface and the network, so tests
/// can script probe outcomes.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn status(&self, endpoint: &Endpoint) -> Result<ServerStatus, ProbeError>;
    async fn details(&self, endpoint: &Endpoint) -> Option<ServerDetails>;
}

/// Shared trait-object handle used by the monitor and command surface.
pub type SharedProbe = Arc<dyn StatusSource>;

/// Live probe over the server list ping protocol.
#[derive(Debug, Clone)]
pub struct SlpProbe {
    probe_timeout: Duration,
}

impl SlpProbe {
    pub fn new(probe_timeout: Duration) -> Self {
        Self { probe_timeout }
    }

    async fn ping(&self, endpoint: &Endpoint) -> Result<(craftping::Response, u64), ProbeError> {
        // Resolution failure is the one condition that distinguishes a
        // misconfigured target from a down server.
        let addr = lookup_host((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|e| ProbeError::InvalidEndpoint(format!("{endpoint}: {e}")))?
            .next()
            .ok_or_else(|| ProbeError::InvalidEndpoint(format!("{endpoint}: no addresses")))?;

        let started = Instant::now();
        let work = async {
            let mut stream = TcpStream::connect(addr)
                .await
                .map_err(|e| ProbeError::Unreachable(e.to_string()))?;
            craftping::tokio::ping(&mut stream, &endpoint.host, endpoint.port)
                .await
                .map_err(|e| ProbeError::Unreachable(e.to_string()))
        };
        let response = timeout(self.probe_timeout, work)
            .await
            .map_err(|_| {
                ProbeError::Unreachable(format!("timed out after {:?}", self.probe_timeout))
            })??;
        let latency_ms = started.elapsed().as_millis() as u64;
        Ok((response, latency_ms))
    }
}

impl Default for SlpProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

#[async_trait]
impl StatusSource for SlpProbe {
    async fn status(&self, endpoint: &Endpoint) -> Result<ServerStatus, ProbeError> {
        trace!("Probe: pinging {} (timeout {:?})", endpoint, self.probe_timeout);
        let (response, latency_ms) = self.ping(endpoint).await?;
        debug!(
            "Probe: {} answered in {}ms - players {}/{}",
            endpoint, latency_ms, response.online_players, response.max_players
        );
        Ok(ServerStatus {
            latency_ms,
            players_online: response.online_players as u32,
            players_max: response.max_players as u32,
            version: response.version,
        })
    }

    async fn details(&self, endpoint: &Endpoint) -> Option<ServerDetails> {
        match self.ping(endpoint).await {
            Ok((response, _)) => {
                let player_names = response
                    .sample
                    .unwrap_or_default()
                    .into_iter()
                    .map(|p| p.name)
                    .collect();
                let mods = response
                    .mod_info
                    .map(|info| info.mod_list.into_iter().map(|m| m.mod_id).collect())
                    .unwrap_or_default();
                Some(ServerDetails { player_names, mods })
            }
            Err(e) => {
                debug!("Probe: extended query for {} failed ({}), skipping", endpoint, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_host_with_default_port() {
        let ep: Endpoint = "mc.example.com".parse().unwrap();
        assert_eq!(ep.host, "mc.example.com");
        assert_eq!(ep.port, DEFAULT_PORT);
    }

    #[test]
    fn parses_host_and_port() {
        let ep: Endpoint = "mc.example.com:1234".parse().unwrap();
        assert_eq!(ep.port, 1234);
        assert_eq!(ep.to_string(), "mc.example.com:1234");
    }

    #[test]
    fn rejects_bad_addresses() {
        assert!("".parse::<Endpoint>().is_err());
        assert!("   ".parse::<Endpoint>().is_err());
        assert!(":25565".parse::<Endpoint>().is_err());
        assert!("host:notaport".parse::<Endpoint>().is_err());
        assert!("host:99999".parse::<Endpoint>().is_err());
    }

    #[test]
    fn ipv6_literals_require_brackets() {
        // "::1" must not parse as host "::" with port 1.
        assert!("::1".parse::<Endpoint>().is_err());
        assert!("2001:db8::1".parse::<Endpoint>().is_err());

        let ep: Endpoint = "[::1]".parse().unwrap();
        assert_eq!(ep.host, "::1");
        assert_eq!(ep.port, DEFAULT_PORT);

        let ep: Endpoint = "[2001:db8::1]:25570".parse().unwrap();
        assert_eq!(ep.host, "2001:db8::1");
        assert_eq!(ep.port, 25570);
        // Display reparses to the same endpoint.
        assert_eq!(ep.to_string().parse::<Endpoint>().unwrap(), ep);

        assert!("[::1".parse::<Endpoint>().is_err());
        assert!("[]".parse::<Endpoint>().is_err());
        assert!("[::1]25570".parse::<Endpoint>().is_err());
    }

    #[tokio::test]
    async fn refused_connection_classifies_as_unreachable() {
        // Bind to grab a free port, then drop the listener so the
        // connection is refused.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = SlpProbe::default();
        let endpoint = Endpoint {
            host: "127.0.0.1".to_string(),
            port,
        };
        match probe.status(&endpoint).await {
            Err(ProbeError::Unreachable(_)) => {}
            other => panic!("expected Unreachable, got {other:?}"),
        }
        assert!(probe.details(&endpoint).await.is_none());
    }

    #[tokio::test]
    async fn unresolvable_host_classifies_as_invalid_endpoint() {
        let probe = SlpProbe::default();
        // .invalid is reserved and never resolves.
        let endpoint = Endpoint {
            host: "definitely-not-here.invalid".to_string(),
            port: DEFAULT_PORT,
        };
        match probe.status(&endpoint).await {
            Err(ProbeError::InvalidEndpoint(_)) => {}
            other => panic!("expected InvalidEndpoint, got {other:?}"),
        }
    }
}
