//! Command-line configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use sim_net::subjects;
use sim_world::DEFAULT_MOVE_THRESHOLD;

use crate::tick::TickConfig;

/// Default number of concurrent players.
pub const DEFAULT_MAX_PLAYERS: usize = 32;

/// Server process configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "sim_server", about = "Authoritative server for the replicated simulation")]
pub struct ServerConfig {
    /// Simulation ticks per second
    #[arg(long, default_value_t = 60.0)]
    pub tick_rate: f64,

    /// Stop after this many ticks (0 runs until interrupted)
    #[arg(long, default_value_t = 0)]
    pub max_ticks: u64,

    /// Maximum concurrent players
    #[arg(long, default_value_t = DEFAULT_MAX_PLAYERS)]
    pub max_players: usize,

    /// NATS server URL; falls back to `NATS_URL`, then localhost
    #[arg(long)]
    pub nats_url: Option<String>,

    /// Subject prefix shared with clients
    #[arg(long, default_value = subjects::PREFIX)]
    pub prefix: String,

    /// Squared distance below which moves are ignored
    #[arg(long, default_value_t = DEFAULT_MOVE_THRESHOLD)]
    pub move_threshold: f32,

    /// Name reported to clients
    #[arg(long, default_value = "sim server")]
    pub server_name: String,

    /// JSON file with an array of entity prototypes
    #[arg(long)]
    pub prototypes: Option<PathBuf>,
}

impl ServerConfig {
    /// Tick loop settings derived from this configuration.
    #[must_use]
    pub fn tick_config(&self) -> TickConfig {
        TickConfig {
            tick_rate: self.tick_rate,
            max_ticks: self.max_ticks,
        }
    }

    /// Seconds simulated per tick.
    #[must_use]
    pub fn frame_time(&self) -> f32 {
        self.tick_config().tick_duration().as_secs_f32()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
            max_players: DEFAULT_MAX_PLAYERS,
            nats_url: None,
            prefix: subjects::PREFIX.to_string(),
            move_threshold: DEFAULT_MOVE_THRESHOLD,
            server_name: "sim server".to_string(),
            prototypes: None,
        }
    }
}

/// Client process configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "sim_client", about = "Headless client for the replicated simulation")]
pub struct ClientConfig {
    /// User name to log in with
    #[arg(long, default_value = "player")]
    pub username: String,

    /// NATS server URL; falls back to `NATS_URL`, then localhost
    #[arg(long)]
    pub nats_url: Option<String>,

    /// Subject prefix shared with the server
    #[arg(long, default_value = subjects::PREFIX)]
    pub prefix: String,

    /// Polls per second
    #[arg(long, default_value_t = 60.0)]
    pub tick_rate: f64,

    /// Stop after this many polls (0 runs until interrupted)
    #[arg(long, default_value_t = 0)]
    pub max_ticks: u64,

    /// Seconds to wait for the server to approve the login
    #[arg(long, default_value_t = 5)]
    pub connect_timeout: u64,

    /// JSON file with an array of entity prototypes
    #[arg(long)]
    pub prototypes: Option<PathBuf>,
}

impl ClientConfig {
    #[must_use]
    pub fn tick_config(&self) -> TickConfig {
        TickConfig {
            tick_rate: self.tick_rate,
            max_ticks: self.max_ticks,
        }
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults_match_parser() {
        let parsed = ServerConfig::parse_from(["sim_server"]);
        let defaults = ServerConfig::default();
        assert_eq!(parsed.tick_rate, defaults.tick_rate);
        assert_eq!(parsed.max_players, defaults.max_players);
        assert_eq!(parsed.prefix, defaults.prefix);
        assert_eq!(parsed.move_threshold, defaults.move_threshold);
        assert_eq!(parsed.server_name, defaults.server_name);
        assert!(parsed.nats_url.is_none());
    }

    #[test]
    fn test_server_flags() {
        let parsed = ServerConfig::parse_from([
            "sim_server",
            "--tick-rate",
            "30",
            "--max-players",
            "4",
            "--nats-url",
            "nats://example:4222",
        ]);
        assert_eq!(parsed.tick_rate, 30.0);
        assert_eq!(parsed.max_players, 4);
        assert_eq!(parsed.nats_url.as_deref(), Some("nats://example:4222"));
        assert!((parsed.frame_time() - 1.0 / 30.0).abs() < 1.0e-6);
    }

    #[test]
    fn test_client_flags() {
        let parsed = ClientConfig::parse_from(["sim_client", "--username", "alice", "--connect-timeout", "2"]);
        assert_eq!(parsed.username, "alice");
        assert_eq!(parsed.connect_timeout(), Duration::from_secs(2));
    }
}
