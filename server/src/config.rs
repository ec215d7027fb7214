//! Server configuration parsed from the command line

use clap::{Parser, ValueEnum};
use shared::{GRID_SIZE, MAX_GRID_SIZE};
use std::path::PathBuf;
use std::time::Duration;

/// How a move that would leave the grid is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BoundsPolicy {
    /// Clamp the target into the grid; at an edge this becomes a no-op
    Clamp,
    /// Refuse any move whose target lies outside the grid
    Reject,
}

/// Which history feeds the direction inferred for a wall removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LastDirPolicy {
    /// The last successful move direction survives any later action
    AnyAction,
    /// Any non-move action forgets the last direction
    PreviousMove,
}

/// When world snapshots are pushed to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BroadcastMode {
    /// Fixed cadence, independent of how often the world changes
    Tick,
    /// Right after each state-changing command
    OnChange,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Authoritative grid sandbox server")]
pub struct ServerConfig {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    /// Broadcast ticks per second
    #[arg(short, long, default_value_t = 20)]
    pub tick_rate: u32,

    /// Width and height of the square grid
    #[arg(
        short,
        long,
        default_value_t = GRID_SIZE,
        value_parser = clap::value_parser!(i32).range(1..=MAX_GRID_SIZE as i64)
    )]
    pub grid_size: i32,

    /// Maximum number of concurrent connections
    #[arg(short, long, default_value_t = 32)]
    pub max_clients: usize,

    /// Seconds of silence before a connection is dropped
    #[arg(long, default_value_t = 10)]
    pub client_timeout_secs: u64,

    #[arg(long, value_enum, default_value_t = BoundsPolicy::Clamp)]
    pub bounds: BoundsPolicy,

    #[arg(long, value_enum, default_value_t = LastDirPolicy::AnyAction)]
    pub last_dir: LastDirPolicy,

    #[arg(long, value_enum, default_value_t = BroadcastMode::Tick)]
    pub broadcast: BroadcastMode,

    /// Wall snapshot loaded at startup
    #[arg(long, default_value = "walls.json")]
    pub walls_file: PathBuf,

    /// Save walls back to the snapshot every N seconds (0 disables saving)
    #[arg(long, default_value_t = 0)]
    pub save_interval_secs: u64,

    /// Base URL of the PurgoMalum profanity service
    #[arg(long, default_value = "https://www.purgomalum.com")]
    pub chat_filter_url: String,

    /// Skip the remote profanity service entirely
    #[arg(long)]
    pub no_chat_filter: bool,

    #[arg(long, default_value_t = 1500)]
    pub chat_filter_timeout_ms: u64,

    /// Words masked locally when the remote filter is unavailable
    #[arg(long, value_delimiter = ',')]
    pub denylist: Vec<String>,

    /// Seed for spawn positions and colors
    #[arg(long)]
    pub seed: Option<u64>,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }

    pub fn save_interval(&self) -> Option<Duration> {
        (self.save_interval_secs > 0).then(|| Duration::from_secs(self.save_interval_secs))
    }

    pub fn chat_filter_timeout(&self) -> Duration {
        Duration::from_millis(self.chat_filter_timeout_ms)
    }

    /// Checks settings that a hand-built config could get wrong.
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=MAX_GRID_SIZE).contains(&self.grid_size) {
            return Err(format!(
                "grid size {} is outside 1..={}",
                self.grid_size, MAX_GRID_SIZE
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            tick_rate: 20,
            grid_size: GRID_SIZE,
            max_clients: 32,
            client_timeout_secs: 10,
            bounds: BoundsPolicy::Clamp,
            last_dir: LastDirPolicy::AnyAction,
            broadcast: BroadcastMode::Tick,
            walls_file: PathBuf::from("walls.json"),
            save_interval_secs: 0,
            chat_filter_url: "https://www.purgomalum.com".to_string(),
            no_chat_filter: false,
            chat_filter_timeout_ms: 1500,
            denylist: Vec::new(),
            seed: None,
        }
    }
}
