//! Configuration for the RCON session and the sync sidecar.
//!
//! Everything can be given on the command line or through the environment,
//! which is how the sidecar is usually deployed next to the server container.

use crate::{
    rcon::{packet::MIN_BODY_LEN, DEFAULT_TIMEOUT, MAX_FRAME_LEN, MAX_RESPONSE_LEN},
    sync::SyncTargets,
};
use clap::{builder::RangedU64ValueParser, Parser};
use std::{path::PathBuf, time::Duration};

/// Upper bound for `--max-frame-len`.
const MAX_FRAME_LEN_CEILING: u64 = 1 << 20;

/// Everything needed to open and authenticate an RCON session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconConfig {
    /// Hostname or IP address of the server.
    pub host: String,
    /// RCON port of the server.
    pub port: u16,
    /// RCON password.
    pub secret: String,
    /// Bound for connecting, sending a frame and recieving a frame.
    pub timeout: Duration,
    /// Largest frame body sent, in bytes.
    pub max_frame_len: usize,
    /// Largest frame body accepted from the server, in bytes.
    pub max_response_len: usize,
}

impl RconConfig {
    /// Config with the default timeout and frame limits.
    pub fn new(host: impl Into<String>, port: u16, secret: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            secret: secret.into(),
            timeout: DEFAULT_TIMEOUT,
            max_frame_len: MAX_FRAME_LEN,
            max_response_len: MAX_RESPONSE_LEN,
        }
    }

    /// Replace the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the limit for sent frames.
    #[must_use]
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Replace the limit for recieved frames.
    #[must_use]
    pub fn with_max_response_len(mut self, max_response_len: usize) -> Self {
        self.max_response_len = max_response_len;
        self
    }

    /// `host:port`, for logging.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Command line of the `mvinv-sync` binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "mvinv-sync")]
#[command(about = "Keeps Multiverse-Inventories groups in sync with survival worlds")]
#[command(version)]
pub struct Config {
    /// RCON host
    #[arg(long, env = "RCON_HOST", default_value = "mc")]
    pub rcon_host: String,

    /// RCON port
    #[arg(long, env = "RCON_PORT", default_value_t = 25575)]
    pub rcon_port: u16,

    /// RCON password
    #[arg(long, env = "RCON_PASS", default_value = "minecraft", hide_env_values = true)]
    pub rcon_pass: String,

    /// Seconds to wait for the connection and for each response
    #[arg(long, env = "RCON_TIMEOUT", default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub rcon_timeout: u64,

    /// Largest RCON request frame body in bytes
    #[arg(
        long,
        env = "RCON_MAX_FRAME_LEN",
        default_value_t = MAX_FRAME_LEN,
        value_parser = RangedU64ValueParser::<usize>::new().range((MIN_BODY_LEN as u64)..=MAX_FRAME_LEN_CEILING),
    )]
    pub max_frame_len: usize,

    /// Multiverse-Core world list to scan
    #[arg(long, env = "WORLDS_FILE", default_value = "/data/plugins/Multiverse-Core/worlds.yml")]
    pub worlds_file: PathBuf,

    /// Multiverse-Inventories group file to extend
    #[arg(long, env = "GROUPS_FILE", default_value = "/data/plugins/Multiverse-Inventories/groups.yml")]
    pub groups_file: PathBuf,

    /// Seconds between two sync passes
    #[arg(long, env = "SYNC_INTERVAL", default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,

    /// Command sent after the group file changed
    #[arg(long, env = "RELOAD_COMMAND", default_value = "mvinv reload")]
    pub reload_command: String,

    /// Run a single pass and exit
    #[arg(long)]
    pub once: bool,
}

impl Config {
    /// Settings for the RCON session.
    #[must_use]
    pub fn rcon(&self) -> RconConfig {
        RconConfig::new(&self.rcon_host, self.rcon_port, &self.rcon_pass)
            .with_timeout(Duration::from_secs(self.rcon_timeout))
            .with_max_frame_len(self.max_frame_len)
    }

    /// Files and command the sync loop works with.
    #[must_use]
    pub fn sync_targets(&self) -> SyncTargets {
        SyncTargets {
            worlds_file: self.worlds_file.clone(),
            groups_file: self.groups_file.clone(),
            reload_command: self.reload_command.clone(),
        }
    }

    /// Time between two sync passes.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }
}
