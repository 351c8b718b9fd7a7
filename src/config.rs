//! Configuration loading and persistence.
//!
//! Settings come from, in increasing priority: built-in defaults,
//! `config.json` in the config directory, `MISSION_CONTROL_*` environment
//! variables, and finally command-line flags (applied by the binary).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::fs;

use crate::bridge::BridgeOptions;
use crate::constants::{DEFAULT_TICK_RATE_HZ, OUTBOUND_QUEUE_FRAMES, READ_CHUNK_SIZE};
use crate::dispatch::UnknownCommandPolicy;
use crate::socket::{Endpoint, MuxOptions};

/// Name of the configuration file inside [`Config::config_dir`].
pub const CONFIG_FILE: &str = "config.json";

/// Bridge configuration.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Address to listen on.
    pub endpoint: Endpoint,
    /// Ticks per second for the session loop.
    pub tick_rate_hz: u32,
    /// Bytes requested per socket read.
    pub read_chunk_size: usize,
    /// Optional ceiling on simultaneous consoles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<usize>,
    /// Frames queued per console before it is dropped as stalled.
    pub outbound_queue_frames: usize,
    /// Handling of unregistered command names.
    pub unknown_commands: UnknownCommandPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
            read_chunk_size: READ_CHUNK_SIZE,
            max_connections: None,
            outbound_queue_frames: OUTBOUND_QUEUE_FRAMES,
            unknown_commands: UnknownCommandPolicy::default(),
        }
    }
}

impl Config {
    /// Returns the configuration directory path.
    ///
    /// `MISSION_CONTROL_CONFIG_DIR` overrides the platform config directory
    /// (e.g. `~/.config/mission-control` on Linux).
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var("MISSION_CONTROL_CONFIG_DIR") {
            return Ok(PathBuf::from(dir));
        }
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join("mission-control"))
    }

    /// Loads configuration from file, with environment variable overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_dir(&Self::config_dir()?);
        config.apply_env_overrides();
        Ok(config)
    }

    /// Reads `config.json` from `dir`, falling back to defaults.
    ///
    /// A missing file is not an error; a malformed one is logged and ignored.
    pub fn load_from_dir(dir: &Path) -> Self {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Self::default();
        }
        match Self::read_file(&path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Ignoring {}: {e:#}", path.display());
                Self::default()
            }
        }
    }

    fn read_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).context("Invalid config JSON")
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `MISSION_CONTROL_*` overrides read through `lookup`.
    ///
    /// `MISSION_CONTROL_PORT` wins over `MISSION_CONTROL_SOCKET` when both
    /// are set. Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("MISSION_CONTROL_SOCKET") {
            self.endpoint = Endpoint::Unix(PathBuf::from(path));
        }

        if let Some(port) = lookup("MISSION_CONTROL_PORT") {
            match port.parse::<u16>() {
                Ok(port) => {
                    self.endpoint =
                        Endpoint::Tcp(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)));
                }
                Err(_) => log::warn!("Ignoring invalid MISSION_CONTROL_PORT: {port}"),
            }
        }

        if let Some(hz) = lookup("MISSION_CONTROL_TICK_HZ") {
            if let Ok(hz) = hz.parse::<u32>() {
                self.tick_rate_hz = hz;
            }
        }

        if let Some(max) = lookup("MISSION_CONTROL_MAX_CONNECTIONS") {
            if let Ok(max) = max.parse::<usize>() {
                self.max_connections = Some(max);
            }
        }
    }

    /// Persists the configuration to the config directory.
    pub fn save(&self) -> Result<PathBuf> {
        self.save_to_dir(&Self::config_dir()?)
    }

    /// Writes `config.json` into `dir` with owner-only permissions.
    pub fn save_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join(CONFIG_FILE);
        fs::write(&path, serde_json::to_string_pretty(self)?)?;

        // Owner read/write only
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;

        Ok(path)
    }

    /// Session options derived from this configuration.
    pub fn bridge_options(&self) -> BridgeOptions {
        BridgeOptions {
            mux: MuxOptions {
                read_chunk_size: self.read_chunk_size,
                max_connections: self.max_connections,
                outbound_queue_frames: self.outbound_queue_frames,
            },
            unknown_commands: self.unknown_commands,
        }
    }
}
