//! Configuration management for listfs

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default attribute/entry TTL handed to the kernel
pub const DEFAULT_TTL_SECS: u64 = 1;

/// Default bound on waiting for a directory cursor lock
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

/// Filesystem subtype reported in the mount table
pub const FS_SUBTYPE: &str = "list";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Real directory the overlay is anchored to. Empty means `/`.
    pub root: PathBuf,

    /// Report symlink targets' attributes instead of the links themselves
    pub follow_symlinks: bool,

    /// Attribute and entry cache timeout for the kernel (seconds)
    pub ttl_secs: u64,

    /// Bound on waiting for a passthrough directory lock (milliseconds)
    pub lock_timeout_ms: u64,

    /// Mount configuration
    pub mount: MountConfig,
}

/// Mount configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Allow other users to access the mount
    pub allow_other: bool,

    /// Allow root to access the mount
    pub allow_root: bool,

    /// Unmount automatically when the process exits
    pub auto_unmount: bool,

    /// Filesystem name shown in the mount table (defaults to the list path)
    pub fsname: Option<String>,

    /// Extra raw mount options passed through to FUSE
    pub options: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            root: PathBuf::from("/"),
            follow_symlinks: false,
            ttl_secs: DEFAULT_TTL_SECS,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            mount: MountConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file, with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!("Failed to read config file: {}", e))
        })?;

        let mut config: Config = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse config file: {}", e))
        })?;

        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise start from defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            return Self::load(path);
        }

        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var("LISTFS_ROOT") {
            let root = root.trim();
            if !root.is_empty() {
                self.root = PathBuf::from(root);
            }
        }

        if let Ok(ttl) = std::env::var("LISTFS_TTL_SECS") {
            if let Ok(secs) = ttl.trim().parse::<u64>() {
                self.ttl_secs = secs;
            }
        }

        if let Ok(follow) = std::env::var("LISTFS_FOLLOW_SYMLINKS") {
            match follow.trim() {
                "1" | "true" | "yes" => self.follow_symlinks = true,
                "0" | "false" | "no" => self.follow_symlinks = false,
                _ => {}
            }
        }
    }

    /// Save configuration to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            Error::Config(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path.as_ref(), content).map_err(|e| {
            Error::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.lock_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "Lock timeout must be greater than 0".to_string(),
            ));
        }

        if self.mount.allow_other && self.mount.allow_root {
            return Err(Error::InvalidConfig(
                "allow_other and allow_root are mutually exclusive".to_string(),
            ));
        }

        Ok(())
    }

    /// Root directory with the empty value mapped to `/`
    pub fn root_dir(&self) -> PathBuf {
        if self.root.as_os_str().is_empty() {
            PathBuf::from("/")
        } else {
            self.root.clone()
        }
    }

    /// Kernel cache TTL
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Directory lock wait bound
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
