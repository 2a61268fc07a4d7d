//! Tunable timeouts and tool locations
//!
//! Settings are read from a TOML file. Every field is optional; durations are
//! given in (fractional) seconds.
//!
//! ```toml
//! serial_point_timeout = 20
//! max_retries = 3
//! retry_backoff = 0.5
//! jlink_exe = "/opt/SEGGER/JLink/JLinkExe"
//!
//! [probe_platforms]
//! "000683512345" = "NRF52_DK"
//! ```

use crate::error::{ErrorKind, FlashError, Result};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "dapflash.toml";

/// All tunables
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// How long to wait for the serial port to reappear after a flash
    #[serde(deserialize_with = "seconds")]
    pub serial_point_timeout: Duration,
    /// How long to wait for the volume to be mounted again
    #[serde(deserialize_with = "seconds")]
    pub mount_point_timeout: Duration,
    /// Polls while waiting for the copied image to be consumed
    pub file_disappear_polls: u32,
    /// Pause between polls
    #[serde(deserialize_with = "seconds")]
    pub poll_interval: Duration,
    /// Attempts per target
    pub max_retries: u32,
    /// Pause between attempts
    #[serde(deserialize_with = "seconds")]
    pub retry_backoff: Duration,
    /// Hard limit for one probe tool invocation
    #[serde(deserialize_with = "seconds")]
    pub flash_timeout: Duration,
    /// Grace period between terminate and kill
    #[serde(deserialize_with = "seconds")]
    pub process_end_timeout: Duration,
    /// How long to wait for a probe tool's output after it exits
    #[serde(deserialize_with = "seconds")]
    pub queue_timeout: Duration,
    /// How long the serial line is held in break
    #[serde(deserialize_with = "seconds")]
    pub serial_break_duration: Duration,
    /// J-Link Commander executable
    pub jlink_exe: PathBuf,
    /// ST-LINK flash tool executable
    pub st_flash: PathBuf,
    /// Platform of the board behind a debug probe, by probe serial number
    pub probe_platforms: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            serial_point_timeout: Duration::from_secs(20),
            mount_point_timeout: Duration::from_secs(10),
            file_disappear_polls: 60,
            poll_interval: Duration::from_secs(1),
            max_retries: crate::retry::DEFAULT_MAX_ATTEMPTS,
            retry_backoff: crate::retry::DEFAULT_BACKOFF,
            flash_timeout: Duration::from_secs(60),
            process_end_timeout: Duration::from_secs(10),
            queue_timeout: Duration::from_secs(5),
            serial_break_duration: Duration::from_millis(150),
            jlink_exe: PathBuf::from(if cfg!(windows) { "JLink.exe" } else { "JLinkExe" }),
            st_flash: PathBuf::from("st-flash"),
            probe_platforms: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Parse settings from TOML text
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| {
            FlashError::new(ErrorKind::MisuseCmd, format!("Invalid configuration: {}", e))
        })
    }

    /// Parse settings from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            FlashError::new(
                ErrorKind::MisuseCmd,
                format!("Cannot read configuration {}: {}", path.display(), e),
            )
        })?;
        Self::from_toml_str(&text)
    }

    /// Load from `explicit` if given, else from the first default location
    /// that exists, else defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            log::debug!("Loading configuration from {}", path.display());
            return Self::from_file(path);
        }

        for path in default_locations() {
            if path.is_file() {
                log::debug!("Loading configuration from {}", path.display());
                return Self::from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Platform configured for a probe serial number
    pub fn probe_platform(&self, serial: &str) -> Option<&str> {
        self.probe_platforms.get(serial).map(String::as_str)
    }

    /// Retry policy built from `max_retries` and `retry_backoff`
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_backoff)
    }

    /// Settings with every wait shortened, for tests and simulations
    pub fn fast() -> Self {
        Self {
            serial_point_timeout: Duration::from_millis(50),
            mount_point_timeout: Duration::from_millis(50),
            file_disappear_polls: 5,
            poll_interval: Duration::from_millis(1),
            retry_backoff: Duration::ZERO,
            flash_timeout: Duration::from_secs(5),
            process_end_timeout: Duration::from_secs(1),
            queue_timeout: Duration::from_millis(500),
            serial_break_duration: Duration::ZERO,
            ..Self::default()
        }
    }
}

fn default_locations() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        paths.push(PathBuf::from(xdg).join("dapflash").join("config.toml"));
    } else if let Some(home) = std::env::var_os("HOME") {
        paths.push(
            PathBuf::from(home)
                .join(".config")
                .join("dapflash")
                .join("config.toml"),
        );
    }
    paths.push(PathBuf::from("/etc/dapflash/config.toml"));
    paths
}

fn seconds<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}
