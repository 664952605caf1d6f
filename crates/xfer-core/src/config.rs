//! Transfer manager configuration
//!
//! Every knob has a default; a TOML file only needs the fields it changes:
//!
//! ```toml
//! max_outgoing_per_circuit = 4
//! hard_limit_outgoing_per_circuit = 64
//! use_ack_throttling = true
//! cache_dir = "/var/cache/xfer"
//! ```

use crate::error::{Result, XferError};
use crate::throttle::ACK_COST_BITS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use xfer_files::{MAX_BUFFER_SIZE, PathResolver};

/// Default soft limit of concurrently sending transfers per circuit
pub const DEFAULT_MAX_OUTGOING_PER_CIRCUIT: usize = 10;

/// Default hard limit of queued plus active sends per circuit
pub const DEFAULT_HARD_LIMIT_OUTGOING_PER_CIRCUIT: usize = 500;

/// Default cap on concurrently running downloads
pub const DEFAULT_MAX_INCOMING_XFERS: usize = 1000;

/// Default confirmation wait before a resend (3 s)
pub const DEFAULT_PACKET_TIMEOUT_MS: u64 = 3_000;

/// Default resend limit before a send is dropped
pub const DEFAULT_RETRY_LIMIT: u32 = 10;

/// Default lifetime of an unrequested registered transfer (60 s)
pub const DEFAULT_REGISTRATION_TIMEOUT_MS: u64 = 60_000;

/// Default confirmation throttle rate in bits per second
pub const DEFAULT_ACK_THROTTLE_BPS: f64 = 100_000.0;

/// Default driver heartbeat
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 100;

/// Transfer manager configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XferConfig {
    /// Downloads allowed to run at once; the rest wait as pending
    pub max_incoming_xfers: usize,
    /// Sends allowed to run at once per remote host
    pub max_outgoing_per_circuit: usize,
    /// Active plus pending sends per host beyond which the host is treated as flooding (0 = no limit)
    pub hard_limit_outgoing_per_circuit: usize,
    /// Confirmation wait before a packet is resent, in milliseconds
    pub packet_timeout_ms: u64,
    /// Resends allowed before a send is aborted
    pub retry_limit: u32,
    /// Lifetime of an unrequested registered transfer, in milliseconds
    pub registration_timeout_ms: u64,
    /// Queue confirmations and release them under a rate limit
    pub use_ack_throttling: bool,
    /// Requested confirmation rate in bits per second (clamped, see [`Self::effective_ack_throttle_bps`])
    pub ack_throttle_bps: f64,
    /// Driver heartbeat in milliseconds
    pub tick_interval_ms: u64,
    /// Bytes buffered in memory before reading ahead or flushing to a destination
    pub max_buffer_size: usize,
    /// Directory cache-location names resolve into
    pub cache_dir: PathBuf,
    /// Directory incoming files are staged in
    pub temp_dir: PathBuf,
}

impl Default for XferConfig {
    fn default() -> Self {
        let resolver = PathResolver::default();
        Self {
            max_incoming_xfers: DEFAULT_MAX_INCOMING_XFERS,
            max_outgoing_per_circuit: DEFAULT_MAX_OUTGOING_PER_CIRCUIT,
            hard_limit_outgoing_per_circuit: DEFAULT_HARD_LIMIT_OUTGOING_PER_CIRCUIT,
            packet_timeout_ms: DEFAULT_PACKET_TIMEOUT_MS,
            retry_limit: DEFAULT_RETRY_LIMIT,
            registration_timeout_ms: DEFAULT_REGISTRATION_TIMEOUT_MS,
            use_ack_throttling: false,
            ack_throttle_bps: DEFAULT_ACK_THROTTLE_BPS,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            max_buffer_size: MAX_BUFFER_SIZE,
            cache_dir: resolver.cache_dir().to_path_buf(),
            temp_dir: resolver.temp_dir().to_path_buf(),
        }
    }
}

impl XferConfig {
    /// Default configuration staging files under the given directories
    #[must_use]
    pub fn with_dirs(cache_dir: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            temp_dir: temp_dir.into(),
            ..Self::default()
        }
    }

    /// Parse from TOML text
    ///
    /// # Errors
    ///
    /// Returns `XferError::ConfigParse` for malformed TOML and
    /// `XferError::InvalidConfig` if the values fail [`Self::validate`].
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    ///
    /// Returns `XferError::Io` if the file cannot be read, otherwise as
    /// [`Self::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Serialize to TOML text
    ///
    /// # Errors
    ///
    /// Returns `XferError::ConfigSerialize` if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    /// Check limits and timeouts
    ///
    /// # Errors
    ///
    /// Returns `XferError::InvalidConfig` naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.max_incoming_xfers == 0 {
            return Err(XferError::InvalidConfig(
                "max_incoming_xfers must be non-zero".to_string(),
            ));
        }
        if self.max_outgoing_per_circuit == 0 {
            return Err(XferError::InvalidConfig(
                "max_outgoing_per_circuit must be non-zero".to_string(),
            ));
        }
        if self.hard_limit_outgoing_per_circuit != 0
            && self.hard_limit_outgoing_per_circuit < self.max_outgoing_per_circuit
        {
            return Err(XferError::InvalidConfig(format!(
                "hard_limit_outgoing_per_circuit ({}) is below max_outgoing_per_circuit ({})",
                self.hard_limit_outgoing_per_circuit, self.max_outgoing_per_circuit
            )));
        }
        if self.packet_timeout_ms == 0 {
            return Err(XferError::InvalidConfig(
                "packet_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.registration_timeout_ms == 0 {
            return Err(XferError::InvalidConfig(
                "registration_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(XferError::InvalidConfig(
                "tick_interval_ms must be non-zero".to_string(),
            ));
        }
        if self.max_buffer_size == 0 {
            return Err(XferError::InvalidConfig(
                "max_buffer_size must be non-zero".to_string(),
            ));
        }
        if !self.ack_throttle_bps.is_finite() || self.ack_throttle_bps < 0.0 {
            return Err(XferError::InvalidConfig(format!(
                "ack_throttle_bps must be a non-negative number, got {}",
                self.ack_throttle_bps
            )));
        }
        Ok(())
    }

    /// Confirmation wait before a resend
    #[must_use]
    pub fn packet_timeout(&self) -> Duration {
        Duration::from_millis(self.packet_timeout_ms)
    }

    /// Lifetime of an unrequested registered transfer
    #[must_use]
    pub fn registration_timeout(&self) -> Duration {
        Duration::from_millis(self.registration_timeout_ms)
    }

    /// Driver heartbeat
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Lowest confirmation rate that keeps every allowed download inside its
    /// packet timeout, in bits per second
    #[must_use]
    pub fn min_ack_throttle_bps(&self) -> f64 {
        (ACK_COST_BITS * self.max_incoming_xfers as f64) / self.packet_timeout().as_secs_f64()
    }

    /// Confirmation rate actually used: the requested rate, but never below
    /// 1.1 times [`Self::min_ack_throttle_bps`]
    #[must_use]
    pub fn effective_ack_throttle_bps(&self) -> f64 {
        let min_bps = self.min_ack_throttle_bps();
        let actual = (min_bps * 1.1).max(self.ack_throttle_bps);
        tracing::debug!("Ack throttle min rate: {} bps", min_bps);
        tracing::debug!("Ack throttle actual rate: {} bps", actual);
        actual
    }

    /// Path resolver for the configured directories
    #[must_use]
    pub fn path_resolver(&self) -> PathResolver {
        PathResolver::new(&self.cache_dir, &self.temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = XferConfig::default();
        assert_eq!(config.max_outgoing_per_circuit, 10);
        assert_eq!(config.hard_limit_outgoing_per_circuit, 500);
        assert_eq!(config.max_incoming_xfers, 1000);
        assert_eq!(config.packet_timeout(), Duration::from_secs(3));
        assert_eq!(config.retry_limit, 10);
        assert_eq!(config.registration_timeout(), Duration::from_secs(60));
        assert!(!config.use_ack_throttling);
        assert_eq!(config.max_buffer_size, 65536);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = XferConfig::from_toml_str(
            r#"
            max_outgoing_per_circuit = 4
            hard_limit_outgoing_per_circuit = 64
            use_ack_throttling = true
            cache_dir = "/var/cache/xfer"
            "#,
        )
        .unwrap();
        assert_eq!(config.max_outgoing_per_circuit, 4);
        assert_eq!(config.hard_limit_outgoing_per_circuit, 64);
        assert!(config.use_ack_throttling);
        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/xfer"));
        assert_eq!(config.retry_limit, DEFAULT_RETRY_LIMIT);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = XferConfig::with_dirs("/c", "/t");
        let text = config.to_toml_string().unwrap();
        assert_eq!(XferConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = XferConfig::from_toml_str("max_outgoing_per_circuit = 0").unwrap_err();
        assert!(matches!(err, XferError::InvalidConfig(_)));

        let err = XferConfig::from_toml_str(
            "max_outgoing_per_circuit = 20\nhard_limit_outgoing_per_circuit = 5",
        )
        .unwrap_err();
        assert!(err.to_string().contains("hard_limit_outgoing_per_circuit"));

        // No hard limit is fine
        assert!(XferConfig::from_toml_str("hard_limit_outgoing_per_circuit = 0").is_ok());

        let err = XferConfig::from_toml_str("retry_limit = \"ten\"").unwrap_err();
        assert!(matches!(err, XferError::ConfigParse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("xfer.toml");
        std::fs::write(&path, "packet_timeout_ms = 500\n").unwrap();
        let config = XferConfig::load(&path).unwrap();
        assert_eq!(config.packet_timeout(), Duration::from_millis(500));

        let missing = XferConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, XferError::Io(_)));
    }

    #[test]
    fn test_ack_throttle_clamp() {
        let mut config = XferConfig::default();
        // 8000 * 1000 / 3 = 2_666_666.67 bps minimum
        let min = config.min_ack_throttle_bps();
        assert!((min - 8_000_000.0 / 3.0).abs() < 1e-6);
        assert!((config.effective_ack_throttle_bps() - min * 1.1).abs() < 1e-6);

        config.ack_throttle_bps = 10_000_000.0;
        assert_eq!(config.effective_ack_throttle_bps(), 10_000_000.0);
    }
}
