//! Configuration management for Multiwan.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::routing::UplinkSet;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Routing table / priority layout.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Uplink descriptors; order defines id assignment.
    #[serde(default)]
    pub uplinks: Vec<UplinkConfig>,

    /// Monitoring cycle configuration.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {e}")))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| Error::Config(format!("failed to write config: {e}")))?;

        Ok(())
    }

    /// Validate configuration.
    ///
    /// Uplink entries are checked by assembling a throwaway [`UplinkSet`],
    /// so a bad entry fails here with its index rather than surfacing
    /// after routing state was partially installed.
    pub fn validate(&self) -> Result<()> {
        UplinkSet::new(&self.uplinks, &self.routing)?;

        if self.monitor.test_ips.is_empty() {
            return Err(Error::Config("no health test IPs configured".into()));
        }
        if self.monitor.required_successful_tests == 0
            || self.monitor.required_successful_tests as usize > self.monitor.test_ips.len()
        {
            return Err(Error::Config(format!(
                "required_successful_tests must be between 1 and {}",
                self.monitor.test_ips.len()
            )));
        }

        Ok(())
    }

    /// Get default config path.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("net", "multiwan", "multiwan").map_or_else(
            || PathBuf::from("multiwan.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }

    /// Create example configuration: two balanced uplinks plus one kept
    /// out of the default route.
    pub fn example() -> Self {
        Self {
            uplinks: vec![
                UplinkConfig {
                    description: Some("fiber".into()),
                    ip: Some("203.0.113.2".parse().unwrap()),
                    gateway: Some("203.0.113.1".parse().unwrap()),
                    weight: Some(2),
                    ..UplinkConfig::for_interface("eth1")
                },
                UplinkConfig {
                    description: Some("dsl".into()),
                    ip: Some("198.51.100.2".parse().unwrap()),
                    gateway: Some("198.51.100.1".parse().unwrap()),
                    weight: Some(1),
                    ..UplinkConfig::for_interface("eth2")
                },
                UplinkConfig {
                    description: Some("lte backup".into()),
                    default_route: false,
                    ..UplinkConfig::for_interface("ppp0")
                },
            ],
            ..Default::default()
        }
    }
}

/// Routing table and policy-rule layout.
///
/// `base_priority` must sit clear of priorities used by pre-existing
/// system rules; the derived per-uplink values grow upward from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// First per-uplink routing table id.
    #[serde(default = "default_base_table")]
    pub base_table: u32,

    /// Base for `priority1`/`priority2` derivation.
    #[serde(default = "default_base_priority")]
    pub base_priority: u32,

    /// First per-uplink firewall mark.
    #[serde(default = "default_base_fwmark")]
    pub base_fwmark: u32,
}

fn default_base_table() -> u32 {
    1
}
fn default_base_priority() -> u32 {
    40_000
}
fn default_base_fwmark() -> u32 {
    1
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            base_table: default_base_table(),
            base_priority: default_base_priority(),
            base_fwmark: default_base_fwmark(),
        }
    }
}

/// One uplink descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UplinkConfig {
    /// Network interface name.
    pub interface: String,

    /// Human-readable name for status messages; defaults to the interface.
    pub description: Option<String>,

    /// Static interface address. Leave unset for links that acquire one
    /// dynamically (PPP, DHCP); the probe supplies it each cycle.
    pub ip: Option<IpAddr>,

    /// Static gateway address; same rules as `ip`.
    pub gateway: Option<IpAddr>,

    /// Explicit priority for the source-address rule; derived from the
    /// uplink position when unset.
    pub priority: Option<u32>,

    /// Multipath weight; unset means equal-weight balancing.
    pub weight: Option<u32>,

    /// Whether this uplink may carry the default route.
    #[serde(default = "default_true")]
    pub default_route: bool,

    /// Initial routing participation; defaults to `default_route`.
    pub routing: Option<bool>,
}

fn default_true() -> bool {
    true
}

impl UplinkConfig {
    /// A descriptor with everything derived or unset except the interface.
    pub fn for_interface(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            description: None,
            ip: None,
            gateway: None,
            priority: None,
            weight: None,
            default_route: true,
            routing: None,
        }
    }
}

/// Monitoring cycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Interval between monitoring cycles.
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Addresses pinged through each uplink to judge its health.
    #[serde(default = "default_test_ips")]
    pub test_ips: Vec<IpAddr>,

    /// Successful pings needed before an uplink counts as up.
    #[serde(default = "default_required_successful")]
    pub required_successful_tests: u32,

    /// Per-ping timeout.
    #[serde(default = "default_ping_timeout", with = "humantime_serde")]
    pub ping_timeout: Duration,
}

fn default_interval() -> Duration {
    Duration::from_secs(30)
}
fn default_test_ips() -> Vec<IpAddr> {
    [
        "8.8.8.8",
        "8.8.4.4",
        "1.1.1.1",
        "1.0.0.1",
        "208.67.222.222",
        "208.67.220.220",
    ]
    .iter()
    .map(|s| s.parse().expect("static address"))
    .collect()
}
fn default_required_successful() -> u32 {
    3
}
fn default_ping_timeout() -> Duration {
    Duration::from_secs(2)
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            test_ips: default_test_ips(),
            required_successful_tests: default_required_successful(),
            ping_timeout: default_ping_timeout(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text or json).
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Enable colored output.
    #[serde(default = "default_color")]
    pub color: bool,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}
fn default_color() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            color: default_color(),
        }
    }
}

/// Initialize logging.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Config(format!("failed to init logging: {e}")))?;
    } else {
        subscriber
            .with(fmt::layer().with_ansi(config.color))
            .try_init()
            .map_err(|e| Error::Config(format!("failed to init logging: {e}")))?;
    }

    Ok(())
}
