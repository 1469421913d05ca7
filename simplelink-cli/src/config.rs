//! Configuration file support for the SimpleLink console

use serde::{Deserialize, Serialize};
use simplelink_protocol::congestion::{CarrierSense, CongestionControl, NeverDefer, PPersistence};
use simplelink::io::DEFAULT_BAUD;
use simplelink_protocol::{Address, Backoff, KissCommand, LinkConfig};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Station identity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StationConfig {
    /// Own callsign, up to six characters
    pub callsign: Option<String>,
}

/// Retry interval growth
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffMode {
    #[default]
    Linear,
    Exponential,
}

impl From<BackoffMode> for Backoff {
    fn from(mode: BackoffMode) -> Self {
        match mode {
            BackoffMode::Linear => Backoff::Linear,
            BackoffMode::Exponential => Backoff::Exponential,
        }
    }
}

/// Channel access strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum CongestionConfig {
    /// Transmit immediately
    #[default]
    None,
    /// Wait for the channel to be quiet
    CarrierSense {
        #[serde(default = "default_quiet_ms")]
        quiet_ms: u64,
    },
    /// p-persistent CSMA
    PPersistence {
        #[serde(default = "default_persistence")]
        persistence: u8,
        #[serde(default = "default_slot_time")]
        slot_time_ms: u64,
    },
}

fn default_quiet_ms() -> u64 {
    250
}

fn default_persistence() -> u8 {
    63
}

fn default_slot_time() -> u64 {
    100
}

impl CongestionConfig {
    pub fn build(&self) -> Box<dyn CongestionControl> {
        match *self {
            CongestionConfig::None => Box::new(NeverDefer),
            CongestionConfig::CarrierSense { quiet_ms } => Box::new(CarrierSense::new(quiet_ms)),
            CongestionConfig::PPersistence {
                persistence,
                slot_time_ms,
            } => Box::new(PPersistence::new(persistence, slot_time_ms)),
        }
    }
}

/// Link engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSection {
    #[serde(default = "default_base_retry")]
    pub base_retry_ms: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub backoff: BackoffMode,
    #[serde(default = "default_relay")]
    pub relay: bool,
    #[serde(default)]
    pub kiss_port: u8,
    #[serde(default)]
    pub congestion: CongestionConfig,
}

fn default_base_retry() -> u32 {
    LinkConfig::default().base_retry_ms
}

fn default_max_retries() -> u32 {
    LinkConfig::default().max_retries
}

fn default_relay() -> bool {
    true
}

impl Default for LinkSection {
    fn default() -> Self {
        LinkSection {
            base_retry_ms: default_base_retry(),
            max_retries: default_max_retries(),
            backoff: BackoffMode::default(),
            relay: default_relay(),
            kiss_port: 0,
            congestion: CongestionConfig::default(),
        }
    }
}

/// TNC connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TncConfig {
    /// KISS-over-TCP endpoint (`host:port`)
    pub address: Option<String>,
    /// Serial device of a hardware TNC
    pub serial: Option<String>,
    /// Serial line rate
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Use the echo loopback instead of a TNC
    #[serde(default)]
    pub loopback: bool,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// KISS parameters sent at startup, e.g. `["txdelay=30"]`
    #[serde(default)]
    pub kiss: Vec<String>,
}

fn default_connect_timeout() -> u64 {
    5_000
}

fn default_baud() -> u32 {
    DEFAULT_BAUD
}

impl Default for TncConfig {
    fn default() -> Self {
        TncConfig {
            address: None,
            serial: None,
            baud: default_baud(),
            loopback: false,
            connect_timeout_ms: default_connect_timeout(),
            kiss: Vec::new(),
        }
    }
}

impl TncConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// The single transport this section selects
    pub fn transport(&self) -> Result<TncTransport, ConfigError> {
        let selected = [self.address.is_some(), self.serial.is_some(), self.loopback]
            .iter()
            .filter(|&&on| on)
            .count();
        if selected > 1 {
            return Err(ConfigError::Invalid(
                "choose only one of a TNC address, a serial port or loopback".to_string(),
            ));
        }

        if let Some(address) = &self.address {
            return Ok(TncTransport::Tcp(address.clone()));
        }
        if let Some(path) = &self.serial {
            if self.baud == 0 {
                return Err(ConfigError::Invalid("baud rate must be positive".to_string()));
            }
            return Ok(TncTransport::Serial {
                path: path.clone(),
                baud: self.baud,
            });
        }
        if self.loopback {
            return Ok(TncTransport::Loopback);
        }
        Err(ConfigError::Invalid(
            "no TNC configured (use --tnc host:port, --serial PATH or --loopback)".to_string(),
        ))
    }
}

/// Transport selected by the `[tnc]` section
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TncTransport {
    /// KISS over TCP to `host:port`
    Tcp(String),
    /// KISS over a serial device
    Serial { path: String, baud: u32 },
    /// Echo loopback
    Loopback,
}

/// Combined configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub station: StationConfig,
    #[serde(default)]
    pub link: LinkSection,
    #[serde(default)]
    pub tnc: TncConfig,
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Example configuration for a Direwolf TNC on the local host
    pub fn example() -> Self {
        Config {
            station: StationConfig {
                callsign: Some("KI7EST".to_string()),
            },
            link: LinkSection {
                congestion: CongestionConfig::PPersistence {
                    persistence: default_persistence(),
                    slot_time_ms: default_slot_time(),
                },
                ..LinkSection::default()
            },
            tnc: TncConfig {
                address: Some("127.0.0.1:8001".to_string()),
                kiss: vec!["txdelay=30".to_string()],
                ..TncConfig::default()
            },
        }
    }

    /// Station address from the configured callsign
    pub fn station(&self) -> Result<Address, ConfigError> {
        let callsign = self
            .station
            .callsign
            .as_deref()
            .ok_or_else(|| ConfigError::Invalid("no callsign configured".to_string()))?;

        let address = Address::encode(callsign)
            .map_err(|e| ConfigError::Invalid(format!("callsign {:?}: {}", callsign, e)))?;
        if address.is_broadcast() {
            return Err(ConfigError::Invalid(
                "callsign cannot be the broadcast address".to_string(),
            ));
        }
        Ok(address)
    }

    /// Engine configuration from the `[link]` section
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            base_retry_ms: self.link.base_retry_ms,
            max_retries: self.link.max_retries,
            backoff: self.link.backoff.into(),
            relay: self.link.relay,
            kiss_port: self.link.kiss_port,
            ..LinkConfig::default()
        }
    }

    /// Parsed KISS startup parameters
    pub fn kiss_settings(&self) -> Result<Vec<(KissCommand, u8)>, ConfigError> {
        self.tnc.kiss.iter().map(|s| parse_kiss_setting(s)).collect()
    }

    /// Check that exactly one transport is selected
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tnc.transport().map(|_| ())
    }
}

/// Parse a `name=value` KISS parameter
///
/// `return` takes no value.
pub fn parse_kiss_setting(setting: &str) -> Result<(KissCommand, u8), ConfigError> {
    let (name, value) = match setting.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (setting, None),
    };

    let command: KissCommand = name.parse().map_err(ConfigError::Invalid)?;
    match (command, value) {
        (KissCommand::Return, None) => Ok((command, 0)),
        (KissCommand::Return, Some(_)) => Err(ConfigError::Invalid(
            "KISS return takes no value".to_string(),
        )),
        (_, None) => Err(ConfigError::Invalid(format!(
            "KISS {} needs a value (e.g. {}=30)",
            command, command
        ))),
        (_, Some(value)) => {
            let value = value.trim().parse::<u8>().map_err(|e| {
                ConfigError::Invalid(format!("KISS {} value {:?}: {}", command, value, e))
            })?;
            Ok((command, value))
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config() {
        let config = Config::example();
        assert!(config.validate().is_ok());
        assert_eq!(config.station().unwrap(), Address::encode("KI7EST").unwrap());
        assert_eq!(
            config.kiss_settings().unwrap(),
            vec![(KissCommand::TxDelay, 30)]
        );
    }

    #[test]
    fn test_serialize_deserialize() {
        let config = Config::example();
        let text = toml::to_string(&config).unwrap();
        let parsed = Config::from_toml(&text).unwrap();

        assert_eq!(parsed.tnc.address, config.tnc.address);
        assert_eq!(parsed.tnc.transport().unwrap(), config.tnc.transport().unwrap());
        assert_eq!(parsed.link.congestion, config.link.congestion);
    }

    #[test]
    fn test_defaults_from_empty_file() {
        let config = Config::from_toml("").unwrap();
        let link = config.link_config();

        assert_eq!(link, LinkConfig::default());
        assert_eq!(config.link.congestion, CongestionConfig::None);
        assert!(config.validate().is_err());
        assert!(config.station().is_err());
    }

    #[test]
    fn test_link_section() {
        let config = Config::from_toml(
            r#"
            [station]
            callsign = "n0call"

            [link]
            base_retry_ms = 800
            backoff = "exponential"
            relay = false

            [link.congestion]
            strategy = "carrier-sense"
            quiet_ms = 400

            [tnc]
            loopback = true
            "#,
        )
        .unwrap();

        let link = config.link_config();
        assert_eq!(link.base_retry_ms, 800);
        assert_eq!(link.backoff, Backoff::Exponential);
        assert!(!link.relay);
        assert_eq!(
            config.link.congestion,
            CongestionConfig::CarrierSense { quiet_ms: 400 }
        );
        assert_eq!(config.link.congestion.build().name(), "carrier-sense");
        assert_eq!(config.station().unwrap().to_string(), "N0CALL");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_both_transports_rejected() {
        let mut config = Config::example();
        config.tnc.loopback = true;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::example();
        config.tnc.serial = Some("/dev/ttyUSB0".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_serial_section() {
        let config = Config::from_toml(
            r#"
            [station]
            callsign = "KI7EST"

            [tnc]
            serial = "/dev/ttyUSB0"
            baud = 1200
            "#,
        )
        .unwrap();

        assert_eq!(
            config.tnc.transport().unwrap(),
            TncTransport::Serial {
                path: "/dev/ttyUSB0".to_string(),
                baud: 1200
            }
        );

        let defaulted = Config::from_toml("[tnc]\nserial = \"COM3\"").unwrap();
        assert_eq!(defaulted.tnc.baud, 9600);
        assert!(defaulted.validate().is_ok());

        let mut zero = defaulted;
        zero.tnc.baud = 0;
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_parse_kiss_setting() {
        assert_eq!(
            parse_kiss_setting("txdelay=30").unwrap(),
            (KissCommand::TxDelay, 30)
        );
        assert_eq!(
            parse_kiss_setting("persistence=63").unwrap(),
            (KissCommand::Persistence, 63)
        );
        assert_eq!(
            parse_kiss_setting("return").unwrap(),
            (KissCommand::Return, 0)
        );
        assert!(parse_kiss_setting("txdelay").is_err());
        assert!(parse_kiss_setting("txdelay=300").is_err());
        assert!(parse_kiss_setting("bogus=1").is_err());
    }
}
