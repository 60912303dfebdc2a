use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Error, Result};

/// Which transport variant carries the bus traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Physical serial line to a real machine
    #[default]
    Serial,
    /// DriveWire over TCP, used by emulators
    Becker,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMode::Serial => write!(f, "serial"),
            TransportMode::Becker => write!(f, "becker"),
        }
    }
}

impl FromStr for TransportMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "serial" => Ok(TransportMode::Serial),
            "becker" => Ok(TransportMode::Becker),
            other => Err(Error::config(format!("Unknown transport mode: {}", other))),
        }
    }
}

/// Configuration for a bus device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Transport active at startup
    pub mode: TransportMode,
    /// Serial device path (e.g. /dev/ttyUSB0)
    pub serial_device: Option<String>,
    /// Address the Becker port listens on
    pub becker_host: String,
    /// TCP port of the Becker listener
    pub becker_port: u16,
    /// Initial line speed
    pub baud_rate: u32,
    /// Upper bound on the wait for a declared-length payload
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub payload_timeout: Duration,
    /// How long one service iteration waits for bus activity
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mode: TransportMode::Serial,
            serial_device: None,
            becker_host: super::DEFAULT_BECKER_HOST.to_string(),
            becker_port: super::DEFAULT_BECKER_PORT,
            baud_rate: super::DEFAULT_BAUD_RATE,
            payload_timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl Config {
    /// Loads a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)
            .map_err(|e| Error::config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 {
            return Err(Error::config("Baud rate must be non-zero"));
        }
        if self.becker_port == 0 {
            return Err(Error::config("Becker port must be non-zero"));
        }
        if self.payload_timeout < Duration::from_millis(1) {
            return Err(Error::config("Payload timeout too small"));
        }
        if self.mode == TransportMode::Serial && self.serial_device.is_none() {
            return Err(Error::config("Serial mode requires a serial device"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("serial".parse::<TransportMode>().unwrap(), TransportMode::Serial);
        assert_eq!("BECKER".parse::<TransportMode>().unwrap(), TransportMode::Becker);
        assert!("usb".parse::<TransportMode>().is_err());
        assert_eq!(TransportMode::Becker.to_string(), "becker");
    }

    #[test]
    fn test_config_validation() {
        let config = Config {
            serial_device: Some("/dev/ttyUSB0".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        // Serial mode without a device
        assert!(Config::default().validate().is_err());

        // Becker mode does not need one
        let config = Config {
            mode: TransportMode::Becker,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let config = Config {
            baud_rate: 0,
            ..config.clone()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{ "mode": "becker", "becker_port": 6809, "payload_timeout": 1.5 }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.mode, TransportMode::Becker);
        assert_eq!(config.becker_port, 6809);
        assert_eq!(config.payload_timeout, Duration::from_millis(1500));
        // Unspecified fields keep their defaults
        assert_eq!(config.baud_rate, crate::core::DEFAULT_BAUD_RATE);
        assert_eq!(config.becker_host, "127.0.0.1");
    }

    #[test]
    fn test_config_from_file() {
        let path = std::env::temp_dir().join(format!("retrobus-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "mode": "serial", "serial_device": "/dev/ttyS0", "baud_rate": 57600 }"#).unwrap();

        let config = Config::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.serial_device.as_deref(), Some("/dev/ttyS0"));
        assert_eq!(config.baud_rate, 57600);
    }
}
