//! Logging and metrics configuration.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use tracing_subscriber::filter::LevelFilter;

/// Log verbosity.
///
/// Accepts either the level name or the numeric level used by older
/// deployments (`0` none through `4` debug). Numbers above 4 fall back to
/// errors only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "VerbosityRepr")]
pub enum Verbosity {
    None,
    Error,
    Warning,
    #[default]
    Info,
    Debug,
}

impl Verbosity {
    pub fn from_level(level: u64) -> Self {
        match level {
            0 => Verbosity::None,
            1 => Verbosity::Error,
            2 => Verbosity::Warning,
            3 => Verbosity::Info,
            4 => Verbosity::Debug,
            _ => Verbosity::Error,
        }
    }

    pub fn as_filter(&self) -> LevelFilter {
        match self {
            Verbosity::None => LevelFilter::OFF,
            Verbosity::Error => LevelFilter::ERROR,
            Verbosity::Warning => LevelFilter::WARN,
            Verbosity::Info => LevelFilter::INFO,
            Verbosity::Debug => LevelFilter::DEBUG,
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verbosity::None => "none",
            Verbosity::Error => "error",
            Verbosity::Warning => "warning",
            Verbosity::Info => "info",
            Verbosity::Debug => "debug",
        };
        f.write_str(name)
    }
}

impl FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(level) = s.parse::<u64>() {
            return Ok(Self::from_level(level));
        }
        match s.to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(Verbosity::None),
            "error" => Ok(Verbosity::Error),
            "warning" | "warn" => Ok(Verbosity::Warning),
            "info" => Ok(Verbosity::Info),
            "debug" => Ok(Verbosity::Debug),
            other => Err(format!("unknown verbosity level: {other}")),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VerbosityRepr {
    Level(u64),
    Name(String),
}

impl TryFrom<VerbosityRepr> for Verbosity {
    type Error = String;

    fn try_from(repr: VerbosityRepr) -> Result<Self, String> {
        match repr {
            VerbosityRepr::Level(level) => Ok(Self::from_level(level)),
            VerbosityRepr::Name(name) => name.parse(),
        }
    }
}

/// Logging and metrics configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub verbosity: Verbosity,
    /// Emit JSON log lines instead of the human-readable format.
    #[serde(default)]
    pub json: bool,
    /// Prometheus HTTP port. `0` disables the endpoint.
    #[serde(default)]
    pub metrics_port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_levels_match_legacy_values() {
        assert_eq!(Verbosity::from_level(0), Verbosity::None);
        assert_eq!(Verbosity::from_level(1), Verbosity::Error);
        assert_eq!(Verbosity::from_level(2), Verbosity::Warning);
        assert_eq!(Verbosity::from_level(3), Verbosity::Info);
        assert_eq!(Verbosity::from_level(4), Verbosity::Debug);
        assert_eq!(Verbosity::from_level(9), Verbosity::Error);
    }

    #[test]
    fn parses_names_and_digits() {
        assert_eq!("warning".parse::<Verbosity>().unwrap(), Verbosity::Warning);
        assert_eq!("WARN".parse::<Verbosity>().unwrap(), Verbosity::Warning);
        assert_eq!("none".parse::<Verbosity>().unwrap(), Verbosity::None);
        assert_eq!("4".parse::<Verbosity>().unwrap(), Verbosity::Debug);
        assert!("loud".parse::<Verbosity>().is_err());
    }

    #[test]
    fn filter_mapping() {
        assert_eq!(Verbosity::None.as_filter(), LevelFilter::OFF);
        assert_eq!(Verbosity::Warning.as_filter(), LevelFilter::WARN);
        assert_eq!(Verbosity::Debug.as_filter(), LevelFilter::DEBUG);
    }

    #[test]
    fn deserializes_from_either_form() {
        let by_name: TelemetryConfig = toml::from_str("verbosity = \"debug\"").unwrap();
        let by_level: TelemetryConfig = toml::from_str("verbosity = 1").unwrap();
        assert_eq!(by_name.verbosity, Verbosity::Debug);
        assert_eq!(by_level.verbosity, Verbosity::Error);
    }
}
