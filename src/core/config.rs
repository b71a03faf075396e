//! Probe configuration.
//! Every field has a default matching a stock Linux layout; a TOML file
//! only needs to list what differs.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const HWMON_PATH: &str = "/sys/devices/platform/coretemp.0/hwmon/hwmon1/temp1_input";
pub const HWMON_ALT: &str = "/sys/class/hwmon/hwmon1/temp1_input";
pub const HWMON_ALT2: &str = "/sys/class/hwmon/hwmon0/temp1_input";
pub const CPUFREQ_PATH: &str = "/sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_cur_freq";
pub const CPUINFO_PATH: &str = "/proc/cpuinfo";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProbeConfig {
    pub sensors: SensorPaths,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SensorPaths {
    /// Tried in order; the first readable file wins.
    pub temperature: Vec<PathBuf>,
    pub frequency: PathBuf,
    pub cpuinfo: PathBuf,
}

impl Default for SensorPaths {
    fn default() -> Self {
        Self {
            temperature: vec![
                PathBuf::from(HWMON_PATH),
                PathBuf::from(HWMON_ALT),
                PathBuf::from(HWMON_ALT2),
            ],
            frequency: PathBuf::from(CPUFREQ_PATH),
            cpuinfo: PathBuf::from(CPUINFO_PATH),
        }
    }
}

impl ProbeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ProbeConfig::from_toml("").unwrap();
        assert_eq!(config, ProbeConfig::default());
        assert_eq!(config.sensors.temperature.len(), 3);
        assert_eq!(config.sensors.temperature[0], PathBuf::from(HWMON_PATH));
    }

    #[test]
    fn test_partial_override() {
        let config = ProbeConfig::from_toml(
            r#"
            [sensors]
            temperature = ["/tmp/t0", "/tmp/t1"]
            "#,
        )
        .unwrap();
        assert_eq!(config.sensors.temperature, vec![PathBuf::from("/tmp/t0"), PathBuf::from("/tmp/t1")]);
        assert_eq!(config.sensors.frequency, PathBuf::from(CPUFREQ_PATH));
        assert_eq!(config.sensors.cpuinfo, PathBuf::from(CPUINFO_PATH));
    }

    #[test]
    fn test_load_from_file() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "[sensors]\nfrequency = \"/tmp/freq\"")?;
        let config = ProbeConfig::load(file.path())?;
        assert_eq!(config.sensors.frequency, PathBuf::from("/tmp/freq"));
        Ok(())
    }

    #[test]
    fn test_bad_config_is_an_error() {
        let err = ProbeConfig::from_toml("[sensors]\nfrequency = 5").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = ProbeConfig::load(Path::new("/nonexistent/cpu_probe.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
