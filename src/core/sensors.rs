//! Host sensor readers: temperature, clock and model name.
//!
//! These are plain text scrapes of sysfs/procfs. A missing or unreadable
//! source is normal (containers, VMs, non-Linux hosts) and yields a zero or
//! empty value instead of an error.

use crate::core::config::SensorPaths;
use std::fs;
use std::path::Path;
use sysinfo::System;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SensorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unparseable value: {0:?}")]
    Parse(String),
    #[error("Missing field: {0}")]
    MissingField(&'static str),
}

pub trait ThermalSource {
    /// Degrees Celsius, 0.0 when unavailable.
    fn temperature_celsius(&self) -> f32;
}

pub trait ClockSource {
    /// Current clock in kHz, 0 when unavailable.
    fn frequency_khz(&self) -> u32;
}

pub trait ModelSource {
    /// Human readable model name, empty when unavailable.
    fn model_name(&self) -> String;

    /// `family:modelstepping:ncpus` in hex, empty when unavailable.
    fn model_id(&self) -> String;
}

/// Reads sensors from the files named in [`SensorPaths`].
#[derive(Debug, Clone)]
pub struct SysfsSensors {
    paths: SensorPaths,
    system_fallback: bool,
}

impl Default for SysfsSensors {
    fn default() -> Self {
        Self::new(SensorPaths::default())
    }
}

impl SysfsSensors {
    pub fn new(paths: SensorPaths) -> Self {
        Self { paths, system_fallback: true }
    }

    /// Do not consult `sysinfo` when the cpuinfo file has no model name.
    pub fn without_system_fallback(mut self) -> Self {
        self.system_fallback = false;
        self
    }

    fn read_cpuinfo(&self) -> Result<String, SensorError> {
        Ok(fs::read_to_string(&self.paths.cpuinfo)?)
    }
}

impl ThermalSource for SysfsSensors {
    fn temperature_celsius(&self) -> f32 {
        for path in &self.paths.temperature {
            match read_integer(path) {
                Ok(millidegrees) => return millidegrees as f32 / 1000.0,
                Err(e) => tracing::debug!(path = %path.display(), error = %e, "temperature source unavailable"),
            }
        }
        0.0
    }
}

impl ClockSource for SysfsSensors {
    fn frequency_khz(&self) -> u32 {
        let path = &self.paths.frequency;
        match read_integer(path) {
            Ok(khz) => u32::try_from(khz).unwrap_or(0),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "frequency source unavailable");
                0
            }
        }
    }
}

impl ModelSource for SysfsSensors {
    fn model_name(&self) -> String {
        match self.read_cpuinfo().and_then(|c| parse_model_name(&c)) {
            Ok(name) => name,
            Err(e) => {
                tracing::debug!(error = %e, "no model name in cpuinfo");
                if self.system_fallback {
                    system_brand()
                } else {
                    String::new()
                }
            }
        }
    }

    fn model_id(&self) -> String {
        match self.read_cpuinfo().and_then(|c| format_model_id(&c, logical_cpu_count())) {
            Ok(id) => id,
            Err(e) => {
                tracing::debug!(error = %e, "no model id in cpuinfo");
                String::new()
            }
        }
    }
}

/// Leading integer of a one-value sysfs file.
fn read_integer(path: &Path) -> Result<i64, SensorError> {
    let content = fs::read_to_string(path)?;
    let token = content.split_whitespace().next().unwrap_or("");
    token.parse().map_err(|_| SensorError::Parse(token.to_string()))
}

fn parse_value(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    Some((key.trim(), value.trim()))
}

/// First "model name" entry of a cpuinfo dump.
pub fn parse_model_name(cpuinfo: &str) -> Result<String, SensorError> {
    cpuinfo
        .lines()
        .filter_map(parse_value)
        .find(|(key, _)| *key == "model name")
        .map(|(_, value)| value.to_string())
        .ok_or(SensorError::MissingField("model name"))
}

/// Builds the model id from the first processor block of a cpuinfo dump.
pub fn format_model_id(cpuinfo: &str, ncpus: usize) -> Result<String, SensorError> {
    let mut family = None;
    let mut model = None;
    let mut stepping = None;

    for (key, value) in cpuinfo.lines().filter_map(parse_value) {
        let slot = match key {
            "cpu family" => &mut family,
            "model" => &mut model,
            "stepping" => &mut stepping,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value.parse::<u32>().map_err(|_| SensorError::Parse(value.to_string()))?);
        }
        if family.is_some() && model.is_some() && stepping.is_some() {
            break;
        }
    }

    let family = family.ok_or(SensorError::MissingField("cpu family"))?;
    let model = model.ok_or(SensorError::MissingField("model"))?;
    let stepping = stepping.ok_or(SensorError::MissingField("stepping"))?;
    Ok(format!("{:x}:{:02x}{:02x}:{}", family, model, stepping, ncpus))
}

fn cpu_system() -> System {
    let mut sys = System::new();
    sys.refresh_cpu();
    sys
}

fn system_brand() -> String {
    cpu_system()
        .cpus()
        .first()
        .map(|cpu| cpu.brand().trim().to_string())
        .unwrap_or_default()
}

pub fn logical_cpu_count() -> usize {
    cpu_system().cpus().len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::{NamedTempFile, TempDir};

    const CPUINFO: &str = "processor\t: 0\n\
vendor_id\t: GenuineIntel\n\
cpu family\t: 6\n\
model\t\t: 58\n\
model name\t: Intel(R) Xeon(R) CPU E3-1245 V2 @ 3.40GHz\n\
stepping\t: 9\n\
\n\
processor\t: 1\n\
vendor_id\t: GenuineIntel\n\
cpu family\t: 6\n\
model\t\t: 60\n\
model name\t: Something Else\n\
stepping\t: 3\n";

    fn file_with(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn missing(dir: &TempDir, name: &str) -> PathBuf {
        dir.path().join(name)
    }

    fn sensors(temperature: Vec<PathBuf>, frequency: PathBuf, cpuinfo: PathBuf) -> SysfsSensors {
        SysfsSensors::new(SensorPaths { temperature, frequency, cpuinfo }).without_system_fallback()
    }

    #[test]
    fn test_parse_model_name() {
        assert_eq!(parse_model_name(CPUINFO).unwrap(), "Intel(R) Xeon(R) CPU E3-1245 V2 @ 3.40GHz");
        assert!(matches!(parse_model_name("processor : 0\n"), Err(SensorError::MissingField(_))));
    }

    #[test]
    fn test_format_model_id() {
        assert_eq!(format_model_id(CPUINFO, 8).unwrap(), "6:3a09:8");

        let amd = "cpu family\t: 23\nmodel\t\t: 113\nstepping\t: 0\n";
        assert_eq!(format_model_id(amd, 16).unwrap(), "17:7100:16");

        let partial = "cpu family\t: 6\nmodel\t\t: 58\n";
        assert!(matches!(format_model_id(partial, 4), Err(SensorError::MissingField("stepping"))));
    }

    #[test]
    fn test_temperature_tries_paths_in_order() {
        let dir = TempDir::new().unwrap();
        let second = file_with("45500\n");
        let third = file_with("99000\n");
        let s = sensors(
            vec![missing(&dir, "temp1_input"), second.path().to_path_buf(), third.path().to_path_buf()],
            missing(&dir, "freq"),
            missing(&dir, "cpuinfo"),
        );
        assert_eq!(s.temperature_celsius(), 45.5);
    }

    #[test]
    fn test_temperature_skips_garbage() {
        let garbage = file_with("n/a\n");
        let good = file_with("30000");
        let s = SysfsSensors::new(SensorPaths {
            temperature: vec![garbage.path().to_path_buf(), good.path().to_path_buf()],
            ..SensorPaths::default()
        });
        assert_eq!(s.temperature_celsius(), 30.0);
    }

    #[test]
    fn test_everything_missing_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let s = sensors(vec![missing(&dir, "t")], missing(&dir, "f"), missing(&dir, "c"));
        assert_eq!(s.temperature_celsius(), 0.0);
        assert_eq!(s.frequency_khz(), 0);
        assert_eq!(s.model_name(), "");
        assert_eq!(s.model_id(), "");
    }

    #[test]
    fn test_frequency_and_model() {
        let freq = file_with("3400000\n");
        let cpuinfo = file_with(CPUINFO);
        let s = sensors(vec![], freq.path().to_path_buf(), cpuinfo.path().to_path_buf());
        assert_eq!(s.frequency_khz(), 3_400_000);
        assert_eq!(s.model_name(), "Intel(R) Xeon(R) CPU E3-1245 V2 @ 3.40GHz");

        assert_eq!(s.model_id(), format!("6:3a09:{}", logical_cpu_count()));
        assert!(logical_cpu_count() > 0);
    }

    #[test]
    fn test_negative_frequency_is_zero() {
        let freq = file_with("-1\n");
        let s = SysfsSensors::new(SensorPaths { frequency: freq.path().to_path_buf(), ..SensorPaths::default() });
        assert_eq!(s.frequency_khz(), 0);
    }
}
