use crate::core::cpuid::CpuidSource;
use crate::core::hardware::{Capability, CpuDetector, ProcessorSignature, Support};
use crate::core::sensors::{ClockSource, ModelSource, ThermalSource};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Serialize)]
pub struct FeatureStatus {
    pub name: &'static str,
    pub support: Support,
}

/// Operator facing snapshot of the host CPU.
#[derive(Debug, Clone, Serialize)]
pub struct HostReport {
    pub cpuid_available: bool,
    pub brand: String,
    pub vendor: String,
    pub signature: ProcessorSignature,
    pub highest_function: u32,
    pub era: String,
    pub best_feature: String,
    pub features: Vec<FeatureStatus>,
    pub temperature_c: f32,
    pub clock_khz: u32,
    pub model_name: String,
    pub model_id: String,
}

impl HostReport {
    pub fn collect<S, T>(detector: &CpuDetector<S>, sensors: &T) -> Self
    where
        S: CpuidSource,
        T: ThermalSource + ClockSource + ModelSource,
    {
        Self {
            cpuid_available: detector.is_available(),
            brand: detector.brand_string(),
            vendor: detector.vendor_id(),
            signature: detector.signature(),
            highest_function: detector.highest_function(),
            era: detector.highest_extended_function_label(),
            best_feature: detector.best_feature_label(),
            features: feature_table(detector),
            temperature_c: sensors.temperature_celsius(),
            clock_khz: sensors.frequency_khz(),
            model_name: sensors.model_name(),
            model_id: sensors.model_id(),
        }
    }

    /// Brand string when CPUID provides one, otherwise the OS model name.
    pub fn display_name(&self) -> &str {
        if self.brand.is_empty() {
            &self.model_name
        } else {
            &self.brand
        }
    }
}

pub fn feature_table<S: CpuidSource>(detector: &CpuDetector<S>) -> Vec<FeatureStatus> {
    Capability::ALL
        .iter()
        .map(|&cap| FeatureStatus { name: cap.label(), support: detector.support(cap) })
        .collect()
}

impl fmt::Display for Support {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Support::Present => "yes",
            Support::Absent => "no",
            Support::Undetectable => "n/a",
        })
    }
}

impl fmt::Display for HostReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CPU:          {}", self.display_name())?;
        writeln!(f, "Vendor:       {}", self.vendor)?;
        writeln!(
            f,
            "Signature:    family {:#x}, model {:#x}, stepping {}",
            self.signature.family, self.signature.model, self.signature.stepping
        )?;
        writeln!(f, "Model id:     {}", self.model_id)?;
        writeln!(f, "Max leaf:     {:#x} ({})", self.highest_function, self.era)?;
        writeln!(f, "Best feature: {}", self.best_feature)?;
        let present: Vec<&str> = self
            .features
            .iter()
            .filter(|s| s.support == Support::Present)
            .map(|s| s.name)
            .collect();
        writeln!(f, "Features:     {}", present.join(" "))?;
        writeln!(f, "Temperature:  {:.1} C", self.temperature_c)?;
        write!(f, "Clock:        {} kHz", self.clock_khz)?;
        if !self.cpuid_available {
            write!(f, "\n(CPUID unavailable on this platform)")?;
        }
        Ok(())
    }
}
