//! Hardware Detection Module
//! Queries CPU features at runtime by decoding CPUID bitfields.

use crate::core::cpuid::{CpuidSource, NativeCpuid, Register, ResultQuad, Selector};
use bitflags::bitflags;
use serde::Serialize;

// Leaf 1 ECX
pub const XOP_FLAG: u32 = 1 << 11;
pub const FMA3_FLAG: u32 = 1 << 12;
pub const SSE42_FLAG: u32 = 1 << 20;
pub const AES_FLAG: u32 = 1 << 25;
pub const XSAVE_FLAG: u32 = 1 << 26;
pub const OSXSAVE_FLAG: u32 = 1 << 27;
pub const AVX1_FLAG: u32 = 1 << 28;

// Leaf 1 EDX
pub const SSE_FLAG: u32 = 1 << 25;
pub const SSE2_FLAG: u32 = 1 << 26;

// Leaf 7 EBX
pub const AVX2_FLAG: u32 = 1 << 5;

/// AVX is only usable when the OS saves the extended state (XSAVE + OSXSAVE).
pub const AVX1_MASK: u32 = AVX1_FLAG | XSAVE_FLAG | OSXSAVE_FLAG;
pub const FMA3_MASK: u32 = FMA3_FLAG | AVX1_MASK;

/// Label returned by `best_feature_label` when the platform has no CPUID.
#[cfg(any(target_arch = "arm", target_arch = "aarch64"))]
pub const PLATFORM_LABEL: &str = "ARM";
#[cfg(not(any(target_arch = "arm", target_arch = "aarch64")))]
pub const PLATFORM_LABEL: &str = "GENERIC";

pub const BRAND_LEN: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Capability {
    Sse,
    Sse2,
    Sse42,
    AesNi,
    Avx1,
    Avx2,
    Fma3,
    Xop,
}

impl Capability {
    pub const ALL: [Capability; 8] = [
        Capability::Sse,
        Capability::Sse2,
        Capability::Sse42,
        Capability::AesNi,
        Capability::Avx1,
        Capability::Avx2,
        Capability::Fma3,
        Capability::Xop,
    ];

    /// Widest/newest vector ISA first. Callers pick their code path from this order.
    pub const PREFERENCE: [Capability; 7] = [
        Capability::Avx2,
        Capability::Avx1,
        Capability::Fma3,
        Capability::Xop,
        Capability::Sse42,
        Capability::Sse2,
        Capability::Sse,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Capability::Sse => "SSE",
            Capability::Sse2 => "SSE2",
            Capability::Sse42 => "SSE42",
            Capability::AesNi => "AES-NI",
            Capability::Avx1 => "AVX1",
            Capability::Avx2 => "AVX2",
            Capability::Fma3 => "FMA3",
            Capability::Xop => "XOP",
        }
    }

    /// (selector, register, mask): all bits of mask must be set.
    pub fn requirement(self) -> (Selector, Register, u32) {
        match self {
            Capability::Sse => (Selector::ProcessorInfo, Register::Edx, SSE_FLAG),
            Capability::Sse2 => (Selector::ProcessorInfo, Register::Edx, SSE2_FLAG),
            Capability::Sse42 => (Selector::ProcessorInfo, Register::Ecx, SSE42_FLAG),
            Capability::AesNi => (Selector::ProcessorInfo, Register::Ecx, AES_FLAG),
            Capability::Avx1 => (Selector::ProcessorInfo, Register::Ecx, AVX1_MASK),
            Capability::Fma3 => (Selector::ProcessorInfo, Register::Ecx, FMA3_MASK),
            Capability::Xop => (Selector::ProcessorInfo, Register::Ecx, XOP_FLAG),
            Capability::Avx2 => (Selector::ExtendedFeatures, Register::Ebx, AVX2_FLAG),
        }
    }

    fn flag(self) -> CpuFeatures {
        match self {
            Capability::Sse => CpuFeatures::SSE,
            Capability::Sse2 => CpuFeatures::SSE2,
            Capability::Sse42 => CpuFeatures::SSE42,
            Capability::AesNi => CpuFeatures::AES_NI,
            Capability::Avx1 => CpuFeatures::AVX1,
            Capability::Avx2 => CpuFeatures::AVX2,
            Capability::Fma3 => CpuFeatures::FMA3,
            Capability::Xop => CpuFeatures::XOP,
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

bitflags! {
    /// Snapshot of every capability the detector found.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CpuFeatures: u32 {
        const SSE    = 1 << 0;
        const SSE2   = 1 << 1;
        const SSE42  = 1 << 2;
        const AES_NI = 1 << 3;
        const AVX1   = 1 << 4;
        const AVX2   = 1 << 5;
        const FMA3   = 1 << 6;
        const XOP    = 1 << 7;
    }
}

impl CpuFeatures {
    /// Features of the running host.
    pub fn detect() -> Self {
        CpuDetector::native().features()
    }

    pub fn contains_capability(&self, cap: Capability) -> bool {
        self.contains(cap.flag())
    }

    /// Labels of the contained capabilities, in `Capability::ALL` order.
    pub fn labels(&self) -> Vec<&'static str> {
        Capability::ALL
            .iter()
            .filter(|c| self.contains_capability(**c))
            .map(|c| c.label())
            .collect()
    }
}

/// Distinguishes "the CPU lacks it" from "we cannot ask".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Support {
    Present,
    Absent,
    Undetectable,
}

/// Family/model/stepping from leaf 1 EAX, with the extended fields folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ProcessorSignature {
    pub family: u32,
    pub model: u32,
    pub stepping: u32,
}

impl ProcessorSignature {
    pub fn from_eax(eax: u32) -> Self {
        let base_family = (eax >> 8) & 0xF;
        let base_model = (eax >> 4) & 0xF;
        let stepping = eax & 0xF;

        let family = if base_family == 0xF {
            base_family + ((eax >> 20) & 0xFF)
        } else {
            base_family
        };
        let model = if base_family == 0x6 || base_family == 0xF {
            base_model | (((eax >> 16) & 0xF) << 4)
        } else {
            base_model
        };

        Self { family, model, stepping }
    }
}

/// Answers capability questions from a CPUID source.
/// Holds no state besides the source; every call re-queries.
#[derive(Debug, Clone, Default)]
pub struct CpuDetector<S = NativeCpuid> {
    source: S,
}

impl CpuDetector<NativeCpuid> {
    pub fn native() -> Self {
        Self { source: NativeCpuid::default() }
    }
}

impl<S: CpuidSource> CpuDetector<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn is_available(&self) -> bool {
        self.source.is_available()
    }

    pub fn query_capability_flags(&self, selector: Selector) -> ResultQuad {
        self.source.raw_query(selector.leaf())
    }

    pub fn supports(&self, cap: Capability) -> bool {
        let (selector, reg, mask) = cap.requirement();
        self.query_capability_flags(selector).has_all(reg, mask)
    }

    pub fn support(&self, cap: Capability) -> Support {
        if !self.is_available() {
            Support::Undetectable
        } else if self.supports(cap) {
            Support::Present
        } else {
            Support::Absent
        }
    }

    pub fn supports_sse(&self) -> bool {
        self.supports(Capability::Sse)
    }

    pub fn supports_sse2(&self) -> bool {
        self.supports(Capability::Sse2)
    }

    pub fn supports_sse42(&self) -> bool {
        self.supports(Capability::Sse42)
    }

    /// Nehalem and later.
    pub fn supports_aes_ni(&self) -> bool {
        self.supports(Capability::AesNi)
    }

    pub fn supports_avx1(&self) -> bool {
        self.supports(Capability::Avx1)
    }

    /// Haswell and later.
    pub fn supports_avx2(&self) -> bool {
        self.supports(Capability::Avx2)
    }

    pub fn supports_fma3(&self) -> bool {
        self.supports(Capability::Fma3)
    }

    pub fn supports_xop(&self) -> bool {
        self.supports(Capability::Xop)
    }

    /// All capabilities at once. Each selector is queried a single time.
    pub fn features(&self) -> CpuFeatures {
        let info = self.query_capability_flags(Selector::ProcessorInfo);
        let extended = self.query_capability_flags(Selector::ExtendedFeatures);

        let mut features = CpuFeatures::empty();
        for cap in Capability::ALL {
            let (selector, reg, mask) = cap.requirement();
            let quad = match selector {
                Selector::ExtendedFeatures => &extended,
                _ => &info,
            };
            if quad.has_all(reg, mask) {
                features |= cap.flag();
            }
        }
        features
    }

    /// First capability in preference order. AVX2 only counts alongside AVX1.
    pub fn best_feature(&self) -> Option<Capability> {
        let features = self.features();
        Capability::PREFERENCE.into_iter().find(|cap| match cap {
            Capability::Avx2 => features.contains(CpuFeatures::AVX2 | CpuFeatures::AVX1),
            other => features.contains_capability(*other),
        })
    }

    pub fn best_feature_label(&self) -> String {
        if !self.is_available() {
            return PLATFORM_LABEL.to_string();
        }
        self.best_feature()
            .map(|c| c.label().to_string())
            .unwrap_or_default()
    }

    /// Copies the three brand-string leaves into `buf` when leaf 0 reports
    /// at least 4 basic functions. Otherwise `buf` is not touched.
    pub fn fill_brand_string(&self, buf: &mut [u8; BRAND_LEN]) -> bool {
        if self.highest_function() < 4 {
            return false;
        }
        for (chunk, selector) in buf.chunks_exact_mut(16).zip(Selector::BRAND_STRING) {
            chunk.copy_from_slice(self.query_capability_flags(selector).as_bytes());
        }
        true
    }

    pub fn brand_string(&self) -> String {
        let mut buf = [0u8; BRAND_LEN];
        self.fill_brand_string(&mut buf);
        let end = buf.iter().position(|&b| b == 0).unwrap_or(BRAND_LEN);
        String::from_utf8_lossy(&buf[..end]).trim().to_string()
    }

    pub fn highest_function(&self) -> u32 {
        self.query_capability_flags(Selector::VendorId).eax
    }

    /// Coarse era guess from the highest basic leaf. Not a model lookup.
    pub fn highest_extended_function_label(&self) -> String {
        match self.highest_function() {
            0x16 => "Skylake".to_string(),
            0xd => "IvyBridge".to_string(),
            0xb => "Corei7".to_string(),
            0xa => "Core2".to_string(),
            other => format!("undefined: {:#x}", other),
        }
    }

    /// 12-character vendor id, e.g. "GenuineIntel". Empty without CPUID.
    pub fn vendor_id(&self) -> String {
        let quad = self.query_capability_flags(Selector::VendorId);
        let raw = quad.as_bytes();
        let mut vendor = Vec::with_capacity(12);
        vendor.extend_from_slice(&raw[4..8]); // ebx
        vendor.extend_from_slice(&raw[12..16]); // edx
        vendor.extend_from_slice(&raw[8..12]); // ecx
        let end = vendor.iter().position(|&b| b == 0).unwrap_or(vendor.len());
        String::from_utf8_lossy(&vendor[..end]).into_owned()
    }

    pub fn signature(&self) -> ProcessorSignature {
        ProcessorSignature::from_eax(self.query_capability_flags(Selector::ProcessorInfo).eax)
    }
}
