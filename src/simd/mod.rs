pub mod scalar;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod avx2;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod sse;

use crate::core::cpuid::CpuidSource;
use crate::core::hardware::CpuDetector;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
use crate::core::hardware::CpuFeatures;
use serde::Serialize;
use std::fmt;

pub type DotFunc = unsafe fn(&[f32], &[f32]) -> f32;

/// Kernel variant picked for this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CodePath {
    Avx2Fma,
    Sse,
    Scalar,
}

impl fmt::Display for CodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CodePath::Avx2Fma => "AVX2+FMA3",
            CodePath::Sse => "SSE",
            CodePath::Scalar => "scalar",
        })
    }
}

/// Picks the widest dot-product kernel the detector reports.
/// Driven by CPUID bits alone: use `get_dot_product` for a kernel to execute.
pub fn select_dot_product<S: CpuidSource>(detector: &CpuDetector<S>) -> (CodePath, DotFunc) {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        let features = detector.features();
        if features.contains(CpuFeatures::AVX2 | CpuFeatures::FMA3) {
            return (CodePath::Avx2Fma, avx2::dot_product_avx2);
        }
        if features.contains(CpuFeatures::SSE) {
            return (CodePath::Sse, sse::dot_product_sse);
        }
    }
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    let _ = detector;

    // Fallback
    (CodePath::Scalar, wrapper_scalar)
}

/// Kernel for the running CPU. CPUID can report AVX while the OS leaves YMM
/// state disabled in XCR0, so the choice is capped by std's runtime detection.
pub fn get_dot_product() -> (CodePath, DotFunc) {
    let selected = select_dot_product(&CpuDetector::native());

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        if selected.0 == CodePath::Avx2Fma
            && !(is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma"))
        {
            tracing::debug!("AVX2/FMA reported by CPUID but not enabled by the OS");
            if is_x86_feature_detected!("sse") {
                return (CodePath::Sse, sse::dot_product_sse);
            }
            return (CodePath::Scalar, wrapper_scalar);
        }
        if selected.0 == CodePath::Sse && !is_x86_feature_detected!("sse") {
            return (CodePath::Scalar, wrapper_scalar);
        }
    }

    selected
}

unsafe fn wrapper_scalar(a: &[f32], b: &[f32]) -> f32 {
    scalar::dot_product(a, b)
}
