//! CPUID Primitive
//! The single low-level query every capability check goes through.
//! Architecture differences live here and nowhere else.

use bytemuck::{Pod, Zeroable};
use std::collections::BTreeMap;

/// Known CPUID function numbers.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Selector {
    VendorId = 0,
    ProcessorInfo = 1,
    CacheTlbDescriptor = 2,
    ExtendedFeatures = 7,
    HighestExtendedFunction = 0x8000_0000,
    ExtendedProcessorInfo = 0x8000_0001,
    ProcessorBrandString1 = 0x8000_0002,
    ProcessorBrandString2 = 0x8000_0003,
    ProcessorBrandString3 = 0x8000_0004,
}

impl Selector {
    pub const BRAND_STRING: [Selector; 3] = [
        Selector::ProcessorBrandString1,
        Selector::ProcessorBrandString2,
        Selector::ProcessorBrandString3,
    ];

    pub fn leaf(self) -> u32 {
        self as u32
    }
}

/// Names a word of a [`ResultQuad`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Eax,
    Ebx,
    Ecx,
    Edx,
}

/// The four output words of one CPUID query.
/// Layout matches the register order so the raw bytes can be viewed verbatim.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ResultQuad {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
}

const _: () = assert!(std::mem::size_of::<ResultQuad>() == 16);

impl ResultQuad {
    pub const ZERO: ResultQuad = ResultQuad { eax: 0, ebx: 0, ecx: 0, edx: 0 };

    pub fn new(eax: u32, ebx: u32, ecx: u32, edx: u32) -> Self {
        Self { eax, ebx, ecx, edx }
    }

    pub fn word(&self, reg: Register) -> u32 {
        match reg {
            Register::Eax => self.eax,
            Register::Ebx => self.ebx,
            Register::Ecx => self.ecx,
            Register::Edx => self.edx,
        }
    }

    /// True when every bit of `mask` is set in `reg`.
    pub fn has_all(&self, reg: Register, mask: u32) -> bool {
        self.word(reg) & mask == mask
    }

    /// Raw bytes in eax, ebx, ecx, edx order, native endianness.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

/// Strategy for issuing the identification instruction.
pub trait CpuidSource {
    fn raw_query(&self, selector: u32) -> ResultQuad;

    /// Whether this source actually talks to an identification instruction.
    fn is_available(&self) -> bool;
}

/// Executes CPUID on the running processor (subleaf 0).
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[derive(Debug, Clone, Copy, Default)]
pub struct HardwareCpuid;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
impl CpuidSource for HardwareCpuid {
    #[allow(unused_unsafe)]
    fn raw_query(&self, selector: u32) -> ResultQuad {
        #[cfg(target_arch = "x86")]
        use std::arch::x86::__cpuid_count;
        #[cfg(target_arch = "x86_64")]
        use std::arch::x86_64::__cpuid_count;

        let r = unsafe { __cpuid_count(selector, 0) };
        tracing::trace!(selector, eax = r.eax, ebx = r.ebx, ecx = r.ecx, edx = r.edx, "cpuid");
        ResultQuad::new(r.eax, r.ebx, r.ecx, r.edx)
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Stand-in for architectures without CPUID. Every query is all zeros.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCpuid;

impl CpuidSource for NoCpuid {
    fn raw_query(&self, _selector: u32) -> ResultQuad {
        ResultQuad::ZERO
    }

    fn is_available(&self) -> bool {
        false
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub type NativeCpuid = HardwareCpuid;

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
pub type NativeCpuid = NoCpuid;

/// Replays a fixed table of responses. Selectors not in the table read as zero.
/// Useful for simulating a given processor.
#[derive(Debug, Clone, Default)]
pub struct TableCpuid {
    entries: BTreeMap<u32, ResultQuad>,
}

impl TableCpuid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, selector: Selector, quad: ResultQuad) -> Self {
        self.entries.insert(selector.leaf(), quad);
        self
    }

    pub fn insert(&mut self, selector: u32, quad: ResultQuad) {
        self.entries.insert(selector, quad);
    }
}

impl CpuidSource for TableCpuid {
    fn raw_query(&self, selector: u32) -> ResultQuad {
        self.entries.get(&selector).copied().unwrap_or(ResultQuad::ZERO)
    }

    fn is_available(&self) -> bool {
        true
    }
}

impl<T: CpuidSource + ?Sized> CpuidSource for &T {
    fn raw_query(&self, selector: u32) -> ResultQuad {
        (**self).raw_query(selector)
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Selector; 9] = [
        Selector::VendorId,
        Selector::ProcessorInfo,
        Selector::CacheTlbDescriptor,
        Selector::ExtendedFeatures,
        Selector::HighestExtendedFunction,
        Selector::ExtendedProcessorInfo,
        Selector::ProcessorBrandString1,
        Selector::ProcessorBrandString2,
        Selector::ProcessorBrandString3,
    ];

    #[test]
    fn test_no_cpuid_is_all_zero() {
        let src = NoCpuid;
        for sel in ALL {
            assert!(src.raw_query(sel.leaf()).is_zero(), "selector {:?}", sel);
        }
        assert!(src.raw_query(0xdead_beef).is_zero());
        assert!(!src.is_available());
    }

    #[test]
    fn test_table_lookup_and_default() {
        let quad = ResultQuad::new(1, 2, 3, 4);
        let src = TableCpuid::new().with(Selector::ProcessorInfo, quad);
        assert_eq!(src.raw_query(1), quad);
        assert!(src.raw_query(7).is_zero());
        assert!(src.is_available());
    }

    #[test]
    fn test_quad_word_and_mask() {
        let quad = ResultQuad::new(0, 0, 0b1011, 0);
        assert_eq!(quad.word(Register::Ecx), 0b1011);
        assert!(quad.has_all(Register::Ecx, 0b1010));
        assert!(!quad.has_all(Register::Ecx, 0b0110));
        assert!(!quad.has_all(Register::Edx, 1));
    }

    #[test]
    fn test_quad_bytes_follow_register_order() {
        let quad = ResultQuad::new(0x0403_0201, 0x0807_0605, 0x0c0b_0a09, 0x100f_0e0d);
        let bytes = quad.as_bytes();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[0..4], &0x0403_0201u32.to_ne_bytes());
        assert_eq!(&bytes[12..16], &0x100f_0e0du32.to_ne_bytes());
    }

    #[test]
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    fn test_hardware_vendor_leaf_is_populated() {
        // Every x86 CPU reports a vendor signature in leaf 0.
        let quad = HardwareCpuid.raw_query(Selector::VendorId.leaf());
        assert!(quad.ebx != 0 || quad.ecx != 0 || quad.edx != 0);
    }
}
