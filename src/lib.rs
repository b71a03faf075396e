pub mod core;
pub mod simd;
