pub mod config;
pub mod cpuid;
pub mod diagnostics;
pub mod hardware;
pub mod sensors;
