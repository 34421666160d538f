//! Hardware detection module
//!
//! Collects the static host facts (platform, core counts, memory) that the
//! probes size themselves from and the report records, using sysinfo.

mod system;

pub use system::HostInfo;
