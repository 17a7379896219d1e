pub mod system;

#[cfg(test)]
pub mod stub;

use std::time::Duration;
use thiserror::Error;

/// Blocking access to the host's metric sources.
///
/// Every method may fail independently. Implementations are queried from the
/// blocking thread pool, so they are free to block (the CPU query blocks for
/// the whole sampling window).
pub trait MetricsProvider: Send + Sync {
    fn virtual_memory(&self) -> Result<MemoryUsage, ProviderError>;

    /// Utilisation per logical core, in core index order, measured over `window`.
    fn cpu_percent_per_core(&self, window: Duration) -> Result<Vec<f64>, ProviderError>;

    /// Usage of the filesystem that contains `path`.
    fn disk_usage(&self, path: &str) -> Result<DiskUsage, ProviderError>;

    fn temperatures(&self) -> Result<Vec<TemperatureReading>, ProviderError>;

    fn host_info(&self) -> Result<HostInfo, ProviderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureReading {
    pub label: String,
    pub celsius: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub hostname: String,
    pub os: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("memory query failed: {0}")]
    Memory(String),
    #[error("cpu query failed: {0}")]
    Cpu(String),
    #[error("disk query for {path} failed: {reason}")]
    Disk { path: String, reason: String },
    #[error("sensor query failed: {0}")]
    Sensors(String),
    #[error("host query failed: {0}")]
    Host(String),
}

impl ProviderError {
    /// Short label used for logs and the error counter.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Memory(_) => "memory",
            ProviderError::Cpu(_) => "cpu",
            ProviderError::Disk { .. } => "disk",
            ProviderError::Sensors(_) => "sensors",
            ProviderError::Host(_) => "host",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_the_failed_query() {
        let disk = ProviderError::Disk {
            path: "/data".to_string(),
            reason: "gone".to_string(),
        };
        assert_eq!(disk.kind(), "disk");
        assert_eq!(ProviderError::Memory(String::new()).kind(), "memory");
        assert_eq!(ProviderError::Cpu(String::new()).kind(), "cpu");
        assert_eq!(ProviderError::Sensors(String::new()).kind(), "sensors");
        assert_eq!(ProviderError::Host(String::new()).kind(), "host");
        assert_eq!(
            ProviderError::Sensors("no hwmon".to_string()).to_string(),
            "sensor query failed: no hwmon"
        );
    }
}
