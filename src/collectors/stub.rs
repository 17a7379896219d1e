use crate::collectors::{
    DiskUsage, HostInfo, MemoryUsage, MetricsProvider, ProviderError, TemperatureReading,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

const GIB: u64 = 1024 * 1024 * 1024;

/// Canned readings for tests. CPU queries can be made to fail a fixed number
/// of times before succeeding again.
pub struct StubProvider {
    pub memory: MemoryUsage,
    pub cpus: Vec<f64>,
    pub disk: DiskUsage,
    pub temps: Vec<TemperatureReading>,
    pub host: HostInfo,
    cpu_failures_left: AtomicU32,
    cpu_calls: AtomicU32,
}

impl StubProvider {
    pub fn reference() -> Self {
        Self {
            memory: MemoryUsage {
                total_bytes: 16 * GIB,
                used_bytes: 8 * GIB,
            },
            cpus: vec![25.4, 76.9],
            disk: DiskUsage {
                total_bytes: 500 * GIB,
                used_bytes: 250 * GIB,
            },
            temps: Vec::new(),
            host: HostInfo {
                hostname: "host1".to_string(),
                os: "linux".to_string(),
                uptime_seconds: 3661,
            },
            cpu_failures_left: AtomicU32::new(0),
            cpu_calls: AtomicU32::new(0),
        }
    }

    pub fn failing_cpu(self, times: u32) -> Self {
        self.cpu_failures_left.store(times, Ordering::SeqCst);
        self
    }

    pub fn cpu_calls(&self) -> u32 {
        self.cpu_calls.load(Ordering::SeqCst)
    }
}

impl MetricsProvider for StubProvider {
    fn virtual_memory(&self) -> Result<MemoryUsage, ProviderError> {
        Ok(self.memory)
    }

    fn cpu_percent_per_core(&self, _window: Duration) -> Result<Vec<f64>, ProviderError> {
        self.cpu_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .cpu_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ProviderError::Cpu("injected failure".to_string()));
        }
        Ok(self.cpus.clone())
    }

    fn disk_usage(&self, _path: &str) -> Result<DiskUsage, ProviderError> {
        Ok(self.disk)
    }

    fn temperatures(&self) -> Result<Vec<TemperatureReading>, ProviderError> {
        Ok(self.temps.clone())
    }

    fn host_info(&self) -> Result<HostInfo, ProviderError> {
        Ok(self.host.clone())
    }
}
