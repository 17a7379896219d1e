use crate::collectors::{
    DiskUsage, HostInfo, MemoryUsage, MetricsProvider, ProviderError, TemperatureReading,
};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use sysinfo::{ComponentExt, CpuExt, DiskExt, System, SystemExt};
use tracing::debug;

/// `MetricsProvider` backed by `sysinfo`.
///
/// The `System` handle is guarded by a mutex that is never held across the
/// CPU sampling sleep, so other queries are not stalled by it.
pub struct SysinfoProvider {
    system: Mutex<System>,
}

impl SysinfoProvider {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_disks_list();
        system.refresh_components_list();
        Self {
            system: Mutex::new(system),
        }
    }

    /// Locks the shared handle; a poisoned lock fails the query that asked.
    fn lock<F>(&self, failed: F) -> Result<MutexGuard<'_, System>, ProviderError>
    where
        F: FnOnce(String) -> ProviderError,
    {
        self.system
            .lock()
            .map_err(|_| failed("system handle poisoned".to_string()))
    }
}

impl Default for SysinfoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsProvider for SysinfoProvider {
    fn virtual_memory(&self) -> Result<MemoryUsage, ProviderError> {
        let mut system = self.lock(ProviderError::Memory)?;
        system.refresh_memory();
        let total_bytes = system.total_memory();
        if total_bytes == 0 {
            return Err(ProviderError::Memory(
                "platform reported zero total memory".to_string(),
            ));
        }
        Ok(MemoryUsage {
            total_bytes,
            used_bytes: system.used_memory().min(total_bytes),
        })
    }

    fn cpu_percent_per_core(&self, window: Duration) -> Result<Vec<f64>, ProviderError> {
        self.lock(ProviderError::Cpu)?.refresh_cpu();
        std::thread::sleep(window);

        let mut system = self.lock(ProviderError::Cpu)?;
        system.refresh_cpu();
        let loads: Vec<f64> = system
            .cpus()
            .iter()
            .map(|c| f64::from(c.cpu_usage()))
            .collect();
        if loads.is_empty() {
            return Err(ProviderError::Cpu("no logical cores reported".to_string()));
        }
        Ok(loads)
    }

    fn disk_usage(&self, path: &str) -> Result<DiskUsage, ProviderError> {
        let mut system = self.lock(|reason| ProviderError::Disk {
            path: path.to_string(),
            reason,
        })?;
        system.refresh_disks_list();
        system.refresh_disks();
        let mounts: Vec<MountStat> = system
            .disks()
            .iter()
            .map(|d| MountStat {
                mount: d.mount_point().to_path_buf(),
                total_bytes: d.total_space(),
                available_bytes: d.available_space(),
            })
            .collect();

        let mount = select_mount(&mounts, Path::new(path)).ok_or_else(|| ProviderError::Disk {
            path: path.to_string(),
            reason: "no mounted filesystem contains this path".to_string(),
        })?;
        debug!(path, mount = %mount.mount.display(), "resolved disk mount");

        Ok(DiskUsage {
            total_bytes: mount.total_bytes,
            used_bytes: mount.total_bytes.saturating_sub(mount.available_bytes),
        })
    }

    fn temperatures(&self) -> Result<Vec<TemperatureReading>, ProviderError> {
        let mut system = self.lock(ProviderError::Sensors)?;
        system.refresh_components_list();
        system.refresh_components();
        Ok(system
            .components()
            .iter()
            .map(|c| TemperatureReading {
                label: c.label().to_string(),
                celsius: f64::from(c.temperature()),
            })
            .filter(|t| t.celsius.is_finite())
            .collect())
    }

    fn host_info(&self) -> Result<HostInfo, ProviderError> {
        let system = self.lock(ProviderError::Host)?;
        Ok(HostInfo {
            hostname: system.host_name().unwrap_or_default(),
            os: std::env::consts::OS.to_string(),
            uptime_seconds: system.uptime(),
        })
    }
}

#[derive(Debug, Clone)]
struct MountStat {
    mount: PathBuf,
    total_bytes: u64,
    available_bytes: u64,
}

/// Picks the most specific mount point that contains `path`.
fn select_mount<'a>(mounts: &'a [MountStat], path: &Path) -> Option<&'a MountStat> {
    mounts
        .iter()
        .filter(|m| path.starts_with(&m.mount))
        .max_by_key(|m| m.mount.components().count())
}
