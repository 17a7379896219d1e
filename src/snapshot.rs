use crate::collectors::{MetricsProvider, ProviderError};
use serde::Serialize;
use std::time::Duration;

/// Window over which per-core CPU utilisation is measured.
pub const CPU_SAMPLE_WINDOW: Duration = Duration::from_secs(1);

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// One tick's worth of display-ready host metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub total_disk_gb: f64,
    pub used_disk_gb: f64,
    pub disk_used_percent: f64,
    pub total_memory_gb: f64,
    pub used_memory_gb: f64,
    pub memory_used_percent: f64,
    pub cpu_loads: Vec<f64>,
    pub hostname: String,
    pub uptime: String,
    pub os_name: String,
    pub temperatures: Vec<Temperature>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Temperature {
    pub label: String,
    pub celsius: f64,
}

/// Queries every provider method once and normalises the readings.
///
/// Blocks for at least [`CPU_SAMPLE_WINDOW`]. Nothing is cached between calls.
pub fn build_snapshot(
    provider: &dyn MetricsProvider,
    disk_path: &str,
) -> Result<Snapshot, ProviderError> {
    let memory = provider.virtual_memory()?;
    let cpus = provider.cpu_percent_per_core(CPU_SAMPLE_WINDOW)?;
    let temps = provider.temperatures()?;
    let host = provider.host_info()?;
    let disk = provider.disk_usage(disk_path)?;

    let memory_used = memory.used_bytes.min(memory.total_bytes);
    let disk_used = disk.used_bytes.min(disk.total_bytes);

    Ok(Snapshot {
        total_disk_gb: to_gb(disk.total_bytes),
        used_disk_gb: to_gb(disk_used),
        disk_used_percent: used_percent(disk_used, disk.total_bytes),
        total_memory_gb: to_gb(memory.total_bytes),
        used_memory_gb: to_gb(memory_used),
        memory_used_percent: used_percent(memory_used, memory.total_bytes),
        cpu_loads: cpus
            .into_iter()
            .map(|load| round2(load.clamp(0.0, 100.0)))
            .collect(),
        hostname: host.hostname,
        uptime: format_uptime(host.uptime_seconds),
        os_name: host.os,
        temperatures: temps
            .into_iter()
            .map(|t| Temperature {
                label: t.label,
                celsius: t.celsius,
            })
            .collect(),
    })
}

/// Rounds to two decimals, halves away from zero.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn to_gb(bytes: u64) -> f64 {
    round2(bytes as f64 / BYTES_PER_GB)
}

/// `HH:MM:SS` with unbounded hours.
pub fn format_uptime(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}

fn used_percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(((used as f64 / total as f64) * 100.0).clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::stub::StubProvider;
    use crate::collectors::{DiskUsage, MemoryUsage, TemperatureReading};

    const GIB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn round2_rounds_half_away_from_zero() {
        // 1.005 scales to 100.4999...
        assert_eq!(round2(1.005), 1.0);
        assert_eq!(round2(0.125), 0.13);
        assert_eq!(round2(-0.125), -0.13);
        assert_eq!(round2(2.5), 2.5);
        assert_eq!(round2(76.899), 76.9);
        assert_eq!(round2(0.0), 0.0);
    }

    #[test]
    fn round2_is_idempotent() {
        for x in [
            0.0, 0.001, 0.005, 0.125, 1.0 / 3.0, 2.0 / 3.0, 12.345, 99.995, 100.0, 1234.5678,
            -7.777,
        ] {
            let once = round2(x);
            assert_eq!(round2(once), once, "round2 not idempotent for {x}");
        }
    }

    #[test]
    fn to_gb_is_monotonic() {
        let samples = [
            0,
            1,
            1024,
            GIB / 200,
            GIB / 100,
            GIB / 2,
            GIB,
            GIB + 1,
            3 * GIB / 2,
            16 * GIB,
            500 * GIB,
            u64::MAX / 2,
        ];
        for pair in samples.windows(2) {
            assert!(to_gb(pair[0]) <= to_gb(pair[1]), "{} vs {}", pair[0], pair[1]);
        }
        assert_eq!(to_gb(16 * GIB), 16.0);
        assert_eq!(to_gb(GIB / 2), 0.5);
    }

    #[test]
    fn format_uptime_examples() {
        assert_eq!(format_uptime(0), "00:00:00");
        assert_eq!(format_uptime(59), "00:00:59");
        assert_eq!(format_uptime(3661), "01:01:01");
        assert_eq!(format_uptime(86_399), "23:59:59");
        assert_eq!(format_uptime(360_000), "100:00:00");
    }

    #[test]
    fn builds_reference_snapshot_from_stub() {
        let provider = StubProvider::reference();
        let snapshot = build_snapshot(&provider, "/").expect("stub never fails");

        assert_eq!(
            snapshot,
            Snapshot {
                total_disk_gb: 500.0,
                used_disk_gb: 250.0,
                disk_used_percent: 50.0,
                total_memory_gb: 16.0,
                used_memory_gb: 8.0,
                memory_used_percent: 50.0,
                cpu_loads: vec![25.4, 76.9],
                hostname: "host1".to_string(),
                uptime: "01:01:01".to_string(),
                os_name: "linux".to_string(),
                temperatures: vec![],
            }
        );
    }

    #[test]
    fn snapshot_respects_percent_and_capacity_invariants() {
        let mut provider = StubProvider::reference();
        provider.memory = MemoryUsage {
            total_bytes: 3 * GIB,
            used_bytes: 7 * GIB,
        };
        provider.disk = DiskUsage {
            total_bytes: 0,
            used_bytes: 0,
        };
        provider.cpus = vec![-1.0, 33.333, 100.4];

        let snapshot = build_snapshot(&provider, "/").unwrap();
        assert!((0.0..=100.0).contains(&snapshot.memory_used_percent));
        assert!((0.0..=100.0).contains(&snapshot.disk_used_percent));
        assert!(snapshot.used_memory_gb <= snapshot.total_memory_gb + 0.01);
        assert!(snapshot.used_disk_gb <= snapshot.total_disk_gb + 0.01);
        assert_eq!(snapshot.memory_used_percent, 100.0);
        assert_eq!(snapshot.disk_used_percent, 0.0);
        assert_eq!(snapshot.cpu_loads, vec![0.0, 33.33, 100.0]);
    }

    #[test]
    fn temperatures_keep_provider_order() {
        let mut provider = StubProvider::reference();
        provider.temps = vec![
            TemperatureReading {
                label: "zeta".to_string(),
                celsius: 41.5,
            },
            TemperatureReading {
                label: "alpha".to_string(),
                celsius: 63.0,
            },
        ];
        let snapshot = build_snapshot(&provider, "/").unwrap();
        let labels: Vec<&str> = snapshot
            .temperatures
            .iter()
            .map(|t| t.label.as_str())
            .collect();
        assert_eq!(labels, ["zeta", "alpha"]);
    }

    #[test]
    fn cpu_failure_propagates() {
        let provider = StubProvider::reference().failing_cpu(1);
        let err = build_snapshot(&provider, "/").unwrap_err();
        assert_eq!(err.kind(), "cpu");
        assert!(build_snapshot(&provider, "/").is_ok());
    }
}
