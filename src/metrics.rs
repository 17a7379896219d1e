use crate::snapshot::Snapshot;
use prometheus::core::Collector;
use prometheus::{
    opts, Counter, CounterVec, Encoder, Gauge, GaugeVec, IntGauge, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    started_at: Instant,
    pub dashboard_ticks_total: Counter,
    pub dashboard_tick_errors_total: CounterVec,
    pub dashboard_stream_clients: IntGauge,
    pub dashboard_sample_duration_seconds: Gauge,
    pub dashboard_last_tick_timestamp_seconds: Gauge,
    pub dashboard_cpu_core_load_percent: GaugeVec,
    pub dashboard_memory_used_percent: Gauge,
    pub dashboard_disk_used_percent: Gauge,
    pub dashboard_temperature_celsius: GaugeVec,
    pub dashboard_scrape_count_total: Counter,
    pub dashboard_uptime_seconds: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let dashboard_ticks_total = Counter::with_opts(opts!(
            "dashboard_ticks_total",
            "Snapshots successfully sampled and published"
        ))?;
        let dashboard_tick_errors_total = CounterVec::new(
            opts!(
                "dashboard_tick_errors_total",
                "Ticks dropped because sampling or rendering failed"
            ),
            &["kind"],
        )?;
        let dashboard_stream_clients = IntGauge::with_opts(opts!(
            "dashboard_stream_clients",
            "Currently connected /stats clients"
        ))?;
        let dashboard_sample_duration_seconds = Gauge::with_opts(opts!(
            "dashboard_sample_duration_seconds",
            "Wall time of the last snapshot build, including the CPU window"
        ))?;
        let dashboard_last_tick_timestamp_seconds = Gauge::with_opts(opts!(
            "dashboard_last_tick_timestamp_seconds",
            "Unix time of the last published snapshot"
        ))?;
        let dashboard_cpu_core_load_percent = GaugeVec::new(
            opts!(
                "dashboard_cpu_core_load_percent",
                "CPU load per logical core in percent"
            ),
            &["core"],
        )?;
        let dashboard_memory_used_percent = Gauge::with_opts(opts!(
            "dashboard_memory_used_percent",
            "Memory usage in percent"
        ))?;
        let dashboard_disk_used_percent = Gauge::with_opts(opts!(
            "dashboard_disk_used_percent",
            "Usage of the watched filesystem in percent"
        ))?;
        let dashboard_temperature_celsius = GaugeVec::new(
            opts!(
                "dashboard_temperature_celsius",
                "Temperature by sensor in Celsius"
            ),
            &["sensor"],
        )?;
        let dashboard_scrape_count_total = Counter::with_opts(opts!(
            "dashboard_scrape_count_total",
            "Number of /metrics scrapes"
        ))?;
        let dashboard_uptime_seconds = Gauge::with_opts(opts!(
            "dashboard_uptime_seconds",
            "Seconds since the dashboard started"
        ))?;

        register(&registry, &dashboard_ticks_total)?;
        register(&registry, &dashboard_tick_errors_total)?;
        register(&registry, &dashboard_stream_clients)?;
        register(&registry, &dashboard_sample_duration_seconds)?;
        register(&registry, &dashboard_last_tick_timestamp_seconds)?;
        register(&registry, &dashboard_cpu_core_load_percent)?;
        register(&registry, &dashboard_memory_used_percent)?;
        register(&registry, &dashboard_disk_used_percent)?;
        register(&registry, &dashboard_temperature_celsius)?;
        register(&registry, &dashboard_scrape_count_total)?;
        register(&registry, &dashboard_uptime_seconds)?;

        Ok(Arc::new(Self {
            registry,
            started_at: Instant::now(),
            dashboard_ticks_total,
            dashboard_tick_errors_total,
            dashboard_stream_clients,
            dashboard_sample_duration_seconds,
            dashboard_last_tick_timestamp_seconds,
            dashboard_cpu_core_load_percent,
            dashboard_memory_used_percent,
            dashboard_disk_used_percent,
            dashboard_temperature_celsius,
            dashboard_scrape_count_total,
            dashboard_uptime_seconds,
        }))
    }

    pub fn update_from_snapshot(&self, snapshot: &Snapshot, sample_secs: f64) {
        self.dashboard_ticks_total.inc();
        self.dashboard_sample_duration_seconds.set(sample_secs);
        self.dashboard_last_tick_timestamp_seconds
            .set(now_unix() as f64);
        self.dashboard_memory_used_percent
            .set(snapshot.memory_used_percent);
        self.dashboard_disk_used_percent
            .set(snapshot.disk_used_percent);

        self.dashboard_cpu_core_load_percent.reset();
        for (i, load) in snapshot.cpu_loads.iter().enumerate() {
            self.dashboard_cpu_core_load_percent
                .with_label_values(&[&i.to_string()])
                .set(*load);
        }

        self.dashboard_temperature_celsius.reset();
        for t in &snapshot.temperatures {
            self.dashboard_temperature_celsius
                .with_label_values(&[&t.label])
                .set(t.celsius);
        }
    }

    pub fn inc_tick_error(&self, kind: &str) {
        self.dashboard_tick_errors_total
            .with_label_values(&[kind])
            .inc();
    }

    pub fn client_connected(&self) -> i64 {
        self.dashboard_stream_clients.inc();
        self.dashboard_stream_clients.get()
    }

    pub fn client_disconnected(&self) -> i64 {
        self.dashboard_stream_clients.dec();
        self.dashboard_stream_clients.get()
    }

    pub fn inc_scrape_count(&self) {
        self.dashboard_scrape_count_total.inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        self.dashboard_uptime_seconds
            .set(self.started_at.elapsed().as_secs_f64());
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Temperature;

    #[test]
    fn snapshot_updates_are_exported() {
        let metrics = Metrics::new().expect("metrics init");
        let snapshot = Snapshot {
            total_disk_gb: 10.0,
            used_disk_gb: 2.5,
            disk_used_percent: 25.0,
            total_memory_gb: 8.0,
            used_memory_gb: 4.0,
            memory_used_percent: 50.0,
            cpu_loads: vec![12.5, 80.0],
            hostname: "box".to_string(),
            uptime: "00:00:10".to_string(),
            os_name: "linux".to_string(),
            temperatures: vec![Temperature {
                label: "cpu0".to_string(),
                celsius: 47.0,
            }],
        };
        metrics.update_from_snapshot(&snapshot, 1.01);
        metrics.inc_tick_error("cpu");

        let text = String::from_utf8(metrics.encode_metrics().unwrap()).unwrap();
        assert!(text.contains("dashboard_ticks_total 1"));
        assert!(text.contains(r#"dashboard_cpu_core_load_percent{core="1"} 80"#));
        assert!(text.contains(r#"dashboard_temperature_celsius{sensor="cpu0"} 47"#));
        assert!(text.contains(r#"dashboard_tick_errors_total{kind="cpu"} 1"#));
        assert!(text.contains("dashboard_memory_used_percent 50"));
        assert!(text.contains("dashboard_uptime_seconds"));
    }

    #[test]
    fn client_gauge_tracks_connections() {
        let metrics = Metrics::new().expect("metrics init");
        assert_eq!(metrics.client_connected(), 1);
        assert_eq!(metrics.client_connected(), 2);
        assert_eq!(metrics.client_disconnected(), 1);
    }
}
