use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lock-free performance counters for the ingest pipeline.
#[derive(Debug)]
pub struct Stats {
    pub connections_accepted: AtomicU64,
    pub bytes_read: AtomicU64,
    pub frames_decoded: AtomicU64,
    pub decode_errors: AtomicU64,
    pub unknown_frame_types: AtomicU64,
    pub unknown_sensors: AtomicU64,
    pub publish_success: AtomicU64,
    pub publish_errors: AtomicU64,
}

impl Stats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connections_accepted: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            frames_decoded: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            unknown_frame_types: AtomicU64::new(0),
            unknown_sensors: AtomicU64::new(0),
            publish_success: AtomicU64::new(0),
            publish_errors: AtomicU64::new(0),
        })
    }

    #[inline(always)]
    pub fn record_connection(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_read(&self, bytes: usize) {
        self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_decoded(&self, unknown_frame_type: bool, unknown_sensor: bool) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
        if unknown_frame_type {
            self.unknown_frame_types.fetch_add(1, Ordering::Relaxed);
        }
        if unknown_sensor {
            self.unknown_sensors.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline(always)]
    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_publish_success(&self) {
        self.publish_success.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_publish_error(&self) {
        self.publish_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot and reset counters, return rates over the elapsed window.
    pub fn snapshot_and_reset(&self, elapsed: Duration) -> StatsSnapshot {
        let secs = elapsed.as_secs_f64().max(0.001);

        let connections = self.connections_accepted.swap(0, Ordering::Relaxed);
        let bytes = self.bytes_read.swap(0, Ordering::Relaxed);
        let decoded = self.frames_decoded.swap(0, Ordering::Relaxed);
        let decode_err = self.decode_errors.swap(0, Ordering::Relaxed);
        let unknown_types = self.unknown_frame_types.swap(0, Ordering::Relaxed);
        let unknown_sensors = self.unknown_sensors.swap(0, Ordering::Relaxed);
        let pub_ok = self.publish_success.swap(0, Ordering::Relaxed);
        let pub_err = self.publish_errors.swap(0, Ordering::Relaxed);

        StatsSnapshot {
            connections_per_sec: (connections as f64) / secs,
            bytes_per_sec: (bytes as f64) / secs,
            frames_per_sec: (decoded as f64) / secs,
            decode_errors: decode_err,
            unknown_frame_types: unknown_types,
            unknown_sensors,
            publish_success: pub_ok,
            publish_errors: pub_err,
        }
    }
}

#[derive(Debug)]
pub struct StatsSnapshot {
    pub connections_per_sec: f64,
    pub bytes_per_sec: f64,
    pub frames_per_sec: f64,
    pub decode_errors: u64,
    pub unknown_frame_types: u64,
    pub unknown_sensors: u64,
    pub publish_success: u64,
    pub publish_errors: u64,
}

/// Background stats reporter task.
pub async fn stats_reporter(stats: Arc<Stats>, interval_secs: u64) {
    if interval_secs == 0 {
        std::future::pending::<()>().await;
        return;
    }

    let interval = Duration::from_secs(interval_secs);
    let mut last = Instant::now();

    loop {
        tokio::time::sleep(interval).await;
        let now = Instant::now();
        let elapsed = now - last;
        last = now;

        let snap = stats.snapshot_and_reset(elapsed);
        tracing::info!(
            conn_per_sec = format!("{:.1}", snap.connections_per_sec),
            bytes_per_sec = format!("{:.0}", snap.bytes_per_sec),
            frames_per_sec = format!("{:.1}", snap.frames_per_sec),
            decode_errors = snap.decode_errors,
            unknown_frame_types = snap.unknown_frame_types,
            unknown_sensors = snap.unknown_sensors,
            publish_success = snap.publish_success,
            publish_errors = snap.publish_errors,
            "ingest stats"
        );
    }
}
