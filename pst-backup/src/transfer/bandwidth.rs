//! Upload throughput sampling.
//!
//! The remote client adds every body byte it hands to the transport to a
//! [`SentCounter`]. A [`BandwidthMonitor`] samples that counter once per
//! second; each sample after the first yields the bytes sent during the
//! last interval.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::events::{BackupEvent, EventBus};
use crate::transfer::progress::format_speed;

/// Sampling period
pub const SAMPLE_PERIOD: Duration = Duration::from_secs(1);

/// Monotonically increasing count of bytes sent, shared between the remote
/// client (writer) and the monitor (reader).
#[derive(Debug, Clone, Default)]
pub struct SentCounter(Arc<AtomicU64>);

impl SentCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, bytes: u64) {
        self.0.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Turns cumulative samples into per-interval rates
#[derive(Debug, Default)]
pub struct BandwidthMonitor {
    previous: Option<u64>,
}

impl BandwidthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a cumulative sample. The first sample only sets the baseline.
    pub fn sample(&mut self, current: u64) -> Option<u64> {
        let rate = self.previous.map(|previous| current.saturating_sub(previous));
        self.previous = Some(current);
        rate
    }

    /// Sample `counter` every [`SAMPLE_PERIOD`] and publish `upload:speed`
    /// events until `cancel` fires.
    pub fn spawn(counter: SentCounter, events: EventBus, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut monitor = BandwidthMonitor::new();
            let mut interval = tokio::time::interval(SAMPLE_PERIOD);

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = cancel.cancelled() => break,
                }

                if let Some(bytes_per_second) = monitor.sample(counter.get()) {
                    debug!("Upload speed: {}", format_speed(bytes_per_second));
                    events.publish(BackupEvent::UploadSpeed {
                        bytes_per_second,
                        speed: format_speed(bytes_per_second),
                    });
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates_from_cumulative_samples() {
        let mut monitor = BandwidthMonitor::new();
        let rates: Vec<Option<u64>> = [0, 100, 250, 250]
            .into_iter()
            .map(|sample| monitor.sample(sample))
            .collect();
        assert_eq!(rates, vec![None, Some(100), Some(150), Some(0)]);
    }

    #[test]
    fn test_counter_is_shared() {
        let counter = SentCounter::new();
        let writer = counter.clone();
        writer.add(10);
        writer.add(5);
        assert_eq!(counter.get(), 15);
    }

    #[tokio::test]
    async fn test_spawned_monitor_stops_on_cancel() {
        let events = EventBus::new();
        let cancel = CancellationToken::new();
        let handle = BandwidthMonitor::spawn(SentCounter::new(), events, cancel.clone());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("monitor did not stop")
            .unwrap();
    }
}
