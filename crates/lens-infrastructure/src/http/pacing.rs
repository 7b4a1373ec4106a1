use crate::http::clock::Clock;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Minimum spacing between calls to the same upstream host.
///
/// Each host has its own slot mutex; concurrent callers for one host queue
/// on it while other hosts proceed independently.
pub struct HostPacer {
    min_interval: Duration,
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<String, Arc<Mutex<Option<i64>>>>>,
}

impl HostPacer {
    pub fn new(min_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            min_interval,
            clock,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Blocks until `host` may be called again and claims the slot.
    /// Returns how long the caller waited.
    pub fn acquire(&self, host: &str) -> Duration {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(host.to_string()).or_default())
        };

        let mut last_call = slot.lock();
        let interval_ms = self.min_interval.as_millis() as i64;
        let mut waited = Duration::ZERO;
        if let Some(last) = *last_call {
            let elapsed = self.clock.now_ms() - last;
            if elapsed < interval_ms {
                waited = Duration::from_millis((interval_ms - elapsed) as u64);
                self.clock.sleep(waited);
            }
        }
        *last_call = Some(self.clock.now_ms());
        drop(last_call);

        if !waited.is_zero() {
            metrics::histogram!("lens.fetch.pacing_wait_ms").record(waited.as_secs_f64() * 1000.0);
        }
        waited
    }
}
