use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Element counter printed to stderr every `interval` elements.
pub struct ProgressCounter {
    label: &'static str,
    interval: u64,
    count: AtomicU64,
    started: Instant,
}

impl ProgressCounter {
    pub fn new(label: &'static str, interval: u64) -> Self {
        let counter = Self {
            label,
            interval: interval.max(1),
            count: AtomicU64::new(0),
            started: Instant::now(),
        };
        counter.print(0);
        counter
    }

    pub fn inc(&self, delta: u64) {
        let prev = self.count.fetch_add(delta, Ordering::Relaxed);
        let current = prev + delta;
        if prev / self.interval < current / self.interval {
            self.print(current);
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Print the final count with the average rate.
    pub fn finish(&self) {
        let current = self.count();
        let secs = self.started.elapsed().as_secs_f64();
        let rate = if secs > 0.0 { current as f64 / secs } else { 0.0 };
        eprintln!("\r{}: {} ({:.0}/s)", self.label, current, rate);
    }

    fn print(&self, current: u64) {
        eprint!("\r{}: {}", self.label, current);
        let _ = std::io::stderr().flush();
    }
}
