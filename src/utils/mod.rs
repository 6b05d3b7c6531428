use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::info;

/// A simple wall-clock timer for logging elapsed time.
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        info!("⏱  Starting: {}", label);
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!(
            "⏱  Finished: {} (took {:.2?})",
            self.label,
            self.start.elapsed()
        );
    }
}

/// Uniform random duration in `0..=max_ms` milliseconds.
pub fn jitter(max_ms: u64) -> Duration {
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::random_range(0..=max_ms))
}

/// Sleep for `base_ms` plus up to `jitter_ms` of random extra time.
pub async fn polite_delay(base_ms: u64, jitter_ms: u64) {
    let total = Duration::from_millis(base_ms) + jitter(jitter_ms);
    if !total.is_zero() {
        sleep(total).await;
    }
}

/// Runs `fut` after a fixed delay plus random jitter.
pub async fn delayed<F: Future>(delay: Duration, jitter_ms: u64, fut: F) -> F::Output {
    let total = delay + jitter(jitter_ms);
    if !total.is_zero() {
        sleep(total).await;
    }
    fut.await
}

/// Format a large integer with thousands separators.
pub fn fmt_number(n: i64) -> String {
    let s = n.abs().to_string();
    let mut result = String::new();
    for (i, ch) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }
    if n < 0 {
        result.push('-');
    }
    result.chars().rev().collect()
}
