//! Timing helpers for logging how long comparison and simulation phases take.

use log::{debug, info, warn};
use std::time::{Duration, Instant};

/// Measures one operation, optionally split into named segments.
#[derive(Debug)]
pub struct Timer {
    start_time: Instant,
    operation_name: String,
    checkpoints: Vec<(String, Instant)>,
}

impl Timer {
    pub fn start(operation_name: &str) -> Self {
        debug!("⏱️ Starting timer for: {}", operation_name);
        Self {
            start_time: Instant::now(),
            operation_name: operation_name.to_string(),
            checkpoints: Vec::new(),
        }
    }

    /// Marks the end of a named segment.
    pub fn checkpoint(&mut self, segment: &str) {
        let now = Instant::now();
        self.checkpoints.push((segment.to_string(), now));
        debug!(
            "📍 {} - {}: {}ms",
            self.operation_name,
            segment,
            now.duration_since(self.start_time).as_millis()
        );
    }

    pub fn segments(&self) -> Vec<(String, Duration)> {
        let mut last = self.start_time;
        self.checkpoints
            .iter()
            .map(|(name, at)| {
                let segment = at.duration_since(last);
                last = *at;
                (name.clone(), segment)
            })
            .collect()
    }

    pub fn finish(self) -> Duration {
        let total = self.start_time.elapsed();
        self.log_summary(total);
        total
    }

    /// Like `finish`, but warns when the operation exceeded `threshold_ms`.
    pub fn finish_with_threshold(self, threshold_ms: u64) -> Duration {
        let total = self.start_time.elapsed();
        self.log_summary(total);
        if total.as_millis() > threshold_ms as u128 {
            warn!(
                "⚠️ {} took {}ms (exceeds threshold of {}ms)",
                self.operation_name,
                total.as_millis(),
                threshold_ms
            );
        }
        total
    }

    fn log_summary(&self, total: Duration) {
        if self.checkpoints.is_empty() {
            info!("🕐 {} completed in {}ms", self.operation_name, total.as_millis());
            return;
        }
        info!(
            "🕐 {} completed in {}ms with checkpoints:",
            self.operation_name,
            total.as_millis()
        );
        for (name, segment) in self.segments() {
            info!("   └─ {}: {}ms", name, segment.as_millis());
        }
    }
}
