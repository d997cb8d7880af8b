//! Transfer progress and throughput measurement

use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Point-in-time progress of a single transfer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    pub loaded: u64,
    pub total: u64,
    /// 0-100
    pub percentage: u8,
    /// Bytes per second over the speed window
    pub speed: f64,
    /// Seconds left at the current speed; infinite while speed is zero
    pub remaining: f64,
}

impl TransferProgress {
    pub fn new(loaded: u64, total: u64, speed: f64) -> Self {
        let loaded = loaded.min(total);
        let percentage = if total == 0 {
            0
        } else {
            ((loaded as u128 * 100) / total as u128) as u8
        };
        let remaining = if speed <= 0.0 {
            f64::INFINITY
        } else {
            (total - loaded) as f64 / speed
        };

        Self {
            loaded,
            total,
            percentage,
            speed,
            remaining,
        }
    }

    pub fn empty(total: u64) -> Self {
        Self::new(0, total, 0.0)
    }

    pub fn finished(total: u64) -> Self {
        Self {
            loaded: total,
            total,
            percentage: 100,
            speed: 0.0,
            remaining: 0.0,
        }
    }
}

/// Sliding-window throughput meter.
///
/// Samples are `(instant, loaded bytes)` pairs. Speed is the byte delta between the oldest
/// and newest sample inside the window divided by the time between them.
#[derive(Debug, Clone)]
pub struct SpeedMeter {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
}

impl SpeedMeter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    /// Record the running byte count at `at` and return the current speed
    pub fn record(&mut self, at: Instant, loaded: u64) -> f64 {
        // Restarted attempts report a smaller count; old samples no longer apply
        if matches!(self.samples.back(), Some(&(_, last)) if loaded < last) {
            self.samples.clear();
        }
        self.samples.push_back((at, loaded));

        while let Some(&(oldest, _)) = self.samples.front() {
            if at.duration_since(oldest) > self.window && self.samples.len() > 1 {
                self.samples.pop_front();
            } else {
                break;
            }
        }

        self.speed()
    }

    pub fn speed(&self) -> f64 {
        let (Some(&(first_at, first)), Some(&(last_at, last))) =
            (self.samples.front(), self.samples.back())
        else {
            return 0.0;
        };

        let elapsed = last_at.duration_since(first_at).as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        last.saturating_sub(first) as f64 / elapsed
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_is_infinite_without_speed() {
        let progress = TransferProgress::new(25, 100, 0.0);
        assert_eq!(progress.percentage, 25);
        assert!(progress.remaining.is_infinite());

        let progress = TransferProgress::new(50, 100, 10.0);
        assert_eq!(progress.percentage, 50);
        assert_eq!(progress.remaining, 5.0);
    }

    #[test]
    fn loaded_is_clamped_to_total() {
        let progress = TransferProgress::new(150, 100, 1.0);
        assert_eq!(progress.loaded, 100);
        assert_eq!(progress.percentage, 100);
        assert_eq!(TransferProgress::empty(0).percentage, 0);
    }

    #[test]
    fn speed_uses_samples_inside_window() {
        let start = Instant::now();
        let mut meter = SpeedMeter::new(Duration::from_secs(3));

        assert_eq!(meter.record(start, 0), 0.0);
        assert_eq!(meter.record(start + Duration::from_secs(1), 1000), 1000.0);
        assert_eq!(meter.record(start + Duration::from_secs(2), 3000), 1500.0);

        // Samples older than the window fall out
        let speed = meter.record(start + Duration::from_secs(5), 6000);
        assert_eq!(speed, 1000.0);
    }

    #[test]
    fn smaller_count_restarts_measurement() {
        let start = Instant::now();
        let mut meter = SpeedMeter::new(Duration::from_secs(3));
        meter.record(start, 0);
        meter.record(start + Duration::from_secs(1), 500);

        assert_eq!(meter.record(start + Duration::from_secs(2), 100), 0.0);
        meter.reset();
        assert_eq!(meter.speed(), 0.0);
    }
}
