use std::time::Duration;

/// 连续 broker 故障的退避策略
///
/// 第 n 次连续失败后等待 `(2^n - 1) × unit`，失败次数超过 `max_retry_count` 时放弃。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retry_count: u32,
    pub unit: Duration,
}

impl RetryPolicy {
    pub fn new(max_retry_count: u32, unit: Duration) -> Self {
        Self {
            max_retry_count,
            unit,
        }
    }

    pub fn backoff(&self, failures: u32) -> Duration {
        let factor = 1u32
            .checked_shl(failures)
            .map(|v| v - 1)
            .unwrap_or(u32::MAX);
        self.unit.saturating_mul(factor)
    }

    pub fn is_exhausted(&self, failures: u32) -> bool {
        failures > self.max_retry_count
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}
