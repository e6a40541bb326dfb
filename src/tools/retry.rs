//! 工具调用重试策略：总尝试次数与指数退避

use std::time::Duration;

/// 退避上限
const MAX_DELAY_MS: u64 = 30_000;

/// 重试策略：`max_attempts` 为总尝试次数（含首次），第 n 次失败后等待 `base * 2^n`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 1000)
    }
}

impl RetryPolicy {
    /// max_attempts 至少为 1
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
        }
    }

    /// 第 `attempt_idx` 次（从 0 开始）失败后的等待时间
    pub fn delay_for(&self, attempt_idx: u32) -> Duration {
        let factor = 2u64.checked_pow(attempt_idx).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(MAX_DELAY_MS))
    }
}
