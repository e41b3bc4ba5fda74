//! Wall clock abstraction.
//!
//! The client seeds outbound request ids from the clock, so tests swap in a
//! [`FixedClock`] to get deterministic frames.

use chrono::Utc;

pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;

    /// First request id for a new connection; never negative.
    fn request_id_seed(&self) -> u64 {
        u64::try_from(self.now_millis()).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock frozen at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock {
    millis: i64,
}

impl FixedClock {
    pub fn new(millis: i64) -> Self {
        Self { millis }
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.millis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_after_2020() {
        // テスト項目: SystemClock が現在時刻 (2020 年以降) を返す
        // given (前提条件):
        let clock = SystemClock;

        // when (操作):
        let now = clock.now_millis();

        // then (期待する結果):
        assert!(now > 1_577_836_800_000);
    }

    #[test]
    fn test_fixed_clock_seeds_request_ids() {
        // テスト項目: FixedClock は固定時刻をそのままリクエスト ID の初期値にする
        // given (前提条件):
        let clock = FixedClock::new(1_700_000_000_123);

        // when (操作):
        let seed = clock.request_id_seed();

        // then (期待する結果):
        assert_eq!(clock.now_millis(), 1_700_000_000_123);
        assert_eq!(seed, 1_700_000_000_123);
    }

    #[test]
    fn test_negative_time_seeds_zero() {
        // テスト項目: エポック以前の時刻ではリクエスト ID の初期値が 0 になる
        // given (前提条件):
        let clock = FixedClock::new(-5);

        // when (操作):
        let seed = clock.request_id_seed();

        // then (期待する結果):
        assert_eq!(seed, 0);
    }
}
