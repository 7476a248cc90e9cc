// src/clock.rs

use chrono::Utc;

/// 时间源，单位毫秒（Unix epoch）。测试中注入可控的实现。
pub trait Clock: Send + Sync {
    fn current_time_in_millis(&self) -> i64;
}

/// 系统时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn current_time_in_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let first = clock.current_time_in_millis();
        let second = clock.current_time_in_millis();
        assert!(first > 0);
        assert!(second >= first);
    }
}
