//! Time source for the polling driver

use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;

/// Wall clock plus sleeping, injectable so the driver can run under test
/// without real delays
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current time in epoch milliseconds
    fn now_ms(&self) -> i64;

    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_system_clock_advances() {
        let clock = SystemClock;
        let before = clock.now_ms();
        clock.sleep(Duration::from_millis(5)).await;
        assert!(clock.now_ms() >= before);
        assert!(before > 1_600_000_000_000);
    }
}
