//! 限速器 - 核心层
//!
//! 按作用域（全局 + 目标域名）的令牌桶。配置单位是每分钟请求数：
//! 桶容量 R，持续回填速率 R/60 每秒。
//!
//! 等待者在 `tokio::sync::Mutex` 上排队（tokio 的互斥锁按到达顺序
//! 唤醒），补足令牌的睡眠发生在持锁期间，因此出队顺序严格 FIFO，
//! 持续争抢下也不会有等待者被饿死。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::trace;

struct BucketState {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl BucketState {
    fn new(rpm: u32) -> Self {
        let capacity = rpm as f64;
        Self {
            tokens: capacity,
            capacity,
            refill_per_sec: capacity / 60.0,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }
}

/// 令牌桶限速器
pub struct RateLimiter {
    global: Option<Mutex<BucketState>>,
    per_domain_rpm: Option<u32>,
    domains: Mutex<HashMap<String, Arc<Mutex<BucketState>>>>,
}

impl RateLimiter {
    /// `global_rpm` / `per_domain_rpm` 传 `None` 即关闭对应作用域
    pub fn new(global_rpm: Option<u32>, per_domain_rpm: Option<u32>) -> Self {
        Self {
            global: global_rpm.map(|rpm| Mutex::new(BucketState::new(rpm))),
            per_domain_rpm,
            domains: Mutex::new(HashMap::new()),
        }
    }

    /// 等到两个作用域（全局、目标域名）各有一枚令牌后返回
    pub async fn wait_if_needed(&self, domain: &str) {
        if let Some(bucket) = &self.global {
            Self::take(bucket).await;
        }

        if let Some(rpm) = self.per_domain_rpm {
            let bucket = {
                let mut domains = self.domains.lock().await;
                domains
                    .entry(domain.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(BucketState::new(rpm))))
                    .clone()
            };
            Self::take(&bucket).await;
        }
    }

    async fn take(bucket: &Mutex<BucketState>) {
        let mut state = bucket.lock().await;
        let now = Instant::now();
        state.refill(now);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return;
        }

        // 持锁睡到令牌补足，后续等待者按到达顺序排在锁上
        let deficit = 1.0 - state.tokens;
        let wait = Duration::from_secs_f64(deficit / state.refill_per_sec);
        trace!("限速等待 {:?}", wait);
        tokio::time::sleep(wait).await;

        state.refill(Instant::now());
        state.tokens = (state.tokens - 1.0).max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use tokio::sync::Mutex as AsyncMutex;

    #[tokio::test]
    async fn test_burst_within_capacity_is_instant() {
        let limiter = RateLimiter::new(Some(600), None);

        let start = Instant::now();
        for _ in 0..100 {
            limiter.wait_if_needed("www.pinterest.com").await;
        }
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_exceeding_rate_takes_proportional_time() {
        // R = 600/min = 10/s；发 K = 605 个请求至少要 (K-R)/R*60 = 0.5s
        let limiter = RateLimiter::new(Some(600), None);

        let start = Instant::now();
        for _ in 0..605 {
            limiter.wait_if_needed("www.pinterest.com").await;
        }
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(450),
            "耗时 {:?}，低于理论下限",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_waiters_served_in_fifo_order() {
        let limiter = StdArc::new(RateLimiter::new(Some(300), None));

        // 先放空桶
        for _ in 0..300 {
            limiter.wait_if_needed("www.pinterest.com").await;
        }

        let order = StdArc::new(AsyncMutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..3 {
            let limiter = limiter.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                limiter.wait_if_needed("www.pinterest.com").await;
                order.lock().await.push(i);
            }));
            // 用到达间隔固定排队顺序
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().await, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_domains_do_not_contend() {
        // 仅按域名限速：放空 a.com 的桶后，b.com 仍不受影响
        let limiter = RateLimiter::new(None, Some(120));

        for _ in 0..120 {
            limiter.wait_if_needed("a.com").await;
        }

        let start = Instant::now();
        limiter.wait_if_needed("b.com").await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
