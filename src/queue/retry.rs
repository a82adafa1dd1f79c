//! 重试延迟计算
//!
//! 纯函数：尝试次数 → 延迟，与队列状态无关，可单独测试。

use std::time::Duration;

/// 指数退避：`base * 2^attempt`，上限 `cap`
pub fn retry_delay(base: Duration, attempt: u32, cap: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt.min(31));
    base.checked_mul(factor).map_or(cap, |d| d.min(cap))
}

/// 资源池耗尽时的加长延迟
///
/// 池被打满通常是暂时性饱和，用更长的基准延迟让它喘口气，
/// 仍然随尝试次数指数增长并封顶。
pub fn elevated_retry_delay(elevated_base: Duration, attempt: u32, cap: Duration) -> Duration {
    retry_delay(elevated_base, attempt, cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth() {
        let base = Duration::from_secs(2);
        let cap = Duration::from_secs(600);

        assert_eq!(retry_delay(base, 0, cap), Duration::from_secs(2));
        assert_eq!(retry_delay(base, 1, cap), Duration::from_secs(4));
        assert_eq!(retry_delay(base, 2, cap), Duration::from_secs(8));
        assert_eq!(retry_delay(base, 3, cap), Duration::from_secs(16));
    }

    #[test]
    fn test_cap_applies() {
        let base = Duration::from_secs(2);
        let cap = Duration::from_secs(60);

        assert_eq!(retry_delay(base, 5, cap), Duration::from_secs(60));
        // 巨大的尝试次数不会溢出
        assert_eq!(retry_delay(base, 4000, cap), Duration::from_secs(60));
    }

    #[test]
    fn test_elevated_base_is_longer() {
        let cap = Duration::from_secs(600);
        let normal = retry_delay(Duration::from_secs(2), 1, cap);
        let elevated = elevated_retry_delay(Duration::from_secs(30), 1, cap);
        assert!(elevated > normal);
    }
}
