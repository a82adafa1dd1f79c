//! 资源轮换策略
//!
//! 策略在建池时一次性选定（枚举分派，调用点不散落分支判断）。

use serde::{Deserialize, Serialize};

/// 轮换策略
///
/// 账号池默认 `LeastUsed`（并列时取 `last_used` 最旧者，从未使用的
/// 排最前），代理池默认 `RoundRobin`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationStrategy {
    /// 循环游标，逐个轮替
    RoundRobin,
    /// 在合格项中均匀随机
    Random,
    /// 按健康评分加权随机（评分 = 1 / (1 + 连续失败数)）
    Weighted,
    /// 使用次数最少者优先
    LeastUsed,
}

impl RotationStrategy {
    /// 从配置字符串解析，无法识别时回退到 `RoundRobin`
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "round_robin" | "roundrobin" => RotationStrategy::RoundRobin,
            "random" => RotationStrategy::Random,
            "weighted" => RotationStrategy::Weighted,
            "least_used" | "leastused" => RotationStrategy::LeastUsed,
            _ => RotationStrategy::RoundRobin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_and_fallback() {
        assert_eq!(RotationStrategy::parse("least_used"), RotationStrategy::LeastUsed);
        assert_eq!(RotationStrategy::parse("WEIGHTED"), RotationStrategy::Weighted);
        assert_eq!(RotationStrategy::parse("random"), RotationStrategy::Random);
        assert_eq!(RotationStrategy::parse("别的"), RotationStrategy::RoundRobin);
    }
}
