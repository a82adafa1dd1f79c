//! 人类行为模拟 - 业务能力层
//!
//! WARMUP 阶段的随机停顿节奏：真实导航前做几轮"翻页-停顿"，
//! 降低会话被判定为自动化的风险。只负责节奏，不持有页面。

use rand::Rng;
use tokio::time::Duration;

/// 行为模拟器
pub struct HumanBehavior {
    /// 单次停顿下限
    dwell_min: Duration,
    /// 单次停顿上限
    dwell_max: Duration,
}

/// 一轮预热的动作脚本
#[derive(Debug, Clone)]
pub struct WarmupPlan {
    /// 每步滚动的像素量（交给后端执行时使用）
    pub scroll_steps: Vec<i64>,
    /// 每步之后的停顿
    pub dwells: Vec<Duration>,
}

impl WarmupPlan {
    pub fn total_dwell(&self) -> Duration {
        self.dwells.iter().sum()
    }
}

impl HumanBehavior {
    pub fn new(dwell_min: Duration, dwell_max: Duration) -> Self {
        Self {
            dwell_min: dwell_min.min(dwell_max),
            dwell_max: dwell_max.max(dwell_min),
        }
    }

    /// 生成一轮预热脚本：5-10 步滚动，每步 200-500 像素加随机停顿
    pub fn plan_warmup(&self) -> WarmupPlan {
        let mut rng = rand::thread_rng();
        let steps = rng.gen_range(5..=10);
        let mut scroll_steps = Vec::with_capacity(steps);
        let mut dwells = Vec::with_capacity(steps);

        for _ in 0..steps {
            scroll_steps.push(rng.gen_range(200..=500));
            let min = self.dwell_min.as_millis() as u64;
            let max = self.dwell_max.as_millis() as u64;
            dwells.push(Duration::from_millis(rng.gen_range(min..=max.max(min + 1))));
        }

        WarmupPlan {
            scroll_steps,
            dwells,
        }
    }

    /// 按内容长度估算的阅读停顿（约 250 词/分钟，封顶）
    pub fn reading_delay(content_length: usize, cap: Duration) -> Duration {
        let words = content_length as f64 / 5.0;
        let secs = words / 250.0 * 60.0;
        Duration::from_secs_f64(secs).min(cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_shape() {
        let behavior = HumanBehavior::new(Duration::from_millis(10), Duration::from_millis(30));
        let plan = behavior.plan_warmup();

        assert!((5..=10).contains(&plan.scroll_steps.len()));
        assert_eq!(plan.scroll_steps.len(), plan.dwells.len());
        for step in &plan.scroll_steps {
            assert!((200..=500).contains(step));
        }
        for dwell in &plan.dwells {
            assert!(*dwell <= Duration::from_millis(31));
        }
    }

    #[test]
    fn test_reading_delay_caps() {
        let cap = Duration::from_secs(60);
        // 很长的内容也不会超过上限
        assert_eq!(HumanBehavior::reading_delay(10_000_000, cap), cap);
        // 短内容按比例
        let short = HumanBehavior::reading_delay(1250, cap);
        assert!(short < Duration::from_secs(61));
        assert!(short > Duration::ZERO);
    }

    #[test]
    fn test_total_dwell_sums_steps() {
        let behavior = HumanBehavior::new(Duration::from_millis(5), Duration::from_millis(10));
        let plan = behavior.plan_warmup();
        let expected: Duration = plan.dwells.iter().sum();
        assert_eq!(plan.total_dwell(), expected);
        assert!(plan.total_dwell() > Duration::ZERO);
    }
}
