//! 泛型资源池 - 核心层
//!
//! 代理和账号各实例化一个池。三条操作（`get_next` / `mark_used` /
//! `mark_failed`）在同一把锁内互斥；选中即独占，归还前不会再被选中。
//!
//! 健康模型：连续失败数达到阈值后转 UNHEALTHY 并进入冷却，冷却时长
//! 从首次失败起按指数增长（封顶）；冷却结束重新参与轮换，一次成功
//! 把连续失败数清零。带外探活通过 [`ResourcePool::probe_update`] 写入，
//! 池操作从不等待探活。

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{Mutex, Notify};
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::PoolError;
use crate::models::resource::PoolItem;
use crate::pool::strategy::RotationStrategy;

/// 池配置
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub strategy: RotationStrategy,
    /// 连续失败达到该值转 UNHEALTHY 并冷却
    pub failure_threshold: u32,
    /// 首个冷却窗口时长
    pub cooldown_base: Duration,
    /// 冷却时长上限
    pub cooldown_cap: Duration,
    /// 池耗尽时是否阻塞等待（否则立刻报 `Exhausted`）
    pub block_on_exhausted: bool,
    /// 阻塞等待的最长时间
    pub checkout_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            strategy: RotationStrategy::RoundRobin,
            failure_threshold: 3,
            cooldown_base: Duration::from_secs(60),
            cooldown_cap: Duration::from_secs(1800),
            block_on_exhausted: false,
            checkout_timeout: Duration::from_secs(10),
        }
    }
}

/// 健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Unhealthy,
}

/// 一次独占借出
#[derive(Debug, Clone)]
pub struct Checkout<T> {
    pub id: String,
    pub item: T,
}

/// 池计数快照
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub total: usize,
    pub available: usize,
    pub cooling: usize,
    pub unhealthy: usize,
    pub checked_out: usize,
}

struct Entry<T> {
    item: T,
    health: Health,
    usage_count: u64,
    last_used: Option<Instant>,
    cooldown_until: Option<Instant>,
    consecutive_failures: u32,
    first_failure_at: Option<Instant>,
    checked_out: bool,
}

impl<T> Entry<T> {
    fn cooled_down(&self, now: Instant) -> bool {
        self.cooldown_until.map_or(true, |until| until <= now)
    }
}

struct PoolInner<T> {
    entries: Vec<Entry<T>>,
    index: HashMap<String, usize>,
    cursor: usize,
    rng: StdRng,
}

/// 泛型资源池
pub struct ResourcePool<T: PoolItem> {
    name: &'static str,
    cfg: PoolConfig,
    inner: Mutex<PoolInner<T>>,
    notify: Notify,
}

impl<T: PoolItem> ResourcePool<T> {
    pub fn new(name: &'static str, items: Vec<T>, cfg: PoolConfig) -> Self {
        let mut index = HashMap::with_capacity(items.len());
        let entries: Vec<Entry<T>> = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                index.insert(item.id().to_string(), i);
                Entry {
                    item,
                    health: Health::Healthy,
                    usage_count: 0,
                    last_used: None,
                    cooldown_until: None,
                    consecutive_failures: 0,
                    first_failure_at: None,
                    checked_out: false,
                }
            })
            .collect();

        info!("资源池 {} 初始化: {} 项, 策略 {:?}", name, entries.len(), cfg.strategy);
        Self {
            name,
            cfg,
            inner: Mutex::new(PoolInner {
                entries,
                index,
                cursor: 0,
                rng: StdRng::from_entropy(),
            }),
            notify: Notify::new(),
        }
    }

    /// 立即选取一个合格资源并独占借出
    ///
    /// 合格 = 健康（或冷却已结束）∧ 未被占用。无合格项时报
    /// `Exhausted`，错误信息携带各状态计数。
    pub async fn get_next(&self) -> Result<Checkout<T>, PoolError> {
        let mut inner = self.inner.lock().await;
        match Self::try_select(self.name, &self.cfg, &mut inner, Instant::now()) {
            Ok(checkout) => Ok(checkout),
            Err((err, _)) => Err(err),
        }
    }

    /// 借出资源；按配置在池耗尽时阻塞等待归还或冷却结束
    pub async fn checkout(&self) -> Result<Checkout<T>, PoolError> {
        if !self.cfg.block_on_exhausted {
            return self.get_next().await;
        }

        let deadline = Instant::now() + self.cfg.checkout_timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (err, hint) = {
                let mut inner = self.inner.lock().await;
                match Self::try_select(self.name, &self.cfg, &mut inner, Instant::now()) {
                    Ok(checkout) => return Ok(checkout),
                    Err(pair) => pair,
                }
            };

            let now = Instant::now();
            if now >= deadline {
                return Err(err);
            }
            let mut wait = deadline - now;
            if let Some(at) = hint {
                wait = wait.min(at.saturating_duration_since(now));
            }
            let _ = tokio::time::timeout(wait, notified).await;
        }
    }

    fn try_select(
        name: &'static str,
        cfg: &PoolConfig,
        inner: &mut PoolInner<T>,
        now: Instant,
    ) -> Result<Checkout<T>, (PoolError, Option<Instant>)> {
        // 冷却结束的项自动回到 HEALTHY（连续失败数保留，
        // 再次失败会立即触发更长的冷却）
        for entry in inner.entries.iter_mut() {
            if entry.health == Health::Unhealthy && entry.cooled_down(now) {
                info!("资源 {} 冷却结束，重新参与轮换", entry.item.id());
                entry.health = Health::Healthy;
            }
        }

        let eligible: Vec<usize> = inner
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.health == Health::Healthy && e.cooled_down(now) && !e.checked_out)
            .map(|(i, _)| i)
            .collect();

        if eligible.is_empty() {
            let next_cooldown = inner
                .entries
                .iter()
                .filter(|e| !e.checked_out)
                .filter_map(|e| e.cooldown_until)
                .filter(|&at| at > now)
                .min();
            return Err((Self::exhausted_error(name, &inner.entries, now), next_cooldown));
        }

        let chosen = match cfg.strategy {
            RotationStrategy::RoundRobin => {
                let n = inner.entries.len();
                let start = inner.cursor;
                let mut pick = eligible[0];
                for offset in 0..n {
                    let idx = (start + offset) % n;
                    if eligible.contains(&idx) {
                        pick = idx;
                        break;
                    }
                }
                inner.cursor = (pick + 1) % n;
                pick
            }
            RotationStrategy::Random => eligible[inner.rng.gen_range(0..eligible.len())],
            RotationStrategy::Weighted => {
                let weights: Vec<f64> = eligible
                    .iter()
                    .map(|&i| 1.0 / (1.0 + inner.entries[i].consecutive_failures as f64))
                    .collect();
                let total: f64 = weights.iter().sum();
                let mut draw = inner.rng.gen_range(0.0..total);
                let mut pick = eligible[eligible.len() - 1];
                for (k, &i) in eligible.iter().enumerate() {
                    if draw < weights[k] {
                        pick = i;
                        break;
                    }
                    draw -= weights[k];
                }
                pick
            }
            RotationStrategy::LeastUsed => {
                // 使用次数最少；并列时 last_used 最旧者优先，
                // 从未使用（None）排在所有 Some 之前
                *eligible
                    .iter()
                    .min_by_key(|&&i| {
                        let e = &inner.entries[i];
                        (e.usage_count, e.last_used, i)
                    })
                    .unwrap_or(&eligible[0])
            }
        };

        let entry = &mut inner.entries[chosen];
        entry.checked_out = true;
        debug!("借出资源 {} ({})", entry.item.id(), name);
        Ok(Checkout {
            id: entry.item.id().to_string(),
            item: entry.item.clone(),
        })
    }

    /// 成功归还：计数使用、刷新 last_used、清零失败连击
    pub async fn mark_used(&self, id: &str) -> Result<(), PoolError> {
        let mut inner = self.inner.lock().await;
        let idx = *inner.index.get(id).ok_or_else(|| PoolError::UnknownItem {
            pool: self.name,
            id: id.to_string(),
        })?;

        let entry = &mut inner.entries[idx];
        entry.checked_out = false;
        entry.usage_count += 1;
        entry.last_used = Some(Instant::now());
        entry.consecutive_failures = 0;
        entry.first_failure_at = None;
        entry.health = Health::Healthy;
        drop(inner);

        self.notify.notify_waiters();
        Ok(())
    }

    /// 失败归还：累计连续失败，达到阈值转 UNHEALTHY 并冷却
    ///
    /// 冷却时长 = `cooldown_base * 2^(连续失败数 - 阈值)`，封顶。
    pub async fn mark_failed(&self, id: &str, reason: &str) -> Result<(), PoolError> {
        let mut inner = self.inner.lock().await;
        let idx = *inner.index.get(id).ok_or_else(|| PoolError::UnknownItem {
            pool: self.name,
            id: id.to_string(),
        })?;

        let now = Instant::now();
        let entry = &mut inner.entries[idx];
        entry.checked_out = false;
        // 失败也算一次占用：刷新 last_used，LeastUsed 的并列裁决
        // 才不会立刻把刚失败的项再发出去
        entry.last_used = Some(now);
        entry.consecutive_failures += 1;
        entry.first_failure_at.get_or_insert(now);

        if entry.consecutive_failures >= self.cfg.failure_threshold {
            let exponent = entry.consecutive_failures - self.cfg.failure_threshold;
            let cooldown = self
                .cfg
                .cooldown_base
                .checked_mul(2u32.saturating_pow(exponent.min(31)))
                .map_or(self.cfg.cooldown_cap, |d| d.min(self.cfg.cooldown_cap));
            entry.health = Health::Unhealthy;
            entry.cooldown_until = Some(now + cooldown);
            warn!(
                "⚠️ 资源 {} 连续失败 {} 次 ({}), 冷却 {:?}",
                id, entry.consecutive_failures, reason, cooldown
            );
        } else {
            debug!(
                "资源 {} 失败 ({}), 连续 {}/{}",
                id, reason, entry.consecutive_failures, self.cfg.failure_threshold
            );
        }
        drop(inner);

        self.notify.notify_waiters();
        Ok(())
    }

    /// 带外探活结果写入（探活调度在进程之外，池操作从不等它）
    pub async fn probe_update(&self, id: &str, healthy: bool) -> Result<(), PoolError> {
        let mut inner = self.inner.lock().await;
        let idx = *inner.index.get(id).ok_or_else(|| PoolError::UnknownItem {
            pool: self.name,
            id: id.to_string(),
        })?;

        let entry = &mut inner.entries[idx];
        if healthy {
            entry.health = Health::Healthy;
            entry.consecutive_failures = 0;
            entry.first_failure_at = None;
            entry.cooldown_until = None;
        } else {
            entry.health = Health::Unhealthy;
            entry.cooldown_until = Some(Instant::now() + self.cfg.cooldown_base);
        }
        drop(inner);

        self.notify.notify_waiters();
        Ok(())
    }

    /// 按 ID 读取载荷副本（不改变任何池状态）
    pub async fn get_item(&self, id: &str) -> Option<T> {
        let inner = self.inner.lock().await;
        inner.index.get(id).map(|&i| inner.entries[i].item.clone())
    }

    /// 池计数
    pub async fn stats(&self) -> PoolStats {
        let inner = self.inner.lock().await;
        let now = Instant::now();
        let mut stats = PoolStats {
            total: inner.entries.len(),
            ..Default::default()
        };
        for e in &inner.entries {
            if e.checked_out {
                stats.checked_out += 1;
            } else if e.health == Health::Unhealthy && !e.cooled_down(now) {
                stats.unhealthy += 1;
            } else if !e.cooled_down(now) {
                stats.cooling += 1;
            } else {
                stats.available += 1;
            }
        }
        stats
    }

    fn exhausted_error(name: &'static str, entries: &[Entry<T>], now: Instant) -> PoolError {
        let total = entries.len();
        let mut available = 0;
        let mut cooling = 0;
        let mut checked_out = 0;
        for e in entries {
            if e.checked_out {
                checked_out += 1;
            } else if !e.cooled_down(now) || e.health == Health::Unhealthy {
                cooling += 1;
            } else {
                available += 1;
            }
        }
        PoolError::Exhausted {
            pool: name,
            total,
            available,
            cooling,
            checked_out,
        }
    }
}
