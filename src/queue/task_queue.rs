//! 任务队列 - 核心层
//!
//! 优先级 + 租约语义的任务分发：
//!
//! - 出队返回最高优先级、同级内入队最早、且 `visible_at <= now` 的任务
//! - 出队即租约：任务被标记 LEASED，`visible_at` 推进一个租约窗口
//! - 租约到期未被确认的任务自动重新可见（worker 崩溃不丢任务），
//!   这是系统里唯一的重复投递来源，消费侧按任务结果幂等处理
//! - 失败确认走重试策略：指数退避，超过上限转 FAILED_PERMANENT
//!
//! 所有状态变更在同一把锁内完成，两个并发出队不可能在一个租约
//! 窗口内拿到同一个任务。等待者挂在 `Notify` 上，不忙轮询。

use std::collections::{BTreeMap, HashMap};

use tokio::sync::{Mutex, Notify};
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{CrawlError, FailureClass, QueueError};
use crate::models::task::{NewTask, Task, TaskId, TaskOutcome, TaskRecord, TaskStatus};
use crate::queue::retry::{elevated_retry_delay, retry_delay};

/// 队列配置
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// 租约时长：出队后这么久未确认即重新可见
    pub lease_duration: Duration,
    /// 最大重试次数，超过后转 FAILED_PERMANENT
    pub max_retries: u32,
    /// 常规重试的基准延迟
    pub base_retry_delay: Duration,
    /// 资源池耗尽时的基准延迟（显著长于常规）
    pub exhausted_retry_delay: Duration,
    /// 重试延迟上限
    pub retry_delay_cap: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lease_duration: Duration::from_secs(120),
            max_retries: 3,
            base_retry_delay: Duration::from_secs(5),
            exhausted_retry_delay: Duration::from_secs(60),
            retry_delay_cap: Duration::from_secs(900),
        }
    }
}

/// 队列计数快照
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub leased: usize,
    pub retry_scheduled: usize,
    pub completed: usize,
    pub failed_permanent: usize,
}

struct Inner {
    tasks: HashMap<TaskId, Task>,
    /// (优先级序号, 入队序号) -> 任务 ID；遍历顺序即投递顺序
    order: BTreeMap<(u8, u64), TaskId>,
    next_seq: u64,
}

enum TakeResult {
    Taken(Box<Task>),
    /// 暂无可投递任务；携带最近一个未来可见时刻
    NotReady(Option<Instant>),
}

impl Inner {
    /// 在锁内挑选并租出一个任务
    fn take_eligible(&mut self, now: Instant, lease: Duration) -> TakeResult {
        let mut next_visible: Option<Instant> = None;
        let mut stale_keys = Vec::new();
        let mut taken: Option<(u8, u64)> = None;

        for (&key, id) in self.order.iter() {
            let task = match self.tasks.get_mut(id) {
                Some(t) => t,
                None => {
                    stale_keys.push(key);
                    continue;
                }
            };

            if task.status.is_terminal() {
                stale_keys.push(key);
                continue;
            }

            if task.visible_at > now {
                next_visible = Some(match next_visible {
                    Some(at) => at.min(task.visible_at),
                    None => task.visible_at,
                });
                continue;
            }

            if task.status == TaskStatus::Leased {
                // 租约过期，重新投递（唯一的重复投递来源）
                warn!("⚠️ 任务 {} 租约过期，重新投递", task.id);
            }
            debug_assert!(task.status.can_transition_to(TaskStatus::Leased));
            task.status = TaskStatus::Leased;
            task.visible_at = now + lease;
            taken = Some(key);
            break;
        }

        for key in stale_keys {
            self.order.remove(&key);
        }

        match taken {
            Some(key) => {
                let id = self.order[&key].clone();
                TakeResult::Taken(Box::new(self.tasks[&id].clone()))
            }
            None => TakeResult::NotReady(next_visible),
        }
    }

    fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::default();
        for task in self.tasks.values() {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Leased => stats.leased += 1,
                TaskStatus::RetryScheduled => stats.retry_scheduled += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::FailedPermanent => stats.failed_permanent += 1,
            }
        }
        stats
    }
}

/// 任务队列
pub struct TaskQueue {
    cfg: QueueConfig,
    inner: Mutex<Inner>,
    notify: Notify,
}

impl TaskQueue {
    pub fn new(cfg: QueueConfig) -> Self {
        Self {
            cfg,
            inner: Mutex::new(Inner {
                tasks: HashMap::new(),
                order: BTreeMap::new(),
                next_seq: 0,
            }),
            notify: Notify::new(),
        }
    }

    /// 入队新任务
    ///
    /// 已存在同 ID 的活跃（非终态）任务时返回 `DuplicateTask`；
    /// 已终态的同 ID 任务会被归档覆盖。
    pub async fn enqueue(&self, new: NewTask) -> Result<(), QueueError> {
        self.insert(new, false).await
    }

    /// 显式重新提交：无视活跃副本，替换为全新任务
    pub async fn resubmit(&self, new: NewTask) -> Result<(), QueueError> {
        self.insert(new, true).await
    }

    async fn insert(&self, new: NewTask, force: bool) -> Result<(), QueueError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        if let Some(existing) = inner.tasks.get(&new.id) {
            if !existing.status.is_terminal() && !force {
                return Err(QueueError::DuplicateTask {
                    id: new.id.to_string(),
                });
            }
            // 被覆盖副本的旧索引项随之作废
            let old_key = (existing.priority.rank(), existing.seq);
            inner.order.remove(&old_key);
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;

        let task = Task {
            id: new.id.clone(),
            url: new.url,
            kind: new.kind,
            priority: new.priority,
            status: TaskStatus::Pending,
            attempt_count: 0,
            created_at: chrono::Utc::now(),
            seq,
            visible_at: Instant::now(),
            last_error: None,
            captcha_failed_last_attempt: false,
        };

        debug!("入队任务 {} (优先级 {:?})", task.id, task.priority);
        inner.order.insert((task.priority.rank(), seq), task.id.clone());
        inner.tasks.insert(new.id, task);
        drop(guard);

        self.notify.notify_waiters();
        Ok(())
    }

    /// 出队一个任务，最多等待 `timeout`
    ///
    /// 无可投递任务时挂起（被入队/确认/到期唤醒），不忙轮询；
    /// 超时仍无任务则返回 `None`。
    pub async fn dequeue(&self, timeout: Duration) -> Option<Task> {
        let deadline = Instant::now() + timeout;

        loop {
            // 先注册唤醒意向，再检查状态，避免丢通知
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wait_hint = {
                let mut inner = self.inner.lock().await;
                match inner.take_eligible(Instant::now(), self.cfg.lease_duration) {
                    TakeResult::Taken(task) => {
                        debug!(
                            "出队任务 {} (第 {} 次尝试)",
                            task.id,
                            task.attempt_count + 1
                        );
                        return Some(*task);
                    }
                    TakeResult::NotReady(next) => next,
                }
            };

            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let mut wait = deadline - now;
            if let Some(at) = wait_hint {
                wait = wait.min(at.saturating_duration_since(now));
            }

            let _ = tokio::time::timeout(wait, notified).await;
        }
    }

    /// 确认任务结果
    ///
    /// 成功转 COMPLETED；失败按 [`CrawlError::class`] 走重试策略。
    /// 返回任务确认后的状态。
    pub async fn acknowledge(
        &self,
        id: &TaskId,
        outcome: TaskOutcome,
    ) -> Result<TaskStatus, QueueError> {
        let mut inner = self.inner.lock().await;

        let task = inner.tasks.get_mut(id).ok_or_else(|| QueueError::UnknownTask {
            id: id.to_string(),
        })?;

        // 迟到的确认（租约过期后对端已重新投递并完成）按幂等处理
        if task.status.is_terminal() {
            return Ok(task.status);
        }

        let status = match outcome {
            TaskOutcome::Success => {
                debug_assert!(task.status.can_transition_to(TaskStatus::Completed));
                task.status = TaskStatus::Completed;
                info!("✅ 任务 {} 完成 (尝试 {} 次)", task.id, task.attempt_count + 1);
                TaskStatus::Completed
            }
            TaskOutcome::Failure(err) => Self::route_failure(&self.cfg, task, err),
        };

        drop(inner);
        self.notify.notify_waiters();
        Ok(status)
    }

    /// 失败路由：升级判定 + 重试或终态
    fn route_failure(cfg: &QueueConfig, task: &mut Task, err: CrawlError) -> TaskStatus {
        // 验证码失败在紧接着的下一次尝试再次出现 -> 永久失败
        let captcha_repeat = err.is_captcha() && task.captcha_failed_last_attempt;
        task.captcha_failed_last_attempt = err.is_captcha();
        task.last_error = Some(err.to_string());

        let class = if captcha_repeat {
            FailureClass::Permanent
        } else {
            err.class()
        };

        match class {
            FailureClass::Permanent => {
                task.status = TaskStatus::FailedPermanent;
                warn!(
                    "❌ 任务 {} 永久失败: {}",
                    task.id,
                    task.last_error.as_deref().unwrap_or("-")
                );
                TaskStatus::FailedPermanent
            }
            FailureClass::Retriable { elevated } => Self::requeue_for_retry(cfg, task, elevated),
        }
    }

    /// 重试重排：递增尝试次数，超限转终态，否则按退避延迟重新可见
    fn requeue_for_retry(cfg: &QueueConfig, task: &mut Task, elevated: bool) -> TaskStatus {
        task.attempt_count += 1;

        if task.attempt_count > cfg.max_retries {
            task.status = TaskStatus::FailedPermanent;
            warn!(
                "❌ 任务 {} 重试 {} 次后放弃: {}",
                task.id,
                cfg.max_retries,
                task.last_error.as_deref().unwrap_or("-")
            );
            return TaskStatus::FailedPermanent;
        }

        let delay = if elevated {
            elevated_retry_delay(cfg.exhausted_retry_delay, task.attempt_count, cfg.retry_delay_cap)
        } else {
            retry_delay(cfg.base_retry_delay, task.attempt_count, cfg.retry_delay_cap)
        };

        task.status = TaskStatus::RetryScheduled;
        task.visible_at = Instant::now() + delay;
        info!(
            "🔁 任务 {} 将在 {:?} 后重试 (第 {} 次, {})",
            task.id,
            delay,
            task.attempt_count,
            task.last_error.as_deref().unwrap_or("-")
        );
        TaskStatus::RetryScheduled
    }

    /// 是否所有任务都已到达终态
    pub async fn is_drained(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.tasks.values().all(|t| t.status.is_terminal())
    }

    /// 队列计数
    pub async fn stats(&self) -> QueueStats {
        self.inner.lock().await.stats()
    }

    /// 按 ID 读取任务快照
    pub async fn get(&self, id: &TaskId) -> Option<Task> {
        self.inner.lock().await.tasks.get(id).cloned()
    }

    /// 导出可持久化快照（投递顺序在前，终态任务在后）
    ///
    /// 租约/重试窗口记录为相对剩余时长，恢复后语义不变。
    pub async fn snapshot(&self) -> Vec<TaskRecord> {
        let inner = self.inner.lock().await;
        let now = Instant::now();
        let mut records = Vec::with_capacity(inner.tasks.len());
        let mut seen = std::collections::HashSet::new();

        for id in inner.order.values() {
            if let Some(task) = inner.tasks.get(id) {
                if seen.insert(task.id.clone()) {
                    records.push(to_record(task, now));
                }
            }
        }
        for task in inner.tasks.values() {
            if seen.insert(task.id.clone()) {
                records.push(to_record(task, now));
            }
        }
        records
    }

    /// 从快照恢复队列（保持记录顺序作为 FIFO 顺序）
    pub fn restore(cfg: QueueConfig, records: Vec<TaskRecord>) -> Self {
        let now = Instant::now();
        let mut tasks = HashMap::with_capacity(records.len());
        let mut order = BTreeMap::new();
        let mut next_seq = 0u64;

        for record in records {
            let seq = next_seq;
            next_seq += 1;
            let task = Task {
                id: record.id.clone(),
                url: record.url,
                kind: record.kind,
                priority: record.priority,
                status: record.status,
                attempt_count: record.attempt_count,
                created_at: record.created_at,
                seq,
                visible_at: now + Duration::from_millis(record.visible_in_ms),
                last_error: record.last_error,
                captcha_failed_last_attempt: record.captcha_failed_last_attempt,
            };
            if !task.status.is_terminal() {
                order.insert((task.priority.rank(), seq), task.id.clone());
            }
            tasks.insert(record.id, task);
        }

        Self {
            cfg,
            inner: Mutex::new(Inner {
                tasks,
                order,
                next_seq,
            }),
            notify: Notify::new(),
        }
    }
}

fn to_record(task: &Task, now: Instant) -> TaskRecord {
    TaskRecord {
        id: task.id.clone(),
        url: task.url.clone(),
        kind: task.kind,
        priority: task.priority,
        status: task.status,
        attempt_count: task.attempt_count,
        created_at: task.created_at,
        visible_in_ms: task.visible_at.saturating_duration_since(now).as_millis() as u64,
        last_error: task.last_error.clone(),
        captcha_failed_last_attempt: task.captcha_failed_last_attempt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::{Priority, TaskKind};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn new_task(id: &str, priority: Priority) -> NewTask {
        NewTask {
            id: TaskId::new(id),
            url: format!("https://www.pinterest.com/{}/", id),
            kind: TaskKind::Board,
            priority,
        }
    }

    fn test_config() -> QueueConfig {
        QueueConfig {
            lease_duration: Duration::from_millis(200),
            max_retries: 3,
            base_retry_delay: Duration::from_millis(10),
            exhausted_retry_delay: Duration::from_millis(50),
            retry_delay_cap: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_priority_then_fifo_order() {
        let queue = TaskQueue::new(test_config());
        queue.enqueue(new_task("low", Priority::Low)).await.unwrap();
        queue.enqueue(new_task("high", Priority::High)).await.unwrap();
        queue.enqueue(new_task("normal", Priority::Normal)).await.unwrap();
        queue.enqueue(new_task("high-2", Priority::High)).await.unwrap();

        let a = queue.dequeue(Duration::from_millis(50)).await.unwrap();
        let b = queue.dequeue(Duration::from_millis(50)).await.unwrap();
        let c = queue.dequeue(Duration::from_millis(50)).await.unwrap();
        let d = queue.dequeue(Duration::from_millis(50)).await.unwrap();

        assert_eq!(a.id.as_str(), "high");
        assert_eq!(b.id.as_str(), "high-2");
        assert_eq!(c.id.as_str(), "normal");
        assert_eq!(d.id.as_str(), "low");
    }

    #[tokio::test]
    async fn test_duplicate_rejected_unless_resubmitted() {
        let queue = TaskQueue::new(test_config());
        queue.enqueue(new_task("t1", Priority::Normal)).await.unwrap();

        let err = queue.enqueue(new_task("t1", Priority::Normal)).await.unwrap_err();
        assert!(matches!(err, QueueError::DuplicateTask { .. }));

        // 显式重新提交可以覆盖活跃副本
        queue.resubmit(new_task("t1", Priority::High)).await.unwrap();
        let task = queue.dequeue(Duration::from_millis(50)).await.unwrap();
        assert_eq!(task.priority, Priority::High);
    }

    #[tokio::test]
    async fn test_completed_task_can_be_enqueued_again() {
        let queue = TaskQueue::new(test_config());
        queue.enqueue(new_task("t1", Priority::Normal)).await.unwrap();
        let task = queue.dequeue(Duration::from_millis(50)).await.unwrap();
        queue.acknowledge(&task.id, TaskOutcome::Success).await.unwrap();

        // 终态副本不阻塞普通入队
        queue.enqueue(new_task("t1", Priority::Normal)).await.unwrap();
        assert!(queue.dequeue(Duration::from_millis(50)).await.is_some());
    }

    #[tokio::test]
    async fn test_lease_expiry_makes_task_visible_again() {
        let queue = TaskQueue::new(test_config());
        queue.enqueue(new_task("t1", Priority::Normal)).await.unwrap();

        let first = queue.dequeue(Duration::from_millis(50)).await.unwrap();
        assert_eq!(first.status, TaskStatus::Leased);

        // 租约未过期时不可再出队
        assert!(queue.dequeue(Duration::from_millis(50)).await.is_none());

        // 租约 (200ms) 过期后重新可见
        let again = queue.dequeue(Duration::from_millis(400)).await.unwrap();
        assert_eq!(again.id, first.id);
    }

    #[tokio::test]
    async fn test_retry_then_permanent_after_max_retries() {
        let queue = TaskQueue::new(test_config());
        queue.enqueue(new_task("t1", Priority::Normal)).await.unwrap();

        // max_retries = 3：三次失败后仍会重试，第四次转终态
        for attempt in 1..=3u32 {
            let task = queue.dequeue(Duration::from_secs(1)).await.unwrap();
            let status = queue
                .acknowledge(
                    &task.id,
                    TaskOutcome::Failure(CrawlError::Transient {
                        reason: "超时".to_string(),
                    }),
                )
                .await
                .unwrap();
            assert_eq!(status, TaskStatus::RetryScheduled);
            let snapshot = queue.get(&task.id).await.unwrap();
            assert_eq!(snapshot.attempt_count, attempt);
        }

        let task = queue.dequeue(Duration::from_secs(1)).await.unwrap();
        let status = queue
            .acknowledge(
                &task.id,
                TaskOutcome::Failure(CrawlError::Transient {
                    reason: "超时".to_string(),
                }),
            )
            .await
            .unwrap();
        assert_eq!(status, TaskStatus::FailedPermanent);

        // 终态任务不再投递
        assert!(queue.dequeue(Duration::from_millis(100)).await.is_none());
        let snapshot = queue.get(&task.id).await.unwrap();
        assert!(snapshot.last_error.is_some());
    }

    #[tokio::test]
    async fn test_permanent_error_skips_retry() {
        let queue = TaskQueue::new(test_config());
        queue.enqueue(new_task("t1", Priority::Normal)).await.unwrap();

        let task = queue.dequeue(Duration::from_millis(50)).await.unwrap();
        let status = queue
            .acknowledge(
                &task.id,
                TaskOutcome::Failure(CrawlError::Permanent {
                    reason: "URL 非法".to_string(),
                }),
            )
            .await
            .unwrap();
        assert_eq!(status, TaskStatus::FailedPermanent);
    }

    #[tokio::test]
    async fn test_captcha_twice_in_a_row_is_permanent() {
        let queue = TaskQueue::new(test_config());
        queue.enqueue(new_task("t1", Priority::Normal)).await.unwrap();

        let task = queue.dequeue(Duration::from_secs(1)).await.unwrap();
        let status = queue
            .acknowledge(
                &task.id,
                TaskOutcome::Failure(CrawlError::CaptchaUnsolvable {
                    kind: "recaptcha".to_string(),
                }),
            )
            .await
            .unwrap();
        // 第一次验证码失败：重试
        assert_eq!(status, TaskStatus::RetryScheduled);

        let task = queue.dequeue(Duration::from_secs(1)).await.unwrap();
        let status = queue
            .acknowledge(
                &task.id,
                TaskOutcome::Failure(CrawlError::CaptchaUnsolvable {
                    kind: "recaptcha".to_string(),
                }),
            )
            .await
            .unwrap();
        // 紧接着的下一次尝试再次验证码失败：永久失败
        assert_eq!(status, TaskStatus::FailedPermanent);
    }

    #[tokio::test]
    async fn test_captcha_streak_resets_on_other_failure() {
        let queue = TaskQueue::new(test_config());
        queue.enqueue(new_task("t1", Priority::Normal)).await.unwrap();

        let task = queue.dequeue(Duration::from_secs(1)).await.unwrap();
        queue
            .acknowledge(
                &task.id,
                TaskOutcome::Failure(CrawlError::CaptchaUnsolvable {
                    kind: "slider".to_string(),
                }),
            )
            .await
            .unwrap();

        // 中间隔了一次普通瞬时失败，验证码连击被打断
        let task = queue.dequeue(Duration::from_secs(1)).await.unwrap();
        queue
            .acknowledge(
                &task.id,
                TaskOutcome::Failure(CrawlError::Transient {
                    reason: "连接被重置".to_string(),
                }),
            )
            .await
            .unwrap();

        let task = queue.dequeue(Duration::from_secs(1)).await.unwrap();
        let status = queue
            .acknowledge(
                &task.id,
                TaskOutcome::Failure(CrawlError::CaptchaUnsolvable {
                    kind: "slider".to_string(),
                }),
            )
            .await
            .unwrap();
        assert_eq!(status, TaskStatus::RetryScheduled);
    }

    #[tokio::test]
    async fn test_concurrent_dequeue_no_duplicates() {
        let queue = Arc::new(TaskQueue::new(test_config()));
        for i in 0..20 {
            queue
                .enqueue(new_task(&format!("t{}", i), Priority::Normal))
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                let mut ids = Vec::new();
                while let Some(task) = queue.dequeue(Duration::from_millis(20)).await {
                    ids.push(task.id.clone());
                }
                ids
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }

        // 租约窗口内没有任何任务被发给两个 worker
        let unique: HashSet<_> = all.iter().cloned().collect();
        assert_eq!(all.len(), 20);
        assert_eq!(unique.len(), 20);
    }

    #[tokio::test]
    async fn test_dequeue_blocks_until_enqueue() {
        let queue = Arc::new(TaskQueue::new(test_config()));

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue(Duration::from_secs(2)).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        queue.enqueue(new_task("late", Priority::Normal)).await.unwrap();

        let task = waiter.await.unwrap().expect("挂起的出队应被入队唤醒");
        assert_eq!(task.id.as_str(), "late");
    }

    #[tokio::test]
    async fn test_snapshot_restore_preserves_lease_semantics() {
        let queue = TaskQueue::new(test_config());
        queue.enqueue(new_task("leased", Priority::Normal)).await.unwrap();
        queue.enqueue(new_task("pending", Priority::Low)).await.unwrap();

        // 租出第一个任务再快照
        let leased = queue.dequeue(Duration::from_millis(50)).await.unwrap();
        assert_eq!(leased.id.as_str(), "leased");

        let records = queue.snapshot().await;
        assert_eq!(records.len(), 2);

        let restored = TaskQueue::restore(test_config(), records);

        // 恢复后：租约仍在生效，先看到的是 pending 任务
        let first = restored.dequeue(Duration::from_millis(50)).await.unwrap();
        assert_eq!(first.id.as_str(), "pending");

        // 原租约 (200ms) 到期后，leased 任务重新可见
        let second = restored.dequeue(Duration::from_millis(400)).await.unwrap();
        assert_eq!(second.id.as_str(), "leased");
    }

    #[tokio::test]
    async fn test_stats_and_drained() {
        let queue = TaskQueue::new(test_config());
        queue.enqueue(new_task("a", Priority::Normal)).await.unwrap();
        queue.enqueue(new_task("b", Priority::Normal)).await.unwrap();

        assert!(!queue.is_drained().await);

        let t1 = queue.dequeue(Duration::from_millis(50)).await.unwrap();
        queue.acknowledge(&t1.id, TaskOutcome::Success).await.unwrap();
        let t2 = queue.dequeue(Duration::from_millis(50)).await.unwrap();
        queue
            .acknowledge(
                &t2.id,
                TaskOutcome::Failure(CrawlError::Permanent {
                    reason: "坏任务".to_string(),
                }),
            )
            .await
            .unwrap();

        let stats = queue.stats().await;
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed_permanent, 1);
        assert!(queue.is_drained().await);
    }
}
