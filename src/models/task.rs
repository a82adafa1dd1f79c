//! 任务数据模型
//!
//! 任务的状态沿固定的有向图单向推进，尝试次数只增不减；
//! 队列模块负责在持锁状态下执行这些转换。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::CrawlError;

/// 任务唯一标识
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 任务类型（对应站点上的三类抓取目标）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// 搜索结果页
    Search,
    /// 画板/合集页
    Board,
    /// 单个图钉详情页
    Pin,
}

impl TaskKind {
    pub fn label(self) -> &'static str {
        match self {
            TaskKind::Search => "search",
            TaskKind::Board => "board",
            TaskKind::Pin => "pin",
        }
    }
}

/// 任务优先级
///
/// 排序值越小越优先；同一优先级内严格按入队顺序出队。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    /// 队列排序用的序号
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Normal => 1,
            Priority::Low => 2,
        }
    }
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// 等待首次投递
    Pending,
    /// 已被某个 worker 租约占有
    Leased,
    /// 成功终态
    Completed,
    /// 等待重试投递
    RetryScheduled,
    /// 失败终态
    FailedPermanent,
}

impl TaskStatus {
    /// 是否终态
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::FailedPermanent)
    }

    /// 状态转换是否在固定有向图上
    ///
    /// `Leased -> Leased` 是租约过期后的重新投递，属于合法边。
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Leased)
                | (Leased, Leased)
                | (Leased, Completed)
                | (Leased, RetryScheduled)
                | (Leased, FailedPermanent)
                | (RetryScheduled, Leased)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Leased => "leased",
            TaskStatus::Completed => "completed",
            TaskStatus::RetryScheduled => "retry_scheduled",
            TaskStatus::FailedPermanent => "failed_permanent",
        };
        write!(f, "{}", s)
    }
}

/// 一个抓取任务
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub url: String,
    pub kind: TaskKind,
    pub priority: Priority,
    pub status: TaskStatus,
    /// 尝试次数，只增不减
    pub attempt_count: u32,
    pub created_at: DateTime<Utc>,
    /// 入队序号，同优先级内的 FIFO 依据
    pub seq: u64,
    /// 此时刻之前对 dequeue 不可见（租约窗口 / 重试延迟）
    pub visible_at: Instant,
    pub last_error: Option<String>,
    /// 上一次尝试是否以验证码失败收场（连续两次即永久失败）
    pub captcha_failed_last_attempt: bool,
}

impl Task {
    /// 任务目标的域名，作为限速器的作用域
    pub fn domain(&self) -> &str {
        let rest = self
            .url
            .split_once("://")
            .map(|(_, r)| r)
            .unwrap_or(&self.url);
        rest.split(['/', '?']).next().unwrap_or(rest)
    }
}

/// 新任务参数（入队时提供）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub id: TaskId,
    pub url: String,
    pub kind: TaskKind,
    #[serde(default = "default_priority")]
    pub priority: Priority,
}

fn default_priority() -> Priority {
    Priority::Normal
}

/// 任务尝试的回执
#[derive(Debug)]
pub enum TaskOutcome {
    Success,
    Failure(CrawlError),
}

/// 可持久化的队列快照行
///
/// `visible_in_ms` 记录距快照时刻的剩余不可见时长，恢复时据此
/// 重建租约/重试窗口，租约语义不因重启丢失。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub url: String,
    pub kind: TaskKind,
    pub priority: Priority,
    pub status: TaskStatus,
    pub attempt_count: u32,
    pub created_at: DateTime<Utc>,
    pub visible_in_ms: u64,
    pub last_error: Option<String>,
    #[serde(default)]
    pub captcha_failed_last_attempt: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        assert!(Priority::High.rank() < Priority::Normal.rank());
        assert!(Priority::Normal.rank() < Priority::Low.rank());
    }

    #[test]
    fn test_status_graph() {
        use TaskStatus::*;
        assert!(Pending.can_transition_to(Leased));
        assert!(Leased.can_transition_to(Completed));
        assert!(Leased.can_transition_to(RetryScheduled));
        assert!(Leased.can_transition_to(FailedPermanent));
        assert!(RetryScheduled.can_transition_to(Leased));
        // 租约过期后的重新投递
        assert!(Leased.can_transition_to(Leased));

        // 终态不可逆
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Leased));
        assert!(!FailedPermanent.can_transition_to(Leased));
        assert!(!Leased.can_transition_to(Pending));
    }

    #[test]
    fn test_domain_parse() {
        let task = Task {
            id: TaskId::new("t1"),
            url: "https://www.pinterest.com/sangi/boards/?page=2".to_string(),
            kind: TaskKind::Board,
            priority: Priority::Normal,
            status: TaskStatus::Pending,
            attempt_count: 0,
            created_at: Utc::now(),
            seq: 0,
            visible_at: Instant::now(),
            last_error: None,
            captcha_failed_last_attempt: false,
        };
        assert_eq!(task.domain(), "www.pinterest.com");
    }
}
