//! worker 循环 - 编排层
//!
//! 每个 worker 独立运行：出队 → 会话 → 确认。会话内部的任何组件
//! 失败都被翻译成任务结果回执给队列。worker 循环只因关停信号或
//! 队列排空而退出，绝不被单次失败杀死。

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Duration;
use tracing::{debug, error, info};

use crate::error::CrawlError;
use crate::models::task::{TaskOutcome, TaskStatus};
use crate::orchestrator::stats::EngineStats;
use crate::queue::TaskQueue;
use crate::services::failure_log::FailureLogWriter;
use crate::utils::logging;
use crate::workflow::SessionFlow;

pub(crate) struct WorkerHandle {
    pub queue: Arc<TaskQueue>,
    pub flow: Arc<SessionFlow>,
    pub stats: Arc<EngineStats>,
    pub failure_log: Arc<FailureLogWriter>,
    pub poll: Duration,
}

/// 单个 worker 的主循环
///
/// 队列排空（全部终态）或收到关停信号时返回；进行中的会话
/// 一定先走完 TEARDOWN 再退出。
pub(crate) async fn worker_loop(
    worker_id: usize,
    handle: WorkerHandle,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!("worker {} 启动", worker_id);

    loop {
        if *shutdown.borrow() {
            break;
        }

        let task = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            t = handle.queue.dequeue(handle.poll) => t,
        };

        let Some(task) = task else {
            if handle.queue.is_drained().await {
                debug!("worker {} 发现队列已排空", worker_id);
                break;
            }
            continue;
        };

        let task_id = task.id.clone();
        info!(
            "[worker {}] ▶ 任务 {} [{}] {}",
            worker_id,
            task_id,
            task.kind.label(),
            logging::truncate_text(&task.url, 80)
        );

        // 会话全程不可被 select 掐断：取消由 flow 内部处理并保证 TEARDOWN
        let report = handle.flow.run(task, shutdown.clone()).await;

        for event in &report.captcha_events {
            handle.stats.captchas_detected.fetch_add(1, Ordering::Relaxed);
            if event.outcome.is_solved() {
                handle.stats.captchas_solved.fetch_add(1, Ordering::Relaxed);
            }
        }

        let outcome = match report.result {
            Ok(records) => {
                handle.stats.records_saved.fetch_add(records, Ordering::Relaxed);
                TaskOutcome::Success
            }
            Err(err) => {
                if matches!(err, CrawlError::ResourceExhausted { .. }) {
                    handle
                        .stats
                        .pool_exhausted_events
                        .fetch_add(1, Ordering::Relaxed);
                }
                TaskOutcome::Failure(err)
            }
        };

        match handle.queue.acknowledge(&task_id, outcome).await {
            Ok(TaskStatus::Completed) => {
                handle.stats.tasks_succeeded.fetch_add(1, Ordering::Relaxed);
            }
            Ok(TaskStatus::RetryScheduled) => {
                handle.stats.retries_scheduled.fetch_add(1, Ordering::Relaxed);
            }
            Ok(TaskStatus::FailedPermanent) => {
                handle
                    .stats
                    .tasks_failed_permanent
                    .fetch_add(1, Ordering::Relaxed);
                // 死信落盘，运维侧据此排查
                if let Some(task) = handle.queue.get(&task_id).await {
                    if let Err(e) = handle.failure_log.write(&task).await {
                        error!("[worker {}] 写失败日志出错: {}", worker_id, e);
                    }
                }
            }
            Ok(other) => {
                debug!("[worker {}] 任务 {} 确认后状态 {}", worker_id, task_id, other);
            }
            Err(e) => {
                // 组件错误翻译为日志，不终止循环
                error!("[worker {}] 确认任务 {} 失败: {}", worker_id, task_id, e);
            }
        }
    }

    info!("worker {} 退出", worker_id);
}
