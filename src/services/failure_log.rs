//! 失败日志服务 - 业务能力层
//!
//! 只负责"把永久失败的任务写进 failed_tasks.txt"能力，
//! 作为运维侧的死信记录；不关心流程。

use std::fs::OpenOptions;
use std::io::Write;

use anyhow::Result;
use tracing::debug;

use crate::models::task::Task;

/// 失败日志写入服务
pub struct FailureLogWriter {
    path: String,
}

impl FailureLogWriter {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// 追加一条永久失败记录
    pub async fn write(&self, task: &Task) -> Result<()> {
        debug!(
            "写入失败日志: 任务 {} | 尝试 {} 次",
            task.id, task.attempt_count
        );

        let line = format!(
            "任务 {} | {} | 尝试 {} 次 | 错误: {}\n",
            task.id,
            task.url,
            task.attempt_count,
            task.last_error.as_deref().unwrap_or("-")
        );

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;

        Ok(())
    }
}
