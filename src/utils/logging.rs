//! 日志工具模块
//!
//! 提供日志初始化、运行头和统计输出的辅助函数

use std::fs;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::orchestrator::stats::StatsSnapshot;

/// 初始化 tracing 订阅器（RUST_LOG 可覆盖级别，默认 info）
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// 初始化运行日志文件（写入本次运行的头部）
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n抓取任务日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(max_concurrent: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 并发抓取编排模式");
    info!("📊 最大并发会话数: {}", max_concurrent);
    info!("{}", "=".repeat(60));
}

/// 记录一轮运行的开始
pub fn log_run_begin(pending: usize, workers: usize) {
    info!("✓ 待处理任务 {} 个", pending);
    info!("📋 启动 {} 个 worker 并发处理", workers);
    info!("💡 队列排空或收到关停信号后结束\n");
}

/// 打印最终统计信息
pub fn print_final_stats(stats: &StatsSnapshot, log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}", stats.tasks_succeeded);
    info!("❌ 永久失败: {}", stats.tasks_failed_permanent);
    info!("🔁 重试调度: {}", stats.retries_scheduled);
    info!(
        "🧩 验证码: 遇到 {} / 解决 {}",
        stats.captchas_detected, stats.captchas_solved
    );
    info!("📦 落库记录: {}", stats.records_saved);
    if stats.pool_exhausted_events > 0 {
        info!("⚠️ 资源池耗尽事件: {}", stats.pool_exhausted_events);
    }
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("短文本", 10), "短文本");
        let long = "a".repeat(100);
        let cut = truncate_text(&long, 10);
        assert_eq!(cut, format!("{}...", "a".repeat(10)));
    }
}
