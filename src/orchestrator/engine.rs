//! 抓取引擎 - 编排层
//!
//! ## 职责
//!
//! 1. **装配**：一个引擎实例拥有一个队列和它的两个资源池、限速器、
//!    会话流程。全部是显式字段，不做进程级单例，一个进程可以
//!    并存多个互不相干的引擎
//! 2. **并发控制**：固定规模的 worker 编队（`max_concurrent_sessions`）
//! 3. **关停**：watch 信号扇出到所有 worker 与会话；进行中的会话
//!    走完 TEARDOWN 后进程才退出
//! 4. **全局统计**：汇总成功/失败/重试/验证码/落库计数

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::time::Duration;
use tracing::{error, info, warn};

use crate::captcha::CaptchaSolverProvider;
use crate::config::Config;
use crate::error::QueueError;
use crate::infrastructure::browser::BrowserBackend;
use crate::infrastructure::chromium::ChromiumBackend;
use crate::limiter::RateLimiter;
use crate::models::loaders::{load_accounts, load_all_seed_files, load_proxies};
use crate::models::resource::{AccountCredential, ProxyEndpoint};
use crate::models::task::{NewTask, TaskRecord};
use crate::orchestrator::stats::{EngineStats, StatsSnapshot};
use crate::orchestrator::worker::{worker_loop, WorkerHandle};
use crate::pool::ResourcePool;
use crate::queue::{QueueStats, TaskQueue};
use crate::services::extractor::{Extractor, PageExtractor};
use crate::services::failure_log::FailureLogWriter;
use crate::services::repository::{MemoryRepository, Repository};
use crate::services::solver::HttpSolver;
use crate::utils::logging;
use crate::workflow::SessionFlow;

/// 抓取引擎
pub struct Engine {
    config: Config,
    queue: Arc<TaskQueue>,
    proxies: Arc<ResourcePool<ProxyEndpoint>>,
    accounts: Arc<ResourcePool<AccountCredential>>,
    flow: Arc<SessionFlow>,
    stats: Arc<EngineStats>,
    failure_log: Arc<FailureLogWriter>,
    shutdown_tx: watch::Sender<bool>,
}

impl Engine {
    /// 生产装配：连接浏览器、加载资源清单、接入真实协作方
    pub async fn initialize(config: Config) -> Result<Self> {
        logging::init_log_file(&config.output_log_file)?;
        logging::log_startup(config.max_concurrent_sessions);

        let browser: Arc<dyn BrowserBackend> = Arc::new(
            ChromiumBackend::connect(config.browser_debug_port)
                .await
                .context("连接浏览器失败")?,
        );
        info!("✅ 浏览器已连接 (端口 {})", config.browser_debug_port);

        let proxies = load_proxies(Path::new(&config.proxies_file))
            .await
            .context("加载代理清单失败")?;
        let accounts = load_accounts(Path::new(&config.accounts_file))
            .await
            .context("加载账号清单失败")?;
        info!("✅ 资源清单: {} 个代理, {} 个账号", proxies.len(), accounts.len());

        let solver: Arc<dyn CaptchaSolverProvider> = Arc::new(HttpSolver::new(
            config.solver_api_url.clone(),
            config.solver_api_key.clone(),
        ));

        Ok(Self::with_collaborators(
            config,
            browser,
            Arc::new(PageExtractor::new()),
            Arc::new(MemoryRepository::new()),
            solver,
            proxies,
            accounts,
        ))
    }

    /// 用给定协作方装配引擎（测试从这里注入 mock）
    pub fn with_collaborators(
        config: Config,
        browser: Arc<dyn BrowserBackend>,
        extractor: Arc<dyn Extractor>,
        repository: Arc<dyn Repository>,
        solver: Arc<dyn CaptchaSolverProvider>,
        proxy_items: Vec<ProxyEndpoint>,
        account_items: Vec<AccountCredential>,
    ) -> Self {
        let queue = Arc::new(TaskQueue::new(config.queue_config()));
        let proxies = Arc::new(ResourcePool::new(
            "proxy",
            proxy_items,
            config.proxy_pool_config(),
        ));
        let accounts = Arc::new(ResourcePool::new(
            "account",
            account_items,
            config.account_pool_config(),
        ));
        let limiter = Arc::new(RateLimiter::new(
            Some(config.requests_per_minute),
            config.per_domain_rpm(),
        ));

        let flow = Arc::new(SessionFlow::new(
            &config,
            browser,
            extractor,
            repository,
            solver,
            proxies.clone(),
            accounts.clone(),
            limiter,
        ));

        let failure_log = Arc::new(FailureLogWriter::new(config.failed_tasks_file.clone()));
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config,
            queue,
            proxies,
            accounts,
            flow,
            stats: Arc::new(EngineStats::default()),
            failure_log,
            shutdown_tx,
        }
    }

    /// 入队一个任务（生产者接口）
    pub async fn enqueue(&self, task: NewTask) -> Result<(), QueueError> {
        self.queue.enqueue(task).await
    }

    /// 显式重新提交
    pub async fn resubmit(&self, task: NewTask) -> Result<(), QueueError> {
        self.queue.resubmit(task).await
    }

    /// 从配置的种子文件夹批量入队，返回入队数量
    pub async fn enqueue_seed_tasks(&self) -> Result<usize> {
        info!("\n📁 正在扫描种子任务...");
        let tasks = load_all_seed_files(&self.config.seed_task_folder).await?;
        let mut enqueued = 0usize;
        for task in tasks {
            match self.queue.enqueue(task).await {
                Ok(()) => enqueued += 1,
                Err(QueueError::DuplicateTask { id }) => {
                    warn!("⚠️ 跳过重复任务 {}", id);
                }
                Err(e) => return Err(e.into()),
            }
        }
        info!("✓ 入队 {} 个种子任务", enqueued);
        Ok(enqueued)
    }

    /// 运行 worker 编队直到队列排空或收到关停信号
    pub async fn run(&self) -> Result<StatsSnapshot> {
        let queue_stats = self.queue.stats().await;
        if queue_stats.pending == 0 && queue_stats.retry_scheduled == 0 {
            warn!("⚠️ 队列为空，没有可处理的任务");
            return Ok(self.stats.snapshot());
        }
        logging::log_run_begin(queue_stats.pending, self.config.max_concurrent_sessions);

        let mut handles = Vec::with_capacity(self.config.max_concurrent_sessions);
        for worker_id in 0..self.config.max_concurrent_sessions {
            let handle = WorkerHandle {
                queue: self.queue.clone(),
                flow: self.flow.clone(),
                stats: self.stats.clone(),
                failure_log: self.failure_log.clone(),
                poll: Duration::from_secs(self.config.dequeue_poll_secs),
            };
            let shutdown = self.shutdown_tx.subscribe();
            handles.push(tokio::spawn(worker_loop(worker_id, handle, shutdown)));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                // worker panic 只可能来自缺陷，记下来但不拖垮其余 worker 的收尾
                error!("worker 异常退出: {}", e);
            }
        }

        // 所有 worker 已退出；确保信号对后续观察者可见
        let _ = self.shutdown_tx.send(true);

        let snapshot = self.stats.snapshot();
        logging::print_final_stats(&snapshot, &self.config.output_log_file);
        Ok(snapshot)
    }

    /// 广播关停信号：进行中的会话走完 TEARDOWN 后退出
    pub fn trigger_shutdown(&self) {
        info!("🛑 收到关停信号，等待进行中的会话收尾...");
        let _ = self.shutdown_tx.send(true);
    }

    /// 统计快照
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// 队列计数
    pub async fn queue_stats(&self) -> QueueStats {
        self.queue.stats().await
    }

    /// 导出队列快照（可持久化，重启后恢复租约语义）
    pub async fn snapshot_queue(&self) -> Vec<TaskRecord> {
        self.queue.snapshot().await
    }

    /// 代理池/账号池计数（运维观察口）
    pub async fn pool_stats(&self) -> (crate::pool::PoolStats, crate::pool::PoolStats) {
        (self.proxies.stats().await, self.accounts.stats().await)
    }
}
