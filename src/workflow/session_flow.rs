//! 会话生命周期 - 流程层
//!
//! 每次任务尝试走一遍固定状态链：
//!
//! ```text
//! ACQUIRE_RESOURCES → PREPARE_SESSION → WARMUP → AUTHENTICATE → EXECUTE → TEARDOWN
//! ```
//!
//! 阶段推进（[`advance`]）是纯函数；每个阶段独立超时；TEARDOWN
//! 无条件执行：无论之前哪个阶段失败或会话被取消，浏览器上下文
//! 一定被释放、两个资源池一定收到归还回执。

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

use crate::captcha::{CaptchaDetector, CaptchaEvent, CaptchaHandler, CaptchaStrategy};
use crate::config::Config;
use crate::error::CrawlError;
use crate::infrastructure::browser::{BrowserBackend, LoginOutcome};
use crate::limiter::RateLimiter;
use crate::models::fingerprint::FingerprintGenerator;
use crate::models::resource::{AccountCredential, ProxyEndpoint};
use crate::models::task::Task;
use crate::pool::ResourcePool;
use crate::services::behavior::HumanBehavior;
use crate::services::extractor::Extractor;
use crate::services::repository::Repository;
use crate::workflow::session_ctx::SessionContext;

/// 生命周期阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    AcquireResources,
    PrepareSession,
    Warmup,
    Authenticate,
    Execute,
    Teardown,
}

impl SessionStage {
    pub fn label(self) -> &'static str {
        match self {
            SessionStage::AcquireResources => "acquire_resources",
            SessionStage::PrepareSession => "prepare_session",
            SessionStage::Warmup => "warmup",
            SessionStage::Authenticate => "authenticate",
            SessionStage::Execute => "execute",
            SessionStage::Teardown => "teardown",
        }
    }
}

/// 纯转移函数：阶段成功后的下一个阶段（`Teardown` 之后没有下一步）
pub fn advance(stage: SessionStage) -> Option<SessionStage> {
    match stage {
        SessionStage::AcquireResources => Some(SessionStage::PrepareSession),
        SessionStage::PrepareSession => Some(SessionStage::Warmup),
        SessionStage::Warmup => Some(SessionStage::Authenticate),
        SessionStage::Authenticate => Some(SessionStage::Execute),
        SessionStage::Execute => Some(SessionStage::Teardown),
        SessionStage::Teardown => None,
    }
}

/// 各阶段超时
#[derive(Debug, Clone)]
pub struct StageTimeouts {
    pub acquire: Duration,
    pub prepare: Duration,
    pub warmup: Duration,
    pub authenticate: Duration,
    pub execute: Duration,
    pub teardown: Duration,
}

impl StageTimeouts {
    pub fn from_config(config: &Config) -> Self {
        Self {
            acquire: Duration::from_secs(config.acquire_timeout_secs),
            prepare: Duration::from_secs(config.prepare_timeout_secs),
            warmup: Duration::from_secs(config.warmup_timeout_secs),
            authenticate: Duration::from_secs(config.auth_timeout_secs),
            execute: Duration::from_secs(config.execute_timeout_secs),
            teardown: Duration::from_secs(config.teardown_timeout_secs),
        }
    }

    pub fn for_stage(&self, stage: SessionStage) -> Duration {
        match stage {
            SessionStage::AcquireResources => self.acquire,
            SessionStage::PrepareSession => self.prepare,
            SessionStage::Warmup => self.warmup,
            SessionStage::Authenticate => self.authenticate,
            SessionStage::Execute => self.execute,
            SessionStage::Teardown => self.teardown,
        }
    }
}

/// 一次会话的回执
#[derive(Debug)]
pub struct SessionReport {
    /// 成功时携带落库记录数
    pub result: Result<usize, CrawlError>,
    /// 本次尝试的验证码事件（交给编排层计数后丢弃）
    pub captcha_events: Vec<CaptchaEvent>,
}

/// 会话流程
///
/// 持有协作方句柄与两个资源池，驱动单次任务尝试；
/// 不持有队列，出队/确认归 worker。
pub struct SessionFlow {
    browser: Arc<dyn BrowserBackend>,
    extractor: Arc<dyn Extractor>,
    repository: Arc<dyn Repository>,
    proxies: Arc<ResourcePool<ProxyEndpoint>>,
    accounts: Arc<ResourcePool<AccountCredential>>,
    limiter: Arc<RateLimiter>,
    detector: CaptchaDetector,
    captcha: CaptchaHandler,
    behavior: HumanBehavior,
    fingerprints: Mutex<FingerprintGenerator>,
    timeouts: StageTimeouts,
    login_url: String,
    warmup_enabled: bool,
}

impl SessionFlow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &Config,
        browser: Arc<dyn BrowserBackend>,
        extractor: Arc<dyn Extractor>,
        repository: Arc<dyn Repository>,
        solver: Arc<dyn crate::captcha::CaptchaSolverProvider>,
        proxies: Arc<ResourcePool<ProxyEndpoint>>,
        accounts: Arc<ResourcePool<AccountCredential>>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        let captcha = CaptchaHandler::new(
            CaptchaStrategy::parse(&config.captcha_strategy),
            solver,
            config.captcha_max_solve_attempts,
            Duration::from_secs(config.captcha_manual_wait_secs),
        );
        Self {
            browser,
            extractor,
            repository,
            proxies,
            accounts,
            limiter,
            detector: CaptchaDetector::new(),
            captcha,
            behavior: HumanBehavior::new(
                Duration::from_millis(config.warmup_dwell_min_ms),
                Duration::from_millis(config.warmup_dwell_max_ms),
            ),
            fingerprints: Mutex::new(FingerprintGenerator::new(config.fingerprint_seed())),
            timeouts: StageTimeouts::from_config(config),
            login_url: config.login_url.clone(),
            warmup_enabled: config.warmup_enabled,
        }
    }

    /// 驱动一次完整的任务尝试
    ///
    /// 返回前 TEARDOWN 必然已经执行过，包括取消路径。
    pub async fn run(&self, task: Task, shutdown: watch::Receiver<bool>) -> SessionReport {
        let mut ctx = SessionContext::new(task);
        debug!("{} 会话开始", ctx);

        let result = self.drive(&mut ctx, shutdown).await;

        // TEARDOWN：无条件执行
        self.teardown(&mut ctx, &result).await;

        let records = ctx.records_saved;
        SessionReport {
            result: result.map(|_| records),
            captcha_events: std::mem::take(&mut ctx.captcha_events),
        }
    }

    /// 走 ACQUIRE → … → EXECUTE 的主链，任何失败立即中止
    async fn drive(
        &self,
        ctx: &mut SessionContext,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), CrawlError> {
        let mut stage = SessionStage::AcquireResources;

        loop {
            if *shutdown.borrow() {
                return Err(CrawlError::Cancelled);
            }

            let stage_timeout = self.timeouts.for_stage(stage);
            // step 的借用限制在块内，结束后 ctx 重新可用
            let result = {
                let step = self.step(stage, ctx);
                tokio::pin!(step);

                loop {
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break Err(CrawlError::Cancelled);
                            }
                        }
                        r = timeout(stage_timeout, &mut step) => {
                            break match r {
                                Ok(inner) => inner,
                                Err(_) => Err(CrawlError::StageTimeout {
                                    stage: stage.label(),
                                    timeout: stage_timeout,
                                }),
                            };
                        }
                    }
                }
            };

            result?;

            match advance(stage) {
                Some(SessionStage::Teardown) | None => return Ok(()),
                Some(next) => {
                    debug!("{} 进入阶段 {}", ctx, next.label());
                    stage = next;
                }
            }
        }
    }

    async fn step(&self, stage: SessionStage, ctx: &mut SessionContext) -> Result<(), CrawlError> {
        match stage {
            SessionStage::AcquireResources => self.acquire_resources(ctx).await,
            SessionStage::PrepareSession => self.prepare_session(ctx).await,
            SessionStage::Warmup => self.warmup(ctx).await,
            SessionStage::Authenticate => self.authenticate(ctx).await,
            SessionStage::Execute => self.execute(ctx).await,
            // Teardown 不走 step 分派
            SessionStage::Teardown => Ok(()),
        }
    }

    /// ACQUIRE_RESOURCES：从两个池各借一项
    async fn acquire_resources(&self, ctx: &mut SessionContext) -> Result<(), CrawlError> {
        let proxy = self.proxies.checkout().await?;
        ctx.proxy_id = Some(proxy.id.clone());

        // 账号借出失败时代理已在 ctx 里，TEARDOWN 会归还
        let account = self.accounts.checkout().await?;
        ctx.account_id = Some(account.id.clone());

        debug!("{} 资源已绑定", ctx);
        Ok(())
    }

    /// PREPARE_SESSION：限速后向后端要一个带指纹的上下文
    async fn prepare_session(&self, ctx: &mut SessionContext) -> Result<(), CrawlError> {
        self.limiter.wait_if_needed(ctx.task.domain()).await;

        let proxy_id = ctx.proxy_id.clone().unwrap_or_default();
        let proxy = self
            .proxies
            .get_item(&proxy_id)
            .await
            .ok_or_else(|| CrawlError::Transient {
                reason: format!("代理 {} 不在池中", proxy_id),
            })?;
        let fingerprint = self.fingerprints.lock().await.generate();
        ctx.fingerprint_id = Some(fingerprint.id.clone());

        let handle = self.browser.create_context(&proxy, &fingerprint).await?;
        ctx.handle = Some(handle);
        Ok(())
    }

    /// WARMUP：可选的拟人"翻页-停顿"，受阶段超时约束
    async fn warmup(&self, ctx: &mut SessionContext) -> Result<(), CrawlError> {
        if !self.warmup_enabled {
            return Ok(());
        }
        let handle = ctx.handle.clone().ok_or_else(|| CrawlError::Transient {
            reason: "上下文缺失".to_string(),
        })?;

        let plan = self.behavior.plan_warmup();
        debug!("{} 预热 {} 步", ctx, plan.scroll_steps.len());
        for (scroll, dwell) in plan.scroll_steps.iter().zip(&plan.dwells) {
            // 滚动失败不致命，预热是尽力而为
            let _ = self
                .browser
                .eval(&handle, format!("window.scrollBy(0, {})", scroll))
                .await;
            tokio::time::sleep(*dwell).await;
        }
        Ok(())
    }

    /// AUTHENTICATE：登录；验证码交给处理器，凭证被拒标记账号失败
    async fn authenticate(&self, ctx: &mut SessionContext) -> Result<(), CrawlError> {
        let handle = ctx.handle.as_ref().ok_or_else(|| CrawlError::Transient {
            reason: "上下文缺失".to_string(),
        })?;
        let account_id = ctx.account_id.clone().unwrap_or_default();
        let account = self
            .accounts
            .get_item(&account_id)
            .await
            .ok_or_else(|| CrawlError::Transient {
                reason: format!("账号 {} 不在池中", account_id),
            })?;

        let outcome = self.browser.login(handle, &account, &self.login_url).await?;
        match outcome {
            LoginOutcome::Success => {
                debug!("{} 登录成功", ctx);
                Ok(())
            }
            LoginOutcome::Rejected => {
                warn!("{} 凭证被拒", ctx);
                Err(CrawlError::Authentication {
                    account_id: account_id.clone(),
                })
            }
            LoginOutcome::Challenged(signals) => match self.detector.detect(&signals) {
                Some(kind) => {
                    let event = self.captcha.handle(kind, &signals.final_url).await;
                    let solved = event.outcome.is_solved();
                    ctx.captcha_events.push(event);
                    if solved {
                        Ok(())
                    } else {
                        Err(CrawlError::CaptchaUnsolvable {
                            kind: kind.label().to_string(),
                        })
                    }
                }
                None => Err(CrawlError::Transient {
                    reason: "登录未完成且无明确验证码信号".to_string(),
                }),
            },
        }
    }

    /// EXECUTE：导航、提取、落库
    async fn execute(&self, ctx: &mut SessionContext) -> Result<(), CrawlError> {
        let handle = ctx.handle.clone().ok_or_else(|| CrawlError::Transient {
            reason: "上下文缺失".to_string(),
        })?;

        let nav = self.browser.navigate(&handle, &ctx.task.url).await?;

        // 导航途中也可能撞上验证码：解决一次后重新导航
        if let Some(kind) = self.detector.detect(&nav.signals()) {
            let event = self.captcha.handle(kind, &nav.final_url).await;
            let solved = event.outcome.is_solved();
            ctx.captcha_events.push(event);
            if !solved {
                return Err(CrawlError::CaptchaUnsolvable {
                    kind: kind.label().to_string(),
                });
            }
            self.browser.navigate(&handle, &ctx.task.url).await?;
        }

        // 模拟阅读停顿后再动手提取
        if self.warmup_enabled {
            let pause = HumanBehavior::reading_delay(
                nav.page_text_sample.len(),
                Duration::from_secs(3),
            );
            tokio::time::sleep(pause).await;
        }

        let records = self
            .extractor
            .extract(self.browser.as_ref(), &handle, &ctx.task)
            .await?;

        let mut saved = 0usize;
        for record in records {
            self.repository
                .save(record)
                .await
                .map_err(|e| CrawlError::Transient {
                    reason: format!("存储失败: {}", e),
                })?;
            saved += 1;
        }
        ctx.records_saved = saved;
        info!("{} ✓ 提取并落库 {} 条记录", ctx, saved);
        Ok(())
    }

    /// TEARDOWN：释放浏览器上下文，按结果回执两个池
    ///
    /// 回执规则：成功 → 双 `mark_used`；凭证被拒 → 账号 `mark_failed`
    /// + 代理 `mark_used`；瞬时/超时/验证码未解 → 代理 `mark_failed` +
    /// 账号 `mark_used`；永久错误与取消 → 双 `mark_used`。
    async fn teardown(&self, ctx: &mut SessionContext, result: &Result<(), CrawlError>) {
        // 先还浏览器资源（带独立超时，失败只记日志）
        if let Some(handle) = ctx.handle.take() {
            match timeout(self.timeouts.teardown, self.browser.close(&handle)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("{} 释放上下文失败: {}", ctx, e),
                Err(_) => error!("{} 释放上下文超时", ctx),
            }
        }

        // 再回执资源池（纯状态操作，不依赖外部 I/O）
        let (proxy_failed, account_failed) = match result {
            Ok(()) => (false, false),
            Err(CrawlError::Authentication { .. }) => (false, true),
            Err(CrawlError::Transient { .. })
            | Err(CrawlError::StageTimeout { .. })
            | Err(CrawlError::CaptchaUnsolvable { .. }) => (true, false),
            Err(CrawlError::ResourceExhausted { .. })
            | Err(CrawlError::Permanent { .. })
            | Err(CrawlError::Cancelled) => (false, false),
        };

        if let Some(proxy_id) = ctx.proxy_id.take() {
            let res = if proxy_failed {
                let reason = result.as_ref().err().map(|e| e.to_string()).unwrap_or_default();
                self.proxies.mark_failed(&proxy_id, &reason).await
            } else {
                self.proxies.mark_used(&proxy_id).await
            };
            if let Err(e) = res {
                warn!("代理 {} 回执失败: {}", proxy_id, e);
            }
        }

        if let Some(account_id) = ctx.account_id.take() {
            let res = if account_failed {
                self.accounts.mark_failed(&account_id, "凭证被拒").await
            } else {
                self.accounts.mark_used(&account_id).await
            };
            if let Err(e) = res {
                warn!("账号 {} 回执失败: {}", account_id, e);
            }
        }

        debug!("会话收尾完成 (任务 {})", ctx.task.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_covers_full_chain() {
        let mut stage = SessionStage::AcquireResources;
        let mut chain = vec![stage];
        while let Some(next) = advance(stage) {
            chain.push(next);
            stage = next;
        }
        assert_eq!(
            chain,
            vec![
                SessionStage::AcquireResources,
                SessionStage::PrepareSession,
                SessionStage::Warmup,
                SessionStage::Authenticate,
                SessionStage::Execute,
                SessionStage::Teardown,
            ]
        );
        assert_eq!(advance(SessionStage::Teardown), None);
    }

    #[test]
    fn test_stage_timeouts_mapping() {
        let config = Config::default();
        let timeouts = StageTimeouts::from_config(&config);
        assert_eq!(
            timeouts.for_stage(SessionStage::Execute),
            Duration::from_secs(config.execute_timeout_secs)
        );
        assert_eq!(
            timeouts.for_stage(SessionStage::AcquireResources),
            Duration::from_secs(config.acquire_timeout_secs)
        );
    }
}
