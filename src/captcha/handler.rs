//! 验证码处理状态机
//!
//! `NONE → DETECTED → SOLVING → {SOLVED | SOLVE_FAILED}`
//!
//! 转移函数是纯函数，副作用（调用打码服务）由 [`CaptchaHandler::handle`]
//! 驱动，二者分离，转移逻辑无需真实服务即可测试。
//! 解决策略在构造时一次性选定。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::captcha::detector::CaptchaKind;
use crate::error::SolverError;

/// 解决策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptchaStrategy {
    /// 交给外部打码服务，带有限次数重试
    AutoSolve,
    /// 单次长等待（背后可以是人工坐席）
    Manual,
    /// 不处理，直接按解决失败处理
    Skip,
}

impl CaptchaStrategy {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "auto_solve" | "auto" => CaptchaStrategy::AutoSolve,
            "manual" => CaptchaStrategy::Manual,
            _ => CaptchaStrategy::Skip,
        }
    }
}

/// 处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptchaOutcome {
    Solved,
    Failed,
    Skipped,
}

impl CaptchaOutcome {
    /// 编排层视角：除 Solved 外都是 SOLVE_FAILED
    pub fn is_solved(self) -> bool {
        matches!(self, CaptchaOutcome::Solved)
    }
}

/// 状态机状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptchaState {
    None,
    Detected(CaptchaKind),
    Solving { kind: CaptchaKind, attempt: u32 },
    Solved,
    SolveFailed,
}

/// 状态机输入
#[derive(Debug, Clone, Copy)]
pub enum CaptchaInput {
    Detect(CaptchaKind),
    BeginSolve,
    AttemptFailed { attempts_left: u32 },
    AttemptSucceeded,
    Abandon,
}

/// 纯转移函数
///
/// 非法输入保持原状态不动（终态上的输入同理）。
pub fn next_state(state: CaptchaState, input: CaptchaInput) -> CaptchaState {
    match (state, input) {
        (CaptchaState::None, CaptchaInput::Detect(kind)) => CaptchaState::Detected(kind),
        (CaptchaState::Detected(kind), CaptchaInput::BeginSolve) => {
            CaptchaState::Solving { kind, attempt: 1 }
        }
        (CaptchaState::Detected(_), CaptchaInput::Abandon) => CaptchaState::SolveFailed,
        (CaptchaState::Solving { .. }, CaptchaInput::AttemptSucceeded) => CaptchaState::Solved,
        (CaptchaState::Solving { kind, attempt }, CaptchaInput::AttemptFailed { attempts_left }) => {
            if attempts_left == 0 {
                CaptchaState::SolveFailed
            } else {
                CaptchaState::Solving {
                    kind,
                    attempt: attempt + 1,
                }
            }
        }
        (CaptchaState::Solving { .. }, CaptchaInput::Abandon) => CaptchaState::SolveFailed,
        (other, _) => other,
    }
}

/// 一次验证码遭遇的记录，随会话销毁
#[derive(Debug, Clone)]
pub struct CaptchaEvent {
    pub detected_at: DateTime<Utc>,
    pub kind: CaptchaKind,
    pub strategy: CaptchaStrategy,
    pub outcome: CaptchaOutcome,
    /// 打码服务返回的令牌（若有）
    pub token: Option<String>,
}

/// 打码服务返回的解
#[derive(Debug, Clone)]
pub struct CaptchaSolution {
    pub token: String,
}

/// 外部打码服务的能力接口
#[async_trait]
pub trait CaptchaSolverProvider: Send + Sync {
    async fn solve(
        &self,
        kind: CaptchaKind,
        page_url: &str,
    ) -> Result<CaptchaSolution, SolverError>;
}

/// 验证码处理器
pub struct CaptchaHandler {
    strategy: CaptchaStrategy,
    solver: Arc<dyn CaptchaSolverProvider>,
    /// AutoSolve 策略下对服务商的最大尝试次数
    max_solve_attempts: u32,
    /// Manual 策略的单次等待上限
    manual_deadline: Duration,
}

impl CaptchaHandler {
    pub fn new(
        strategy: CaptchaStrategy,
        solver: Arc<dyn CaptchaSolverProvider>,
        max_solve_attempts: u32,
        manual_deadline: Duration,
    ) -> Self {
        Self {
            strategy,
            solver,
            max_solve_attempts: max_solve_attempts.max(1),
            manual_deadline,
        }
    }

    /// 对已检测到的验证码应用既定策略，返回事件记录
    pub async fn handle(&self, kind: CaptchaKind, page_url: &str) -> CaptchaEvent {
        let detected_at = Utc::now();
        let mut state = next_state(CaptchaState::None, CaptchaInput::Detect(kind));
        info!("🧩 检测到验证码: {} ({})", kind, page_url);

        let (outcome, token) = match self.strategy {
            CaptchaStrategy::Skip => {
                state = next_state(state, CaptchaInput::Abandon);
                debug!("策略为 skip, 不尝试解决");
                (CaptchaOutcome::Skipped, None)
            }
            CaptchaStrategy::AutoSolve => {
                state = next_state(state, CaptchaInput::BeginSolve);
                let mut token = None;
                for attempt in 1..=self.max_solve_attempts {
                    match self.solver.solve(kind, page_url).await {
                        Ok(solution) => {
                            state = next_state(state, CaptchaInput::AttemptSucceeded);
                            token = Some(solution.token);
                            break;
                        }
                        Err(e) => {
                            let attempts_left = self.max_solve_attempts - attempt;
                            warn!(
                                "打码尝试 {}/{} 失败: {}",
                                attempt, self.max_solve_attempts, e
                            );
                            state = next_state(state, CaptchaInput::AttemptFailed { attempts_left });
                        }
                    }
                }
                match state {
                    CaptchaState::Solved => (CaptchaOutcome::Solved, token),
                    _ => (CaptchaOutcome::Failed, None),
                }
            }
            CaptchaStrategy::Manual => {
                state = next_state(state, CaptchaInput::BeginSolve);
                let result =
                    tokio::time::timeout(self.manual_deadline, self.solver.solve(kind, page_url))
                        .await;
                match result {
                    Ok(Ok(solution)) => {
                        state = next_state(state, CaptchaInput::AttemptSucceeded);
                        (CaptchaOutcome::Solved, Some(solution.token))
                    }
                    Ok(Err(e)) => {
                        warn!("人工处理失败: {}", e);
                        state = next_state(state, CaptchaInput::Abandon);
                        (CaptchaOutcome::Failed, None)
                    }
                    Err(_) => {
                        warn!("人工处理超时 ({:?})", self.manual_deadline);
                        state = next_state(state, CaptchaInput::Abandon);
                        (CaptchaOutcome::Failed, None)
                    }
                }
            }
        };

        debug_assert!(matches!(
            state,
            CaptchaState::Solved | CaptchaState::SolveFailed
        ));
        if outcome.is_solved() {
            info!("✓ 验证码已解决 ({})", kind);
        }

        CaptchaEvent {
            detected_at,
            kind,
            strategy: self.strategy,
            outcome,
            token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedSolver {
        fail_first: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl CaptchaSolverProvider for FixedSolver {
        async fn solve(
            &self,
            _kind: CaptchaKind,
            _page_url: &str,
        ) -> Result<CaptchaSolution, SolverError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(SolverError::Rejected {
                    message: "no slots".to_string(),
                })
            } else {
                Ok(CaptchaSolution {
                    token: "tok-123".to_string(),
                })
            }
        }
    }

    #[test]
    fn test_transitions_follow_fixed_graph() {
        let s = next_state(CaptchaState::None, CaptchaInput::Detect(CaptchaKind::Recaptcha));
        assert_eq!(s, CaptchaState::Detected(CaptchaKind::Recaptcha));

        let s = next_state(s, CaptchaInput::BeginSolve);
        assert_eq!(
            s,
            CaptchaState::Solving {
                kind: CaptchaKind::Recaptcha,
                attempt: 1
            }
        );

        let s2 = next_state(s, CaptchaInput::AttemptFailed { attempts_left: 1 });
        assert_eq!(
            s2,
            CaptchaState::Solving {
                kind: CaptchaKind::Recaptcha,
                attempt: 2
            }
        );

        let done = next_state(s2, CaptchaInput::AttemptSucceeded);
        assert_eq!(done, CaptchaState::Solved);

        let failed = next_state(s2, CaptchaInput::AttemptFailed { attempts_left: 0 });
        assert_eq!(failed, CaptchaState::SolveFailed);
    }

    #[test]
    fn test_terminal_states_ignore_inputs() {
        let s = next_state(CaptchaState::Solved, CaptchaInput::BeginSolve);
        assert_eq!(s, CaptchaState::Solved);
        let s = next_state(CaptchaState::SolveFailed, CaptchaInput::AttemptSucceeded);
        assert_eq!(s, CaptchaState::SolveFailed);
    }

    #[tokio::test]
    async fn test_auto_solve_retries_then_succeeds() {
        let solver = Arc::new(FixedSolver {
            fail_first: 2,
            calls: AtomicU32::new(0),
        });
        let handler = CaptchaHandler::new(
            CaptchaStrategy::AutoSolve,
            solver.clone(),
            3,
            Duration::from_secs(1),
        );

        let event = handler
            .handle(CaptchaKind::Recaptcha, "https://www.pinterest.com/login/")
            .await;
        assert_eq!(event.outcome, CaptchaOutcome::Solved);
        assert_eq!(event.token.as_deref(), Some("tok-123"));
        assert_eq!(solver.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_auto_solve_exhausts_attempts() {
        let solver = Arc::new(FixedSolver {
            fail_first: 10,
            calls: AtomicU32::new(0),
        });
        let handler = CaptchaHandler::new(
            CaptchaStrategy::AutoSolve,
            solver.clone(),
            2,
            Duration::from_secs(1),
        );

        let event = handler
            .handle(CaptchaKind::Slider, "https://www.pinterest.com/login/")
            .await;
        assert_eq!(event.outcome, CaptchaOutcome::Failed);
        assert!(event.token.is_none());
        // 重试受上限约束
        assert_eq!(solver.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_skip_never_calls_solver() {
        let solver = Arc::new(FixedSolver {
            fail_first: 0,
            calls: AtomicU32::new(0),
        });
        let handler = CaptchaHandler::new(
            CaptchaStrategy::Skip,
            solver.clone(),
            3,
            Duration::from_secs(1),
        );

        let event = handler
            .handle(CaptchaKind::Hcaptcha, "https://www.pinterest.com/")
            .await;
        assert_eq!(event.outcome, CaptchaOutcome::Skipped);
        assert!(!event.outcome.is_solved());
        assert_eq!(solver.calls.load(Ordering::SeqCst), 0);
    }
}
