//! 错误类型定义
//!
//! 按组件划分错误域：队列、资源池、浏览器、打码服务、提取。
//! `CrawlError` 是会话级失败分类，编排层据此决定任务的重试路线，
//! 组件内部错误永远不会终止 worker 循环。

use std::fmt;

use thiserror::Error;

/// 任务队列错误
#[derive(Debug, Error)]
pub enum QueueError {
    /// 已存在同 ID 的活跃（非终态）任务
    #[error("任务重复: 已存在活跃任务 {id}")]
    DuplicateTask { id: String },
    /// 任务不存在
    #[error("任务不存在: {id}")]
    UnknownTask { id: String },
}

/// 资源池错误
#[derive(Debug, Error)]
pub enum PoolError {
    /// 没有任何符合条件的资源（健康、冷却结束、未被占用）
    #[error(
        "资源池耗尽 ({pool}): 总数 {total}, 可用 {available}, 冷却中 {cooling}, 占用中 {checked_out}"
    )]
    Exhausted {
        pool: &'static str,
        total: usize,
        available: usize,
        cooling: usize,
        checked_out: usize,
    },
    /// 资源 ID 不在池内
    #[error("未知资源 ({pool}): {id}")]
    UnknownItem { pool: &'static str, id: String },
}

/// 浏览器后端错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 连接浏览器失败
    #[error("无法连接到浏览器 (端口: {port}): {source}")]
    ConnectionFailed {
        port: u16,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 创建会话上下文失败
    #[error("创建会话上下文失败: {source}")]
    ContextCreationFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 导航失败
    #[error("导航到 {url} 失败: {source}")]
    NavigationFailed {
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 执行脚本失败
    #[error("执行脚本失败: {source}")]
    ScriptFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 上下文句柄已失效
    #[error("会话上下文已关闭: {id}")]
    ContextClosed { id: String },
}

/// 打码服务错误
#[derive(Debug, Error)]
pub enum SolverError {
    /// 请求打码服务失败
    #[error("打码请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 服务端返回拒绝
    #[error("打码服务拒绝: {message}")]
    Rejected { message: String },
    /// 等待解答超时
    #[error("打码等待超时")]
    Timeout,
}

/// 提取错误
#[derive(Debug, Error)]
pub enum ExtractError {
    /// 页面结构与预期不符
    #[error("页面结构不符合预期: {reason}")]
    StructureMismatch { reason: String },
    /// 记录内容解析失败
    #[error("记录解析失败: {source}")]
    ParseFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// 会话级失败分类
///
/// 每次任务尝试以 `Ok(())` 或一个 `CrawlError` 结束，
/// 编排层按 [`CrawlError::class`] 把它翻译成队列的重试指令。
#[derive(Debug, Error)]
pub enum CrawlError {
    /// 网络/浏览器层面的瞬时错误，按常规退避重试
    #[error("瞬时错误: {reason}")]
    Transient { reason: String },
    /// 代理或账号池耗尽，按加长延迟重试
    #[error("资源不足: {reason}")]
    ResourceExhausted { reason: String },
    /// 验证码未能解决（首次重试，连续两次则永久失败）
    #[error("验证码无法解决 ({kind})")]
    CaptchaUnsolvable { kind: String },
    /// 账号凭证被目标站拒绝，换账号重试
    #[error("账号认证失败: {account_id}")]
    Authentication { account_id: String },
    /// 无法通过重试解决的错误，直接终态
    #[error("永久错误: {reason}")]
    Permanent { reason: String },
    /// 某个生命周期阶段超时
    #[error("{stage} 阶段超时 ({}ms)", .timeout.as_millis())]
    StageTimeout {
        stage: &'static str,
        timeout: std::time::Duration,
    },
    /// 会话在进行中被关停信号打断
    #[error("会话被取消")]
    Cancelled,
}

/// 重试归类：编排层只关心"要不要重试、延迟是否加长"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// 可重试；`elevated` 表示使用加长延迟（资源池被打满时）
    Retriable { elevated: bool },
    /// 不可重试
    Permanent,
}

impl CrawlError {
    /// 失败归类
    ///
    /// 验证码失败在这里归为可重试，"连续两次即永久"的升级
    /// 由编排层根据任务上一次的失败标记决定。
    pub fn class(&self) -> FailureClass {
        match self {
            CrawlError::Transient { .. }
            | CrawlError::CaptchaUnsolvable { .. }
            | CrawlError::Authentication { .. }
            | CrawlError::StageTimeout { .. }
            | CrawlError::Cancelled => FailureClass::Retriable { elevated: false },
            CrawlError::ResourceExhausted { .. } => FailureClass::Retriable { elevated: true },
            CrawlError::Permanent { .. } => FailureClass::Permanent,
        }
    }

    /// 是否是验证码失败（用于"连续两次即永久"判定）
    pub fn is_captcha(&self) -> bool {
        matches!(self, CrawlError::CaptchaUnsolvable { .. })
    }
}

impl From<BrowserError> for CrawlError {
    fn from(err: BrowserError) -> Self {
        CrawlError::Transient {
            reason: err.to_string(),
        }
    }
}

impl From<ExtractError> for CrawlError {
    fn from(err: ExtractError) -> Self {
        // 结构性提取失败同样走任务级重试，受全局重试上限约束
        CrawlError::Transient {
            reason: format!("提取失败: {}", err),
        }
    }
}

impl From<PoolError> for CrawlError {
    fn from(err: PoolError) -> Self {
        CrawlError::ResourceExhausted {
            reason: err.to_string(),
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureClass::Retriable { elevated: false } => write!(f, "retriable"),
            FailureClass::Retriable { elevated: true } => write!(f, "retriable(elevated)"),
            FailureClass::Permanent => write!(f, "permanent"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_class_mapping() {
        let transient = CrawlError::Transient {
            reason: "连接被重置".to_string(),
        };
        assert_eq!(
            transient.class(),
            FailureClass::Retriable { elevated: false }
        );

        let exhausted = CrawlError::ResourceExhausted {
            reason: "无可用代理".to_string(),
        };
        assert_eq!(exhausted.class(), FailureClass::Retriable { elevated: true });

        let permanent = CrawlError::Permanent {
            reason: "任务 URL 非法".to_string(),
        };
        assert_eq!(permanent.class(), FailureClass::Permanent);
    }

    #[test]
    fn test_captcha_marker() {
        let captcha = CrawlError::CaptchaUnsolvable {
            kind: "recaptcha".to_string(),
        };
        assert!(captcha.is_captcha());
        assert_eq!(captcha.class(), FailureClass::Retriable { elevated: false });

        let auth = CrawlError::Authentication {
            account_id: "acct-1".to_string(),
        };
        assert!(!auth.is_captcha());
    }

    #[test]
    fn test_pool_error_converts_to_elevated_retry() {
        let err: CrawlError = PoolError::Exhausted {
            pool: "proxy",
            total: 2,
            available: 0,
            cooling: 2,
            checked_out: 0,
        }
        .into();
        assert_eq!(err.class(), FailureClass::Retriable { elevated: true });
    }
}
