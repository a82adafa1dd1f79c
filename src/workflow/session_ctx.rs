//! 会话上下文
//!
//! 封装"这次尝试绑定了哪些资源"：任务快照、代理、账号、指纹、
//! 浏览器上下文句柄。随一次任务尝试创建，TEARDOWN 后销毁，
//! 绝不跨尝试存活。

use std::fmt::Display;

use crate::captcha::CaptchaEvent;
use crate::infrastructure::browser::ContextHandle;
use crate::models::task::Task;

/// 会话上下文
#[derive(Debug)]
pub struct SessionContext {
    /// 本次尝试处理的任务快照
    pub task: Task,

    /// 绑定的代理 ID（ACQUIRE_RESOURCES 后填入）
    pub proxy_id: Option<String>,

    /// 绑定的账号 ID（ACQUIRE_RESOURCES 后填入）
    pub account_id: Option<String>,

    /// 指纹档案 ID（PREPARE_SESSION 后填入）
    pub fingerprint_id: Option<String>,

    /// 浏览器上下文句柄，真实资源归浏览器后端所有
    pub handle: Option<ContextHandle>,

    /// 本次尝试遭遇的验证码事件，随会话丢弃
    pub captcha_events: Vec<CaptchaEvent>,

    /// 本次尝试落库的记录数
    pub records_saved: usize,
}

impl SessionContext {
    /// 为一次任务尝试新建上下文
    pub fn new(task: Task) -> Self {
        Self {
            task,
            proxy_id: None,
            account_id: None,
            fingerprint_id: None,
            handle: None,
            captcha_events: Vec::new(),
            records_saved: 0,
        }
    }
}

impl Display for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[任务#{} 代理#{} 账号#{}]",
            self.task.id,
            self.proxy_id.as_deref().unwrap_or("-"),
            self.account_id.as_deref().unwrap_or("-")
        )
    }
}
