//! 浏览器后端能力接口 - 基础设施层
//!
//! 核心只通过这组能力与浏览器交互：建上下文、导航、登录、关闭。
//! 上下文句柄是不透明引用，真实的页面资源由后端独自持有；
//! 核心从不窥探浏览器内部状态，只消费它回报的信号。

use async_trait::async_trait;
use std::fmt;

use crate::captcha::CaptchaSignals;
use crate::error::BrowserError;
use crate::models::fingerprint::FingerprintProfile;
use crate::models::resource::{AccountCredential, ProxyEndpoint};

/// 会话上下文的不透明句柄
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextHandle(String);

impl ContextHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 导航结果
///
/// 携带生成验证码信号所需的素材（最终 URL、状态、文本采样）。
#[derive(Debug, Clone)]
pub struct NavOutcome {
    pub final_url: String,
    pub status: Option<u16>,
    pub page_text_sample: String,
}

impl NavOutcome {
    /// 转成验证码检测信号
    pub fn signals(&self) -> CaptchaSignals {
        CaptchaSignals {
            final_url: self.final_url.clone(),
            status: self.status,
            page_text: self.page_text_sample.clone(),
        }
    }
}

/// 登录结果
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    /// 已登录（或 cookie 会话有效）
    Success,
    /// 凭证被目标站拒绝
    Rejected,
    /// 登录被验证码/拦截页挡住，信号交给验证码处理器
    Challenged(CaptchaSignals),
}

/// 浏览器后端
#[async_trait]
pub trait BrowserBackend: Send + Sync {
    /// 用给定代理和指纹建一个隔离的会话上下文
    async fn create_context(
        &self,
        proxy: &ProxyEndpoint,
        fingerprint: &FingerprintProfile,
    ) -> Result<ContextHandle, BrowserError>;

    /// 导航到目标 URL
    async fn navigate(&self, ctx: &ContextHandle, url: &str) -> Result<NavOutcome, BrowserError>;

    /// 用账号凭证登录目标站
    async fn login(
        &self,
        ctx: &ContextHandle,
        account: &AccountCredential,
        login_url: &str,
    ) -> Result<LoginOutcome, BrowserError>;

    /// 在上下文中执行脚本并返回 JSON 结果（提取器的唯一通道）
    async fn eval(
        &self,
        ctx: &ContextHandle,
        script: String,
    ) -> Result<serde_json::Value, BrowserError>;

    /// 关闭上下文并释放页面资源（TEARDOWN 的唯一入口）
    async fn close(&self, ctx: &ContextHandle) -> Result<(), BrowserError>;
}
