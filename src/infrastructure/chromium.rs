//! chromiumoxide 后端 - 基础设施层
//!
//! 连接到带调试端口的常驻浏览器（不负责拉起浏览器进程），每个会话
//! 上下文对应一个独立页面。代理按约定由浏览器启动参数统一指定，
//! 指纹通过注入脚本逐页覆盖。
//!
//! 本模块是唯一持有 `Page` 的地方，对上只暴露能力接口。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::BrowserError;
use crate::infrastructure::browser::{BrowserBackend, ContextHandle, LoginOutcome, NavOutcome};
use crate::models::fingerprint::FingerprintProfile;
use crate::models::resource::{AccountCredential, ProxyEndpoint};

/// 隐身脚本：抹掉 webdriver 痕迹，伪装 plugins 和 chrome runtime
const STEALTH_SCRIPT: &str = r#"
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined
    });
    Object.defineProperty(navigator, 'plugins', {
        get: () => [1, 2, 3, 4, 5]
    });
    if (!window.chrome) {
        window.chrome = { runtime: {} };
    }
"#;

/// chromiumoxide 实现
pub struct ChromiumBackend {
    browser: Browser,
    pages: Mutex<HashMap<String, Page>>,
    next_id: AtomicU64,
}

impl ChromiumBackend {
    /// 连接到调试端口上的浏览器
    pub async fn connect(port: u16) -> Result<Self, BrowserError> {
        let browser_url = format!("http://localhost:{}", port);
        info!("正在连接到浏览器: {}", browser_url);

        let (browser, mut handler) =
            Browser::connect(&browser_url)
                .await
                .map_err(|e| BrowserError::ConnectionFailed {
                    port,
                    source: Box::new(e),
                })?;
        debug!("浏览器连接成功");

        // 在后台处理浏览器事件
        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser,
            pages: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    async fn page_for(&self, ctx: &ContextHandle) -> Result<Page, BrowserError> {
        let pages = self.pages.lock().await;
        pages
            .get(ctx.as_str())
            .cloned()
            .ok_or_else(|| BrowserError::ContextClosed {
                id: ctx.to_string(),
            })
    }

    /// 采样页面状态，供导航结果和登录判定使用
    async fn sample_page(&self, page: &Page) -> Result<NavOutcome, BrowserError> {
        let js = r#"
            (() => ({
                url: window.location.href,
                text: (document.body ? document.body.innerText : '').slice(0, 4096)
            }))()
        "#;
        let value: serde_json::Value = page
            .evaluate(js)
            .await
            .map_err(|e| BrowserError::ScriptFailed {
                source: Box::new(e),
            })?
            .into_value()
            .map_err(|e| BrowserError::ScriptFailed {
                source: Box::new(e),
            })?;

        Ok(NavOutcome {
            final_url: value["url"].as_str().unwrap_or_default().to_string(),
            status: None,
            page_text_sample: value["text"].as_str().unwrap_or_default().to_string(),
        })
    }

    /// 注入已保存的 cookie 并验证登录态；失败回落到密码登录
    async fn try_cookie_login(
        &self,
        page: &Page,
        cookies_path: &str,
        login_url: &str,
    ) -> Result<bool, BrowserError> {
        let content = match tokio::fs::read_to_string(cookies_path).await {
            Ok(c) => c,
            Err(_) => return Ok(false),
        };
        let cookies = match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(serde_json::Value::Array(c)) => c,
            _ => return Ok(false),
        };

        let mut script = String::new();
        for cookie in &cookies {
            if let (Some(name), Some(value)) = (cookie["name"].as_str(), cookie["value"].as_str()) {
                let pair = serde_json::to_string(&format!("{}={}", name, value))
                    .unwrap_or_default();
                script.push_str(&format!("document.cookie = {};\n", pair));
            }
        }
        if script.is_empty() {
            return Ok(false);
        }

        page.evaluate(script)
            .await
            .map_err(|e| BrowserError::ScriptFailed {
                source: Box::new(e),
            })?;

        // 带着 cookie 重新进入登录页，被重定向走即视为已登录
        page.goto(login_url)
            .await
            .map_err(|e| BrowserError::NavigationFailed {
                url: login_url.to_string(),
                source: Box::new(e),
            })?;
        let sample = self.sample_page(page).await?;
        Ok(!sample.final_url.to_ascii_lowercase().contains("login"))
    }

    /// 把指纹档案写进页面
    async fn apply_fingerprint(
        &self,
        page: &Page,
        fingerprint: &FingerprintProfile,
    ) -> Result<(), BrowserError> {
        let script = format!(
            r#"
            {stealth}
            Object.defineProperty(navigator, 'userAgent', {{
                get: () => {ua}
            }});
            const getParameter = WebGLRenderingContext.prototype.getParameter;
            WebGLRenderingContext.prototype.getParameter = function(parameter) {{
                if (parameter === 37445) {{ return {vendor}; }}
                if (parameter === 37446) {{ return {renderer}; }}
                return getParameter.apply(this, arguments);
            }};
            "#,
            stealth = STEALTH_SCRIPT,
            ua = serde_json::to_string(&fingerprint.user_agent).unwrap_or_default(),
            vendor = serde_json::to_string(&fingerprint.webgl_vendor).unwrap_or_default(),
            renderer = serde_json::to_string(&fingerprint.webgl_renderer).unwrap_or_default(),
        );

        page.evaluate(script)
            .await
            .map_err(|e| BrowserError::ScriptFailed {
                source: Box::new(e),
            })?;
        Ok(())
    }
}

#[async_trait]
impl BrowserBackend for ChromiumBackend {
    async fn create_context(
        &self,
        proxy: &ProxyEndpoint,
        fingerprint: &FingerprintProfile,
    ) -> Result<ContextHandle, BrowserError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::ContextCreationFailed {
                source: Box::new(e),
            })?;

        self.apply_fingerprint(&page, fingerprint).await?;

        let id = format!("ctx-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!("创建会话上下文 {} (代理 {}, 指纹 {})", id, proxy.id, fingerprint.id);
        self.pages.lock().await.insert(id.clone(), page);
        Ok(ContextHandle::new(id))
    }

    async fn navigate(&self, ctx: &ContextHandle, url: &str) -> Result<NavOutcome, BrowserError> {
        let page = self.page_for(ctx).await?;

        page.goto(url)
            .await
            .map_err(|e| BrowserError::NavigationFailed {
                url: url.to_string(),
                source: Box::new(e),
            })?;

        self.sample_page(&page).await
    }

    async fn login(
        &self,
        ctx: &ContextHandle,
        account: &AccountCredential,
        login_url: &str,
    ) -> Result<LoginOutcome, BrowserError> {
        let page = self.page_for(ctx).await?;

        page.goto(login_url)
            .await
            .map_err(|e| BrowserError::NavigationFailed {
                url: login_url.to_string(),
                source: Box::new(e),
            })?;

        // cookie 会话优先：注入成功且登录态有效时跳过密码登录
        if let Some(path) = &account.cookies_path {
            if self.try_cookie_login(&page, path, login_url).await? {
                debug!("账号 {} 通过 cookie 恢复会话", account.id);
                return Ok(LoginOutcome::Success);
            }
        }

        // 填表并提交（选择器沿用目标站的登录页结构）
        let js = format!(
            r#"
            (async () => {{
                const email = document.querySelector('input[id="email"], input[type="email"]');
                const password = document.querySelector('input[id="password"], input[type="password"]');
                const submit = document.querySelector('button[type="submit"]');
                if (!email || !password || !submit) {{
                    return {{ filled: false }};
                }}
                email.value = {username};
                email.dispatchEvent(new Event('input', {{ bubbles: true }}));
                password.value = {password};
                password.dispatchEvent(new Event('input', {{ bubbles: true }}));
                submit.click();
                return {{ filled: true }};
            }})()
            "#,
            username = serde_json::to_string(&account.username).unwrap_or_default(),
            password = serde_json::to_string(&account.password).unwrap_or_default(),
        );

        let filled: serde_json::Value = page
            .evaluate(js)
            .await
            .map_err(|e| BrowserError::ScriptFailed {
                source: Box::new(e),
            })?
            .into_value()
            .map_err(|e| BrowserError::ScriptFailed {
                source: Box::new(e),
            })?;

        if filled["filled"].as_bool() != Some(true) {
            warn!("登录表单不完整，可能已是登录态或被拦截");
        }

        // 等提交后的跳转稳定下来
        tokio::time::sleep(tokio::time::Duration::from_secs(3)).await;
        let sample = self.sample_page(&page).await?;

        let lower_url = sample.final_url.to_ascii_lowercase();
        let lower_text = sample.page_text_sample.to_ascii_lowercase();
        if lower_text.contains("incorrect") || lower_text.contains("密码错误") {
            return Ok(LoginOutcome::Rejected);
        }
        if !lower_url.contains("login") {
            return Ok(LoginOutcome::Success);
        }
        Ok(LoginOutcome::Challenged(sample.signals()))
    }

    async fn eval(
        &self,
        ctx: &ContextHandle,
        script: String,
    ) -> Result<serde_json::Value, BrowserError> {
        let page = self.page_for(ctx).await?;
        page.evaluate(script)
            .await
            .map_err(|e| BrowserError::ScriptFailed {
                source: Box::new(e),
            })?
            .into_value()
            .map_err(|e| BrowserError::ScriptFailed {
                source: Box::new(e),
            })
    }

    async fn close(&self, ctx: &ContextHandle) -> Result<(), BrowserError> {
        let page = {
            let mut pages = self.pages.lock().await;
            pages.remove(ctx.as_str())
        };

        match page {
            Some(page) => {
                if let Err(e) = page.close().await {
                    // 释放尽力而为：句柄已从表中摘除，不再可达
                    warn!("关闭页面 {} 失败: {}", ctx, e);
                }
                debug!("会话上下文 {} 已关闭", ctx);
                Ok(())
            }
            None => Err(BrowserError::ContextClosed {
                id: ctx.to_string(),
            }),
        }
    }
}
