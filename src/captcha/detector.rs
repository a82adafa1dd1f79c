//! 验证码检测
//!
//! 只消费协作方（浏览器后端）回报的页面信号：最终 URL、HTTP 状态、
//! 页面文本采样。核心不直接窥探浏览器内部状态。

use regex::Regex;

/// 验证码类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptchaKind {
    /// Google reCAPTCHA 挂件
    Recaptcha,
    /// hCaptcha 挂件
    Hcaptcha,
    /// 滑块拼图类
    Slider,
    /// 反爬拦截页（access denied / unusual traffic 一类）
    AccessChallenge,
}

impl CaptchaKind {
    pub fn label(self) -> &'static str {
        match self {
            CaptchaKind::Recaptcha => "recaptcha",
            CaptchaKind::Hcaptcha => "hcaptcha",
            CaptchaKind::Slider => "slider",
            CaptchaKind::AccessChallenge => "access_challenge",
        }
    }
}

impl std::fmt::Display for CaptchaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// 协作方回报的页面信号
#[derive(Debug, Clone, Default)]
pub struct CaptchaSignals {
    pub final_url: String,
    pub status: Option<u16>,
    /// 页面文本采样（前若干 KB 即可）
    pub page_text: String,
}

/// 基于标记规则的检测器
pub struct CaptchaDetector {
    url_rules: Vec<(Regex, CaptchaKind)>,
    text_rules: Vec<(Regex, CaptchaKind)>,
}

impl CaptchaDetector {
    pub fn new() -> Self {
        let url_rules = vec![
            (
                Regex::new(r"(?i)/checkpoint/|/challenge/|/captcha").unwrap(),
                CaptchaKind::AccessChallenge,
            ),
            (
                Regex::new(r"(?i)recaptcha").unwrap(),
                CaptchaKind::Recaptcha,
            ),
        ];
        let text_rules = vec![
            (
                Regex::new(r"(?i)g-recaptcha|www\.google\.com/recaptcha").unwrap(),
                CaptchaKind::Recaptcha,
            ),
            (Regex::new(r"(?i)hcaptcha").unwrap(), CaptchaKind::Hcaptcha),
            (
                Regex::new(r"(?i)drag the slider|滑动验证|slide to verify").unwrap(),
                CaptchaKind::Slider,
            ),
            (
                Regex::new(r"(?i)unusual traffic|access denied|verify you are a human")
                    .unwrap(),
                CaptchaKind::AccessChallenge,
            ),
        ];
        Self {
            url_rules,
            text_rules,
        }
    }

    /// 检查信号，命中则返回验证码类型
    ///
    /// 优先级：URL 标记 > 页面文本标记 > 可疑状态码（403/429 且
    /// 正文为拦截文案）。
    pub fn detect(&self, signals: &CaptchaSignals) -> Option<CaptchaKind> {
        for (re, kind) in &self.url_rules {
            if re.is_match(&signals.final_url) {
                return Some(*kind);
            }
        }
        for (re, kind) in &self.text_rules {
            if re.is_match(&signals.page_text) {
                return Some(*kind);
            }
        }
        if matches!(signals.status, Some(403) | Some(429)) {
            return Some(CaptchaKind::AccessChallenge);
        }
        None
    }
}

impl Default for CaptchaDetector {
    fn default() -> Self {
        Self::new()
    }
}
