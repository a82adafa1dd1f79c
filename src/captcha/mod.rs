//! 验证码处理 - 核心层
//!
//! 检测（信号 → 类型）与处理（策略 → 结果）分离；
//! 状态转移是纯函数。

pub mod detector;
pub mod handler;

pub use detector::{CaptchaDetector, CaptchaKind, CaptchaSignals};
pub use handler::{
    next_state, CaptchaEvent, CaptchaHandler, CaptchaInput, CaptchaOutcome, CaptchaSolution,
    CaptchaSolverProvider, CaptchaState, CaptchaStrategy,
};
