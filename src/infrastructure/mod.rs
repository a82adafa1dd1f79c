//! 基础设施层
//!
//! 持有稀缺资源（浏览器页面），只暴露能力；不认识任务与流程。

pub mod browser;
pub mod chromium;

pub use browser::{BrowserBackend, ContextHandle, LoginOutcome, NavOutcome};
pub use chromium::ChromiumBackend;
