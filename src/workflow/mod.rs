//! 流程层（Workflow Layer）
//!
//! 定义"一次任务尝试"的完整会话生命周期；不持有队列，
//! 出队与确认归编排层。

pub mod session_ctx;
pub mod session_flow;

pub use session_ctx::SessionContext;
pub use session_flow::{advance, SessionFlow, SessionReport, SessionStage, StageTimeouts};
