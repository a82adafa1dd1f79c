//! 任务队列 - 核心层
//!
//! 优先级排序、租约语义、至少一次投递的任务分发，
//! 以及与之配套的纯函数退避策略。

pub mod retry;
pub mod task_queue;

pub use retry::{elevated_retry_delay, retry_delay};
pub use task_queue::{QueueConfig, QueueStats, TaskQueue};
