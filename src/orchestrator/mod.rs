//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层是整个系统的"指挥中心"：装配核心组件、运行 worker 编队、
//! 处理关停、汇总统计。
//!
//! ## 层次关系
//!
//! ```text
//! orchestrator::Engine (worker 编队 + 队列/池/限速器的唯一拥有者)
//!     ↓
//! workflow::SessionFlow (单次任务尝试的生命周期)
//!     ↓
//! services (能力层：提取 / 存储 / 打码 / 行为 / 失败日志)
//!     ↓
//! infrastructure (基础设施：浏览器后端)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：Engine 管编队与装配，worker 管循环，flow 管会话
//! 2. **资源隔离**：队列与两个池只被 Engine 持有，按引用传给 worker
//! 3. **失败即数据**：组件失败翻译为任务结果，worker 循环不死

pub mod engine;
pub mod stats;
mod worker;

pub use engine::Engine;
pub use stats::{EngineStats, StatsSnapshot};
