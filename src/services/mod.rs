//! 业务能力层
//!
//! 描述"我能做什么"：行为模拟、页面提取、记录存储、打码客户端、
//! 失败日志。每个服务只处理单个对象，不编排流程。

pub mod behavior;
pub mod extractor;
pub mod failure_log;
pub mod repository;
pub mod solver;

pub use behavior::{HumanBehavior, WarmupPlan};
pub use extractor::{Extractor, PageExtractor};
pub use failure_log::FailureLogWriter;
pub use repository::{MemoryRepository, Repository};
pub use solver::HttpSolver;
