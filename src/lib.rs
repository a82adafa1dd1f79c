//! # Batch Crawler
//!
//! 通过自动化浏览器会话抓取站点并持久化记录的编排引擎
//!
//! ## 架构设计
//!
//! 核心是四个并发组件加一层会话编排：
//!
//! ### ① 核心层（Core）
//! - `queue/` - 优先级 + 租约语义的任务队列，至少一次投递
//! - `pool/` - 泛型资源池（代理、账号），独占借出 + 健康冷却
//! - `limiter/` - 按作用域的令牌桶限速器，FIFO 公平
//! - `captcha/` - 验证码检测与解决状态机
//!
//! ### ② 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（浏览器页面），只暴露能力
//! - `BrowserBackend` - 建上下文 / 导航 / 登录 / 执行脚本 / 关闭
//!
//! ### ③ 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个对象
//! - `Extractor` - 页面记录提取能力
//! - `Repository` - 幂等落库能力
//! - `HttpSolver` - 打码服务客户端
//! - `HumanBehavior` - 预热行为模拟
//! - `FailureLogWriter` - 死信落盘能力
//!
//! ### ④ 流程层（Workflow）
//! - `workflow/` - 定义"一次任务尝试"的完整会话生命周期
//! - `SessionContext` - 资源绑定上下文（任务 + 代理 + 账号 + 指纹）
//! - `SessionFlow` - 状态链编排（acquire → prepare → warmup → auth →
//!   execute → teardown），TEARDOWN 无条件执行
//!
//! ### ⑤ 编排层（Orchestration）
//! - `orchestrator/` - 引擎装配、固定规模 worker 编队、关停与统计
//!
//! ## 模块结构

pub mod captcha;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod limiter;
pub mod models;
pub mod orchestrator;
pub mod pool;
pub mod queue;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use captcha::{CaptchaDetector, CaptchaHandler, CaptchaKind, CaptchaStrategy};
pub use config::Config;
pub use error::{CrawlError, FailureClass, PoolError, QueueError};
pub use infrastructure::{BrowserBackend, ChromiumBackend, ContextHandle};
pub use limiter::RateLimiter;
pub use models::{NewTask, Priority, Task, TaskId, TaskKind, TaskStatus};
pub use orchestrator::{Engine, StatsSnapshot};
pub use pool::{PoolConfig, ResourcePool, RotationStrategy};
pub use queue::{QueueConfig, TaskQueue};
pub use workflow::{SessionContext, SessionFlow};
