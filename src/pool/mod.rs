//! 资源池 - 核心层
//!
//! 代理池与账号池共用的泛型实现：独占借出、轮换策略、
//! 健康与冷却追踪。

pub mod resource_pool;
pub mod strategy;

pub use resource_pool::{Checkout, Health, PoolConfig, PoolStats, ResourcePool};
pub use strategy::RotationStrategy;
