//! 共享库
//!
//! 包含展示条件服务共用的配置加载、日志追踪与指标等基础设施代码。

pub mod config;
pub mod observability;
