//! 共享库
//!
//! 包含规则代理及其宿主进程共用的配置加载与可观测性初始化。

pub mod config;
pub mod observability;
