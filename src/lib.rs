// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 单进程任务调度与执行引擎
//!
//! 优先级队列、工作器池、超时与线性退避重试、基于资源的软准入控制，
//! 以及多实例之间的轮询负载均衡。

/// 配置模块
///
/// 处理器配置以及从文件和环境变量加载配置
pub mod config;

/// 领域模块
///
/// 包含任务、处理器和任务结果
pub mod domain;

/// 基础设施模块
///
/// 提供指标和资源监控
pub mod infrastructure;

/// 处理器模块
///
/// 并行处理器和负载均衡器
pub mod processor;

/// 队列模块
///
/// 实现优先级任务队列和结果存储
pub mod queue;

/// 工具模块
///
/// 提供错误类型、重试策略和遥测初始化
pub mod utils;

/// 工作器模块
///
/// 实现执行后端和工作器管理
pub mod workers;

pub use config::{ProcessorConfig, ProcessorType, ResourceLimits, Settings};
pub use domain::models::task::{Priority, Processor, Task, TaskContext, TaskStatus};
pub use domain::models::task_result::{TaskError, TaskResult};
pub use processor::{LoadBalancer, OverallStats, ParallelProcessor, ProcessorStats};
pub use utils::errors::EngineError;
