// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::utils::errors::EngineError;
use crate::utils::retry_policy::{BackoffStrategy, RetryPolicy};

/// 执行后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorType {
    /// 同步任务在阻塞线程池中运行
    #[default]
    Thread,
    /// 同步任务在独立的操作系统线程中运行，适合 CPU 密集型工作
    Process,
    /// 异步任务在专用的运行时线程上运行
    Async,
}

impl fmt::Display for ProcessorType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProcessorType::Thread => write!(f, "thread"),
            ProcessorType::Process => write!(f, "process"),
            ProcessorType::Async => write!(f, "async"),
        }
    }
}

/// 资源限制
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// 系统已用内存上限（MB）
    pub memory_limit_mb: u64,
    /// CPU 使用率上限（百分比）
    pub cpu_limit_percent: f32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_limit_mb: 8192,
            cpu_limit_percent: 80.0,
        }
    }
}

/// 并行处理器配置
///
/// 构造后不可变，由单个 `ParallelProcessor` 独占。
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorConfig {
    /// 工作器数量
    pub max_workers: usize,
    pub processor_type: ProcessorType,
    /// 单次尝试超时
    pub timeout: Duration,
    /// 最大重试次数
    pub retry_count: u32,
    /// 退避的基础延迟
    pub retry_delay: Duration,
    /// 退避策略，默认线性
    pub retry_strategy: BackoffStrategy,
    /// 退避抖动因子 (0.0-1.0)，默认不加抖动
    pub retry_jitter: f64,
    /// 入队前是否进行软资源检查
    pub enable_load_balancing: bool,
    pub resource_limits: ResourceLimits,
    /// 工作器出队等待时间，也是关闭检查的周期
    pub poll_interval: Duration,
    /// 资源不足时入队前的等待时间
    pub throttle_delay: Duration,
    /// 资源采样周期
    pub monitor_interval: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            processor_type: ProcessorType::Thread,
            timeout: Duration::from_secs(300),
            retry_count: 3,
            retry_delay: Duration::from_secs(1),
            retry_strategy: BackoffStrategy::Linear,
            retry_jitter: 0.0,
            enable_load_balancing: true,
            resource_limits: ResourceLimits::default(),
            poll_interval: Duration::from_secs(1),
            throttle_delay: Duration::from_secs(1),
            monitor_interval: Duration::from_secs(5),
        }
    }
}

impl ProcessorConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_workers == 0 {
            return Err(EngineError::InvalidConfig(
                "max_workers must be greater than 0".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(EngineError::InvalidConfig(
                "timeout must be greater than 0".to_string(),
            ));
        }
        if self.poll_interval.is_zero() || self.monitor_interval.is_zero() {
            return Err(EngineError::InvalidConfig(
                "poll_interval and monitor_interval must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retry_jitter) {
            return Err(EngineError::InvalidConfig(
                "retry_jitter must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(self.resource_limits.cpu_limit_percent > 0.0) {
            return Err(EngineError::InvalidConfig(
                "cpu_limit_percent must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// 由配置派生的重试策略
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_count, self.retry_delay, self.retry_strategy)
            .with_jitter(self.retry_jitter)
    }
}
