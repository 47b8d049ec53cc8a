// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use config::builder::DefaultState;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::config::processor_config::{ProcessorConfig, ProcessorType, ResourceLimits};
use crate::utils::retry_policy::BackoffStrategy;

/// 应用程序配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 处理器配置
    pub processor: ProcessorSettings,
    /// 负载均衡配置
    pub load_balancer: LoadBalancerSettings,
    /// 日志配置
    pub telemetry: TelemetrySettings,
}

/// 处理器配置设置，时间均以秒为单位
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorSettings {
    pub max_workers: usize,
    pub processor_type: ProcessorType,
    pub timeout_secs: f64,
    pub retry_count: u32,
    pub retry_delay_secs: f64,
    pub retry_strategy: BackoffStrategy,
    pub retry_jitter: f64,
    pub enable_load_balancing: bool,
    pub memory_limit_mb: u64,
    pub cpu_limit_percent: f32,
    pub poll_interval_secs: f64,
    pub throttle_delay_secs: f64,
    pub monitor_interval_secs: f64,
}

/// 负载均衡配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct LoadBalancerSettings {
    /// 处理器实例数量
    pub instances: usize,
}

/// 日志配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    /// 默认过滤规则（`RUST_LOG` 优先）
    pub filter: String,
    /// 是否输出 JSON 格式
    pub json: bool,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次叠加默认值、`config/default`、`config/{APP_ENVIRONMENT}` 和
    /// `TASKFORGE__` 前缀的环境变量。
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("TASKFORGE").separator("__"));

        builder.build()?.try_deserialize()
    }

    /// 从指定文件加载配置，缺省项使用默认值
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let builder = Self::defaults()?.add_source(File::from(path.as_ref()));
        builder.build()?.try_deserialize()
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let defaults = ProcessorConfig::default();
        Config::builder()
            .set_default("processor.max_workers", defaults.max_workers as u64)?
            .set_default("processor.processor_type", defaults.processor_type.to_string())?
            .set_default("processor.timeout_secs", defaults.timeout.as_secs_f64())?
            .set_default("processor.retry_count", defaults.retry_count)?
            .set_default("processor.retry_delay_secs", defaults.retry_delay.as_secs_f64())?
            .set_default("processor.retry_strategy", defaults.retry_strategy.to_string())?
            .set_default("processor.retry_jitter", defaults.retry_jitter)?
            .set_default("processor.enable_load_balancing", defaults.enable_load_balancing)?
            .set_default(
                "processor.memory_limit_mb",
                defaults.resource_limits.memory_limit_mb,
            )?
            .set_default(
                "processor.cpu_limit_percent",
                defaults.resource_limits.cpu_limit_percent as f64,
            )?
            .set_default("processor.poll_interval_secs", defaults.poll_interval.as_secs_f64())?
            .set_default(
                "processor.throttle_delay_secs",
                defaults.throttle_delay.as_secs_f64(),
            )?
            .set_default(
                "processor.monitor_interval_secs",
                defaults.monitor_interval.as_secs_f64(),
            )?
            .set_default("load_balancer.instances", 1)?
            .set_default("telemetry.filter", crate::utils::telemetry::DEFAULT_FILTER)?
            .set_default("telemetry.json", false)
    }

    /// 转换为处理器配置
    pub fn processor_config(&self) -> Result<ProcessorConfig, ConfigError> {
        let p = &self.processor;
        Ok(ProcessorConfig {
            max_workers: p.max_workers,
            processor_type: p.processor_type,
            timeout: secs("processor.timeout_secs", p.timeout_secs)?,
            retry_count: p.retry_count,
            retry_delay: secs("processor.retry_delay_secs", p.retry_delay_secs)?,
            retry_strategy: p.retry_strategy,
            retry_jitter: p.retry_jitter,
            enable_load_balancing: p.enable_load_balancing,
            resource_limits: ResourceLimits {
                memory_limit_mb: p.memory_limit_mb,
                cpu_limit_percent: p.cpu_limit_percent,
            },
            poll_interval: secs("processor.poll_interval_secs", p.poll_interval_secs)?,
            throttle_delay: secs("processor.throttle_delay_secs", p.throttle_delay_secs)?,
            monitor_interval: secs("processor.monitor_interval_secs", p.monitor_interval_secs)?,
        })
    }
}

fn secs(key: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| ConfigError::Message(format!("{}: {}", key, e)))
}
