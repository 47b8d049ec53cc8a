// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use std::time::Duration;
use taskforge::infrastructure::observability::resource_monitor::{ResourceProbe, ResourceSample};
use taskforge::{ParallelProcessor, ProcessorConfig};

/// 测试用配置：较短的轮询间隔和重试延迟，关闭资源限流
pub fn fast_config(max_workers: usize) -> ProcessorConfig {
    ProcessorConfig {
        max_workers,
        timeout: Duration::from_secs(5),
        retry_count: 0,
        retry_delay: Duration::from_millis(20),
        enable_load_balancing: false,
        poll_interval: Duration::from_millis(50),
        throttle_delay: Duration::from_millis(300),
        monitor_interval: Duration::from_millis(100),
        ..Default::default()
    }
}

/// 返回固定采样值的资源采样器
pub struct FixedProbe(pub Option<ResourceSample>);

impl FixedProbe {
    pub fn idle() -> Arc<Self> {
        Arc::new(Self(Some(ResourceSample {
            cpu_percent: 1.0,
            memory_used_mb: 16,
            memory_percent: 1.0,
        })))
    }

    pub fn busy() -> Arc<Self> {
        Arc::new(Self(Some(ResourceSample {
            cpu_percent: 99.0,
            memory_used_mb: 16,
            memory_percent: 1.0,
        })))
    }
}

impl ResourceProbe for FixedProbe {
    fn sample(&self) -> Option<ResourceSample> {
        self.0
    }
}

/// 使用空闲采样器创建处理器，避免测试结果依赖宿主机负载
pub fn processor(config: ProcessorConfig) -> ParallelProcessor {
    taskforge::utils::telemetry::init_telemetry(Some("warn"), false);
    ParallelProcessor::with_probe(config, FixedProbe::idle()).unwrap()
}
