// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::gauge;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::processor_config::ResourceLimits;
use crate::infrastructure::observability::metrics::update_system_metrics;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// 一次资源采样
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResourceSample {
    /// CPU 使用率（百分比）
    pub cpu_percent: f32,
    /// 已用内存（MB）
    pub memory_used_mb: u64,
    /// 内存使用率（百分比）
    pub memory_percent: f32,
}

/// 资源采样器
///
/// 无法获取系统指标时返回 `None`。
pub trait ResourceProbe: Send + Sync {
    fn sample(&self) -> Option<ResourceSample>;
}

/// 基于 sysinfo 的资源采样器
pub struct SysinfoProbe {
    system: Mutex<System>,
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );
        Self {
            system: Mutex::new(sys),
        }
    }
}

impl ResourceProbe for SysinfoProbe {
    fn sample(&self) -> Option<ResourceSample> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return None;
        }

        let mut sys = self.system.lock();
        sys.refresh_cpu_all();
        sys.refresh_memory();

        let total_mem = sys.total_memory();
        if total_mem == 0 {
            return None;
        }
        let used_mem = sys.used_memory();

        Some(ResourceSample {
            cpu_percent: sys.global_cpu_usage(),
            memory_used_mb: used_mem / BYTES_PER_MB,
            memory_percent: (used_mem as f64 / total_mem as f64 * 100.0) as f32,
        })
    }
}

/// 资源与任务统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResourceStats {
    /// CPU 使用率（百分比）
    pub cpu_usage: f32,
    /// 内存使用率（百分比）
    pub memory_usage: f32,
    pub memory_used_mb: u64,
    pub active_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
}

#[derive(Default)]
struct TaskCounters {
    active: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

struct Sampler {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// 资源监控器
///
/// 后台采样器按固定周期刷新缓存快照；准入检查则同步地重新采样，
/// 不使用缓存。
pub struct ResourceMonitor {
    probe: Arc<dyn ResourceProbe>,
    snapshot: RwLock<Option<ResourceSample>>,
    tasks: TaskCounters,
    interval: Duration,
    sampler: Mutex<Option<Sampler>>,
}

impl ResourceMonitor {
    pub fn new(interval: Duration) -> Self {
        Self::with_probe(Arc::new(SysinfoProbe::new()), interval)
    }

    pub fn with_probe(probe: Arc<dyn ResourceProbe>, interval: Duration) -> Self {
        Self {
            probe,
            snapshot: RwLock::new(None),
            tasks: TaskCounters::default(),
            interval,
            sampler: Mutex::new(None),
        }
    }

    /// 启动后台采样，重复调用无效果
    pub fn start_monitoring(self: &Arc<Self>) {
        let mut sampler = self.sampler.lock();
        if sampler.is_some() {
            return;
        }

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let monitor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(monitor.interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => monitor.refresh(),
                }
            }
            debug!("Resource sampler stopped");
        });

        info!("Resource monitoring started, interval {:?}", self.interval);
        *sampler = Some(Sampler { shutdown, handle });
    }

    /// 停止后台采样并等待其退出
    pub async fn stop_monitoring(&self) {
        let sampler = self.sampler.lock().take();
        if let Some(sampler) = sampler {
            sampler.shutdown.cancel();
            if let Err(e) = sampler.handle.await {
                warn!("Resource sampler exited abnormally: {}", e);
            }
            info!("Resource monitoring stopped");
        }
    }

    /// 只发出停止信号，不等待采样任务退出
    pub fn signal_stop(&self) {
        if let Some(sampler) = self.sampler.lock().take() {
            sampler.shutdown.cancel();
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.sampler.lock().is_some()
    }

    fn refresh(&self) {
        match self.probe.sample() {
            Some(sample) => {
                update_system_metrics(sample.cpu_percent, sample.memory_percent as f64 / 100.0);
                *self.snapshot.write() = Some(sample);
            }
            None => debug!("Resource metrics unavailable on this platform"),
        }
    }

    /// 返回统计快照的副本
    pub fn get_stats(&self) -> ResourceStats {
        let sample = *self.snapshot.read();
        let sample = sample.unwrap_or(ResourceSample {
            cpu_percent: 0.0,
            memory_used_mb: 0,
            memory_percent: 0.0,
        });
        ResourceStats {
            cpu_usage: sample.cpu_percent,
            memory_usage: sample.memory_percent,
            memory_used_mb: sample.memory_used_mb,
            active_tasks: self.tasks.active.load(Ordering::Relaxed),
            completed_tasks: self.tasks.completed.load(Ordering::Relaxed),
            failed_tasks: self.tasks.failed.load(Ordering::Relaxed),
        }
    }

    /// 准入检查：立即采样并与限制比较
    ///
    /// 无法采样时放行（返回 true），引擎可用性优先于严格限流。
    pub fn is_resource_available(&self, limits: &ResourceLimits) -> bool {
        let Some(sample) = self.probe.sample() else {
            debug!("Resource metrics unavailable, admitting task");
            return true;
        };

        if sample.cpu_percent > limits.cpu_limit_percent {
            debug!(
                "CPU usage {:.1}% exceeds limit {:.1}%",
                sample.cpu_percent, limits.cpu_limit_percent
            );
            return false;
        }
        if sample.memory_used_mb > limits.memory_limit_mb {
            debug!(
                "Memory usage {} MB exceeds limit {} MB",
                sample.memory_used_mb, limits.memory_limit_mb
            );
            return false;
        }
        true
    }

    pub fn record_task_started(&self) {
        let active = self.tasks.active.fetch_add(1, Ordering::Relaxed) + 1;
        gauge!("taskforge_active_tasks").set(active as f64);
    }

    pub fn record_task_finished(&self, success: bool) {
        let active = self
            .tasks
            .active
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        gauge!("taskforge_active_tasks").set(active as f64);
        if success {
            self.tasks.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.tasks.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}
