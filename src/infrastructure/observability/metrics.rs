// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::Lazy;
use tracing::{error, warn};

static DESCRIBED: Lazy<()> = Lazy::new(|| {
    describe_gauge!("system_cpu_usage_ratio", "Current CPU usage ratio (0.0 to 1.0)");
    describe_gauge!("system_memory_usage_ratio", "Current memory usage ratio (0.0 to 1.0)");
    describe_counter!(
        "taskforge_tasks_submitted_total",
        "Total number of tasks submitted"
    );
    describe_counter!(
        "taskforge_tasks_completed_total",
        "Total number of tasks completed successfully"
    );
    describe_counter!(
        "taskforge_tasks_failed_total",
        "Total number of tasks that exhausted their retries"
    );
    describe_counter!(
        "taskforge_tasks_cancelled_total",
        "Total number of tasks cancelled"
    );
    describe_counter!(
        "taskforge_task_retries_total",
        "Total number of retry attempts"
    );
    describe_counter!(
        "taskforge_submissions_throttled_total",
        "Total number of submissions delayed by the resource check"
    );
    describe_histogram!(
        "taskforge_task_duration_seconds",
        "Duration of successful tasks in seconds"
    );
    describe_histogram!(
        "taskforge_queue_wait_seconds",
        "Time tasks spend queued before a worker picks them up"
    );
    describe_gauge!("taskforge_queue_depth", "Number of tasks waiting in the queue");
    describe_gauge!("taskforge_active_tasks", "Number of tasks currently executing");
});

/// 注册指标描述
///
/// 只在第一次调用时生效。指标是否导出由宿主程序安装的 recorder 决定。
pub fn describe_metrics() {
    Lazy::force(&DESCRIBED);
}

/// 更新系统资源指标并在使用率过高时告警
///
/// `cpu_percent` 为 0-100，`memory_ratio` 为 0.0-1.0
pub fn update_system_metrics(cpu_percent: f32, memory_ratio: f64) {
    let cpu_usage = cpu_percent / 100.0;
    gauge!("system_cpu_usage_ratio").set(cpu_usage as f64);

    if cpu_usage > 0.9 {
        error!("CRITICAL: System CPU usage is extremely high: {:.2}%", cpu_percent);
    } else if cpu_usage > 0.8 {
        warn!("ALARM: System CPU usage is high: {:.2}%", cpu_percent);
    }

    gauge!("system_memory_usage_ratio").set(memory_ratio);
    if memory_ratio > 0.9 {
        error!(
            "CRITICAL: System memory usage is extremely high: {:.2}%",
            memory_ratio * 100.0
        );
    } else if memory_ratio > 0.8 {
        warn!("ALARM: System memory usage is high: {:.2}%", memory_ratio * 100.0);
    }
}
