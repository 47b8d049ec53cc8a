// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use dashmap::DashMap;
use metrics::{counter, histogram};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::models::task_result::TaskResult;

/// 聚合计数器
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExecutionCounters {
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub cancelled_tasks: u64,
    /// 成功任务的累计执行时间
    pub total_execution_time: Duration,
}

impl ExecutionCounters {
    /// 成功任务的平均执行时间（秒），没有成功任务时为 0
    pub fn average_execution_time(&self) -> f64 {
        if self.completed_tasks == 0 {
            0.0
        } else {
            self.total_execution_time.as_secs_f64() / self.completed_tasks as f64
        }
    }

    /// 已产生结果的任务数
    pub fn finished_tasks(&self) -> u64 {
        self.completed_tasks + self.failed_tasks + self.cancelled_tasks
    }
}

/// 任务结果存储
///
/// 多个工作器并发写入。计数器与结果在同一次调用中更新，
/// 因此 `completed + failed + cancelled <= total` 始终成立。
#[derive(Default)]
pub struct ResultStore {
    results: DashMap<Uuid, TaskResult>,
    counters: Mutex<ExecutionCounters>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次提交
    pub fn record_submitted(&self) {
        self.counters.lock().total_tasks += 1;
        counter!("taskforge_tasks_submitted_total").increment(1);
    }

    /// 保存任务结果并更新计数器
    ///
    /// 若同一 id 已有未取走的结果则被覆盖并返回旧结果。
    pub fn record(&self, result: TaskResult) -> Option<TaskResult> {
        {
            let mut counters = self.counters.lock();
            if result.success {
                counters.completed_tasks += 1;
                counters.total_execution_time += result.execution_time;
            } else if result.is_cancelled() {
                counters.cancelled_tasks += 1;
            } else {
                counters.failed_tasks += 1;
            }
        }

        if result.success {
            counter!("taskforge_tasks_completed_total").increment(1);
            histogram!("taskforge_task_duration_seconds")
                .record(result.execution_time.as_secs_f64());
        } else if result.is_cancelled() {
            counter!("taskforge_tasks_cancelled_total").increment(1);
        } else {
            counter!("taskforge_tasks_failed_total").increment(1);
        }

        self.results.insert(result.task_id, result)
    }

    /// 取走指定任务的结果
    pub fn take(&self, task_id: Uuid) -> Option<TaskResult> {
        self.results.remove(&task_id).map(|(_, result)| result)
    }

    /// 取走全部结果
    pub fn drain(&self) -> HashMap<Uuid, TaskResult> {
        let ids: Vec<Uuid> = self.results.iter().map(|entry| *entry.key()).collect();
        ids.into_iter()
            .filter_map(|id| self.results.remove(&id))
            .collect()
    }

    /// 是否有尚未取走的结果
    pub fn contains(&self, task_id: Uuid) -> bool {
        self.results.contains_key(&task_id)
    }

    pub fn pending_results(&self) -> usize {
        self.results.len()
    }

    pub fn counters(&self) -> ExecutionCounters {
        *self.counters.lock()
    }
}
