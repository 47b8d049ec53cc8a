// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::FutureExt;
use metrics::counter;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::models::task::{Task, TaskContext, TaskStatus};
use crate::domain::models::task_result::{TaskError, TaskResult};
use crate::infrastructure::observability::resource_monitor::ResourceMonitor;
use crate::queue::result_store::ResultStore;
use crate::queue::task_queue::PriorityTaskQueue;
use crate::utils::errors::WorkerError;
use crate::utils::retry_policy::RetryPolicy;
use crate::workers::executor::{panic_message, ExecutionBackend};
use crate::workers::worker::Worker;

/// 工作器循环出错后的退避时间
const LOOP_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// 工作器之间共享的引擎状态
#[derive(Clone)]
pub struct WorkerShared {
    pub queue: Arc<PriorityTaskQueue>,
    pub results: Arc<ResultStore>,
    pub monitor: Arc<ResourceMonitor>,
    pub backend: Arc<ExecutionBackend>,
    /// 未结束任务的取消令牌
    pub cancellations: Arc<DashMap<Uuid, CancellationToken>>,
    pub retry_policy: RetryPolicy,
    /// 出队等待时间
    pub poll_interval: Duration,
}

/// 任务工作器
///
/// 循环出队并执行任务，直到收到关闭信号。任务失败不会终止循环；
/// 循环层面的错误（包括 panic）会被记录并退避一秒后继续。
pub struct TaskWorker {
    name: String,
    shared: WorkerShared,
    shutdown: CancellationToken,
}

impl TaskWorker {
    pub fn new(index: usize, shared: WorkerShared, shutdown: CancellationToken) -> Self {
        Self {
            name: format!("task-worker-{}", index),
            shared,
            shutdown,
        }
    }

    async fn process_next(&self) -> Result<bool, WorkerError> {
        let next = tokio::select! {
            _ = self.shutdown.cancelled() => return Ok(false),
            task = self.shared.queue.get(self.shared.poll_interval) => task,
        };

        match next {
            Some(task) => {
                let outcome = AssertUnwindSafe(self.process_task(task))
                    .catch_unwind()
                    .await;
                match outcome {
                    Ok(result) => result.map(|_| true),
                    Err(panic) => Err(WorkerError::Panicked(panic_message(panic.as_ref()))),
                }
            }
            None => Ok(false),
        }
    }

    #[instrument(skip(self, task), fields(worker = %self.name, task_id = %task.id, priority = %task.priority))]
    async fn process_task(&self, task: Task) -> Result<(), WorkerError> {
        let shared = &self.shared;
        let token = shared
            .cancellations
            .get(&task.id)
            .map(|entry| entry.clone())
            .unwrap_or_default();

        // 出队后、开始前被取消
        if token.is_cancelled() {
            info!("Task cancelled before execution");
            let result = TaskResult::failure(
                task.id,
                TaskError::Cancelled,
                Duration::ZERO,
                0,
                task.metadata.clone(),
            );
            return self.finish(&task, result, TaskStatus::Cancelled);
        }

        if let Err(e) = shared.queue.set_status(task.id, TaskStatus::Running) {
            warn!("Could not mark task as running: {}", e);
        }
        shared.monitor.record_task_started();
        debug!("Processing task");

        let started = Instant::now();
        let mut retries: u32 = 0;
        let outcome = loop {
            let ctx = TaskContext::new(&task, retries + 1, token.clone());
            let attempt = match task.processor() {
                Some(processor) => shared.backend.run_attempt(processor, ctx).await,
                None => Err(TaskError::MissingProcessor),
            };

            match attempt {
                Ok(value) => break Ok(value),
                Err(TaskError::Cancelled) => break Err(TaskError::Cancelled),
                Err(e) if shared.retry_policy.should_retry(retries) => {
                    retries += 1;
                    let delay = shared.retry_policy.calculate_backoff(retries);
                    warn!(
                        "Attempt {} failed: {}; retrying in {:?}",
                        retries, e, delay
                    );
                    counter!("taskforge_task_retries_total").increment(1);

                    tokio::select! {
                        _ = token.cancelled() => break Err(TaskError::Cancelled),
                        _ = sleep(delay) => {}
                    }
                }
                Err(e) => break Err(e),
            }
        };

        let execution_time = started.elapsed();
        let metadata = task.metadata.clone();
        let (result, status) = match outcome {
            Ok(value) => {
                info!(
                    "Task completed in {:?} after {} retries",
                    execution_time, retries
                );
                (
                    TaskResult::success(task.id, value, execution_time, retries, metadata),
                    TaskStatus::Completed,
                )
            }
            Err(TaskError::Cancelled) => {
                info!("Task cancelled while running");
                (
                    TaskResult::failure(
                        task.id,
                        TaskError::Cancelled,
                        execution_time,
                        retries,
                        metadata,
                    ),
                    TaskStatus::Cancelled,
                )
            }
            Err(e) => {
                error!("Task failed after {} retries: {}", retries, e);
                (
                    TaskResult::failure(task.id, e, execution_time, retries, metadata),
                    TaskStatus::Failed,
                )
            }
        };

        shared
            .monitor
            .record_task_finished(status == TaskStatus::Completed);
        self.finish(&task, result, status)
    }

    fn finish(&self, task: &Task, result: TaskResult, status: TaskStatus) -> Result<(), WorkerError> {
        let shared = &self.shared;
        if shared.results.record(result).is_some() {
            warn!("Replaced an unconsumed result for task {}", task.id);
        }
        // 结果先于令牌移除写入：看到任务已结束的读者一定能看到结果
        shared.cancellations.remove(&task.id);
        if let Err(e) = shared.queue.set_status(task.id, status) {
            warn!("Could not record final status {}: {}", status, e);
        }
        shared.queue.task_done()?;
        Ok(())
    }
}

#[async_trait]
impl Worker for TaskWorker {
    async fn run(&self) {
        info!("Worker {} started", self.name);

        while !self.shutdown.is_cancelled() {
            if let Err(e) = self.process_next().await {
                error!("Worker {} loop error: {}", self.name, e);
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = sleep(LOOP_ERROR_BACKOFF) => {}
                }
            }
        }

        info!("Worker {} stopped", self.name);
    }

    fn name(&self) -> &str {
        &self.name
    }
}
