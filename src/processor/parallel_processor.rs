// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use metrics::counter;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::processor_config::ProcessorConfig;
use crate::config::settings::Settings;
use crate::domain::models::task::{Processor, Task, TaskContext, TaskStatus};
use crate::domain::models::task_result::{TaskError, TaskResult};
use crate::infrastructure::observability::metrics::describe_metrics;
use crate::infrastructure::observability::resource_monitor::{ResourceMonitor, ResourceProbe};
use crate::processor::stats::ProcessorStats;
use crate::queue::result_store::ResultStore;
use crate::queue::task_queue::PriorityTaskQueue;
use crate::utils::errors::EngineError;
use crate::workers::executor::ExecutionBackend;
use crate::workers::manager::WorkerManager;
use crate::workers::task_worker::WorkerShared;

/// 轮询结果的间隔
const RESULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

struct RunningState {
    workers: WorkerManager,
    backend: Arc<ExecutionBackend>,
}

/// 并行处理器
///
/// 把优先级队列、资源监控器和执行后端组合在一起。处理器独占自己的队列、
/// 后端和结果表；每个出队的任务恰好产生一个 [`TaskResult`]，且只能被取走一次。
pub struct ParallelProcessor {
    config: ProcessorConfig,
    queue: Arc<PriorityTaskQueue>,
    results: Arc<ResultStore>,
    monitor: Arc<ResourceMonitor>,
    cancellations: Arc<DashMap<Uuid, CancellationToken>>,
    state: Mutex<Option<RunningState>>,
    running: AtomicBool,
}

impl ParallelProcessor {
    /// 使用 sysinfo 资源采样创建处理器
    pub fn new(config: ProcessorConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let monitor = ResourceMonitor::new(config.monitor_interval);
        Ok(Self::build(config, monitor))
    }

    /// 使用自定义资源采样器创建处理器
    pub fn with_probe(
        config: ProcessorConfig,
        probe: Arc<dyn ResourceProbe>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let monitor = ResourceMonitor::with_probe(probe, config.monitor_interval);
        Ok(Self::build(config, monitor))
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, EngineError> {
        Self::new(settings.processor_config()?)
    }

    fn build(config: ProcessorConfig, monitor: ResourceMonitor) -> Self {
        describe_metrics();
        Self {
            config,
            queue: Arc::new(PriorityTaskQueue::new()),
            results: Arc::new(ResultStore::new()),
            monitor: Arc::new(monitor),
            cancellations: Arc::new(DashMap::new()),
            state: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 启动资源监控和 `max_workers` 个工作器，重复调用无效果
    pub async fn start(&self) {
        let mut state = self.state.lock().await;
        if state.is_some() {
            debug!("Processor already running");
            return;
        }

        self.monitor.start_monitoring();
        let backend = Arc::new(ExecutionBackend::new(
            self.config.processor_type,
            self.config.timeout,
        ));

        let mut workers = WorkerManager::new(WorkerShared {
            queue: self.queue.clone(),
            results: self.results.clone(),
            monitor: self.monitor.clone(),
            backend: backend.clone(),
            cancellations: self.cancellations.clone(),
            retry_policy: self.config.retry_policy(),
            poll_interval: self.config.poll_interval,
        });
        workers.start_workers(self.config.max_workers);

        *state = Some(RunningState { workers, backend });
        self.running.store(true, Ordering::SeqCst);
        info!(
            "Parallel processor started with {} {} workers",
            self.config.max_workers, self.config.processor_type
        );
    }

    /// 停止处理器，等待正在执行的任务结束，重复调用无效果
    ///
    /// 尚未出队的任务留在队列中，再次 `start` 后继续处理。
    pub async fn stop(&self) {
        let state = self.state.lock().await.take();
        let Some(mut state) = state else {
            return;
        };

        state.workers.shutdown().await;
        state.backend.shutdown().await;
        self.monitor.stop_monitoring().await;
        self.running.store(false, Ordering::SeqCst);
        info!("Parallel processor stopped");
    }

    /// 提交同步任务
    pub async fn submit_task<F>(&self, task: Task, f: F) -> Result<Uuid, EngineError>
    where
        F: Fn(&TaskContext) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.submit(task, Processor::from_fn(f)).await
    }

    /// 提交异步任务
    pub async fn submit_async_task<F, Fut>(&self, task: Task, f: F) -> Result<Uuid, EngineError>
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.submit(task, Processor::from_async(f)).await
    }

    /// 挂载处理器并入队
    ///
    /// 启用负载均衡时先做一次软资源检查：资源不足则等待 `throttle_delay`
    /// 后照常入队，这只是尽力而为的限流。
    pub async fn submit(&self, mut task: Task, processor: Processor) -> Result<Uuid, EngineError> {
        // 令牌存在即表示任务尚未结束
        match self.cancellations.entry(task.id) {
            Entry::Occupied(_) => return Err(EngineError::DuplicateTask(task.id)),
            Entry::Vacant(slot) => {
                slot.insert(CancellationToken::new());
            }
        }
        task.processor = Some(processor);

        if self.config.enable_load_balancing
            && !self
                .monitor
                .is_resource_available(&self.config.resource_limits)
        {
            warn!(
                "Resources over limit, delaying task {} by {:?}",
                task.id, self.config.throttle_delay
            );
            counter!("taskforge_submissions_throttled_total").increment(1);
            sleep(self.config.throttle_delay).await;
        }

        let task_id = task.id;
        self.results.record_submitted();
        self.queue.put(task);
        debug!("Task {} submitted", task_id);
        Ok(task_id)
    }

    /// 获取任务结果
    ///
    /// 每 100ms 轮询一次，直到结果出现或超时；`timeout` 为 `None` 时一直等待。
    /// 结果取走后即被移除。任务未提交过、或已结束且结果已被取走时立即返回 `None`。
    /// 是否仍在等待只取决于任务是否结束，与注册表中是否还有该任务无关。
    pub async fn get_result(&self, task_id: Uuid, timeout: Option<Duration>) -> Option<TaskResult> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(result) = self.results.take(task_id) {
                return Some(result);
            }

            if !self.is_pending(task_id) {
                // 结果先于令牌移除写入，这里再取一次即可确定
                return self.results.take(task_id);
            }

            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    RESULT_POLL_INTERVAL.min(deadline - now)
                }
                None => RESULT_POLL_INTERVAL,
            };
            sleep(wait).await;
        }
    }

    /// 任务已提交且尚未产生结果
    pub fn is_pending(&self, task_id: Uuid) -> bool {
        self.cancellations.contains_key(&task_id)
    }

    /// 是否有尚未取走的结果
    pub fn has_result(&self, task_id: Uuid) -> bool {
        self.results.contains(task_id)
    }

    /// 取走全部结果
    pub fn get_all_results(&self) -> HashMap<Uuid, TaskResult> {
        self.results.drain()
    }

    pub fn get_stats(&self) -> ProcessorStats {
        let counters = self.results.counters();
        ProcessorStats {
            total_tasks: counters.total_tasks,
            completed_tasks: counters.completed_tasks,
            failed_tasks: counters.failed_tasks,
            cancelled_tasks: counters.cancelled_tasks,
            average_execution_time: counters.average_execution_time(),
            queue_size: self.queue.qsize(),
            pending_results: self.results.pending_results(),
            resources: self.monitor.get_stats(),
        }
    }

    /// 取消任务
    ///
    /// 尚在队列中的任务直接移除并立即产生取消结果；正在执行的任务会收到取消信号，
    /// 由工作器产生取消结果。任务不存在或已结束时返回 false。
    pub fn cancel(&self, task_id: Uuid) -> bool {
        if let Some(task) = self.queue.remove(task_id) {
            self.results.record(TaskResult::failure(
                task_id,
                TaskError::Cancelled,
                Duration::ZERO,
                0,
                task.metadata,
            ));
            if let Some((_, token)) = self.cancellations.remove(&task_id) {
                token.cancel();
            }
            if let Err(e) = self.queue.set_status(task_id, TaskStatus::Cancelled) {
                warn!("Could not mark task as cancelled: {}", e);
            }
            info!("Task {} cancelled before execution", task_id);
            return true;
        }

        match self.cancellations.get(&task_id) {
            Some(token) => {
                token.cancel();
                info!("Cancellation requested for running task {}", task_id);
                true
            }
            None => false,
        }
    }

    pub fn task_status(&self, task_id: Uuid) -> Option<TaskStatus> {
        self.queue.get_task(task_id).map(|task| task.status)
    }

    /// 按 id 查询已注册的任务
    pub fn get_task(&self, task_id: Uuid) -> Option<Task> {
        self.queue.get_task(task_id)
    }

    /// 从注册表中移除任务
    ///
    /// 不影响排队或执行，任务结束后结果照常可取。
    pub fn remove_task(&self, task_id: Uuid) -> Option<Task> {
        self.queue.remove_task(task_id)
    }

    /// 提交一批任务并按提交顺序收集结果
    ///
    /// 所有结果共用一个超时，超时返回 [`EngineError::ResultTimeout`]，
    /// 已提交的任务仍会继续执行。
    pub async fn process_batch(
        &self,
        items: Vec<(Task, Processor)>,
        timeout: Option<Duration>,
    ) -> Result<Vec<TaskResult>, EngineError> {
        let deadline = timeout.map(|t| Instant::now() + t);

        let mut ids = Vec::with_capacity(items.len());
        for (task, processor) in items {
            ids.push(self.submit(task, processor).await?);
        }

        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            match self.get_result(id, remaining).await {
                Some(result) => results.push(result),
                None => return Err(EngineError::ResultTimeout(id)),
            }
        }
        Ok(results)
    }
}

impl Drop for ParallelProcessor {
    fn drop(&mut self) {
        // 未调用 stop 时至少让后台任务退出
        self.monitor.signal_stop();
    }
}
