// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use dashmap::DashMap;
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::settings::Settings;
use crate::domain::models::task::{Processor, Task, TaskContext};
use crate::domain::models::task_result::TaskResult;
use crate::processor::parallel_processor::ParallelProcessor;
use crate::processor::stats::{OverallStats, ProcessorStats};
use crate::utils::errors::EngineError;

/// 每提交这么多次任务清理一次路由表
const ROUTE_PRUNE_INTERVAL: usize = 1024;

/// 负载均衡器
///
/// 以无状态轮询的方式把提交分发到多个处理器：第 n 次提交（从 0 开始）
/// 交给 `processors[n % N]`。不考虑各处理器的实际负载。
pub struct LoadBalancer {
    processors: Vec<Arc<ParallelProcessor>>,
    counter: AtomicUsize,
    /// 任务 id → 处理器下标，结果被取走后移除
    routes: DashMap<Uuid, usize>,
}

impl LoadBalancer {
    pub fn new(processors: Vec<Arc<ParallelProcessor>>) -> Result<Self, EngineError> {
        if processors.is_empty() {
            return Err(EngineError::NoProcessors);
        }
        Ok(Self {
            processors,
            counter: AtomicUsize::new(0),
            routes: DashMap::new(),
        })
    }

    /// 按配置创建 `load_balancer.instances` 个相同配置的处理器
    pub fn from_settings(settings: &Settings) -> Result<Self, EngineError> {
        let config = settings.processor_config()?;
        let processors = (0..settings.load_balancer.instances)
            .map(|_| ParallelProcessor::new(config.clone()).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(processors)
    }

    pub fn processors(&self) -> &[Arc<ParallelProcessor>] {
        &self.processors
    }

    /// 下一个目标处理器的下标，每次调用计数器加一
    fn next_index(&self) -> usize {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        if n > 0 && n % ROUTE_PRUNE_INTERVAL == 0 {
            self.prune_routes();
        }
        n % self.processors.len()
    }

    pub async fn start_all(&self) {
        join_all(self.processors.iter().map(|p| p.start())).await;
        info!("Load balancer started {} processors", self.processors.len());
    }

    pub async fn stop_all(&self) {
        join_all(self.processors.iter().map(|p| p.stop())).await;
        info!("Load balancer stopped {} processors", self.processors.len());
    }

    pub async fn submit_task<F>(&self, task: Task, f: F) -> Result<Uuid, EngineError>
    where
        F: Fn(&TaskContext) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.submit(task, Processor::from_fn(f)).await
    }

    pub async fn submit_async_task<F, Fut>(&self, task: Task, f: F) -> Result<Uuid, EngineError>
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.submit(task, Processor::from_async(f)).await
    }

    pub async fn submit(&self, task: Task, processor: Processor) -> Result<Uuid, EngineError> {
        let index = self.next_index();
        let task_id = self.processors[index].submit(task, processor).await?;
        self.routes.insert(task_id, index);
        debug!("Task {} routed to processor {}", task_id, index);
        Ok(task_id)
    }

    /// 处理该任务的处理器下标
    pub fn processor_for(&self, task_id: Uuid) -> Option<usize> {
        self.routes.get(&task_id).map(|index| *index)
    }

    /// 从负责该任务的处理器获取结果
    ///
    /// 取到结果，或任务已结束且结果已被取走时移除路由记录。
    pub async fn get_result(&self, task_id: Uuid, timeout: Option<Duration>) -> Option<TaskResult> {
        let index = self.processor_for(task_id)?;
        let processor = &self.processors[index];
        let result = processor.get_result(task_id, timeout).await;
        if result.is_some() || !processor.is_pending(task_id) {
            self.routes.remove(&task_id);
        }
        result
    }

    /// 取走所有处理器的全部结果，并移除已结束任务的路由记录
    pub fn get_all_results(&self) -> HashMap<Uuid, TaskResult> {
        let mut results = HashMap::new();
        for processor in &self.processors {
            results.extend(processor.get_all_results());
        }
        for task_id in results.keys() {
            self.routes.remove(task_id);
        }
        self.prune_routes();
        results
    }

    /// 取消任务，转发给负责该任务的处理器
    pub fn cancel(&self, task_id: Uuid) -> bool {
        match self.processor_for(task_id) {
            Some(index) => self.processors[index].cancel(task_id),
            None => false,
        }
    }

    /// 移除已结束且结果已被取走的任务的路由记录
    ///
    /// 结果直接从处理器取走的任务会在这里被清理；每 1024 次提交也会自动清理一次。
    pub fn prune_routes(&self) {
        let before = self.routes.len();
        self.routes.retain(|task_id, index| {
            let processor = &self.processors[*index];
            processor.is_pending(*task_id) || processor.has_result(*task_id)
        });
        let pruned = before.saturating_sub(self.routes.len());
        if pruned > 0 {
            debug!("Pruned {} stale routes", pruned);
        }
    }

    /// 路由表中的任务数
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// 汇总所有处理器的统计信息
    pub fn get_overall_stats(&self) -> OverallStats {
        let stats: Vec<ProcessorStats> = self.processors.iter().map(|p| p.get_stats()).collect();
        OverallStats::aggregate(&stats)
    }
}
