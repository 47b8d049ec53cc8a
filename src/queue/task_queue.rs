// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use dashmap::DashMap;
use metrics::{gauge, histogram};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::domain::models::task::{Task, TaskStatus};
use crate::utils::errors::QueueError;

/// 堆中的条目，按 (优先级排序键, 入队序号) 升序出队
struct QueueEntry {
    rank: u8,
    seq: u64,
    enqueued_at: Instant,
    task: Task,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.rank == other.rank && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    // BinaryHeap 是最大堆，反转比较使最小键最先弹出
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .rank
            .cmp(&self.rank)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<QueueEntry>,
    unfinished: usize,
}

/// 线程安全的优先级任务队列
///
/// 同一优先级内保持先进先出：入队序号严格单调递增并作为次级排序键。
/// 不同优先级之间严格有序，没有防饥饿机制。队列无界，
/// 需要背压的调用方应使用处理器的软资源检查。
///
/// 除了排队的任务之外，队列还维护一个 id → 任务 的注册表，
/// 任务出队后仍保留在注册表中，直到调用 [`PriorityTaskQueue::remove_task`]。
pub struct PriorityTaskQueue {
    state: Mutex<QueueState>,
    registry: DashMap<Uuid, Task>,
    sequence: AtomicU64,
    notify: Notify,
}

impl Default for PriorityTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityTaskQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            registry: DashMap::new(),
            sequence: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    /// 入队任务并注册
    pub fn put(&self, mut task: Task) {
        task.status = TaskStatus::Pending;
        let seq = self.sequence.fetch_add(1, AtomicOrdering::SeqCst);
        self.registry.insert(task.id, task.clone());

        let depth = {
            let mut state = self.state.lock();
            state.heap.push(QueueEntry {
                rank: task.priority.rank(),
                seq,
                enqueued_at: Instant::now(),
                task,
            });
            state.unfinished += 1;
            state.heap.len()
        };
        gauge!("taskforge_queue_depth").set(depth as f64);

        self.notify.notify_one();
    }

    /// 非阻塞出队
    pub fn try_get(&self) -> Option<Task> {
        let (entry, depth) = {
            let mut state = self.state.lock();
            let entry = state.heap.pop()?;
            (entry, state.heap.len())
        };
        gauge!("taskforge_queue_depth").set(depth as f64);
        histogram!("taskforge_queue_wait_seconds").record(entry.enqueued_at.elapsed().as_secs_f64());
        Some(entry.task)
    }

    /// 阻塞出队，超时返回 `None`
    pub async fn get(&self, timeout: Duration) -> Option<Task> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // 先登记等待再检查队列，避免丢失 put 发出的通知
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(task) = self.try_get() {
                return Some(task);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_get();
            }
        }
    }

    /// 标记一个出队任务的处理已结束
    pub fn task_done(&self) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        if state.unfinished == 0 {
            return Err(QueueError::TaskDoneOverflow);
        }
        state.unfinished -= 1;
        Ok(())
    }

    /// 排队中的任务数
    pub fn qsize(&self) -> usize {
        self.state.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().heap.is_empty()
    }

    /// 已入队但尚未调用 `task_done` 的任务数
    pub fn unfinished_tasks(&self) -> usize {
        self.state.lock().unfinished
    }

    /// 从队列中移除尚未出队的任务
    ///
    /// 任务仍保留在注册表中。
    pub fn remove(&self, task_id: Uuid) -> Option<Task> {
        let mut state = self.state.lock();
        let position = state.heap.iter().position(|entry| entry.task.id == task_id)?;

        let mut entries = std::mem::take(&mut state.heap).into_vec();
        let removed = entries.swap_remove(position);
        state.heap = BinaryHeap::from(entries);
        state.unfinished = state.unfinished.saturating_sub(1);
        gauge!("taskforge_queue_depth").set(state.heap.len() as f64);

        Some(removed.task)
    }

    /// 按 id 查询注册表
    pub fn get_task(&self, task_id: Uuid) -> Option<Task> {
        self.registry.get(&task_id).map(|task| task.clone())
    }

    /// 从注册表中移除任务
    pub fn remove_task(&self, task_id: Uuid) -> Option<Task> {
        self.registry.remove(&task_id).map(|(_, task)| task)
    }

    pub fn contains(&self, task_id: Uuid) -> bool {
        self.registry.contains_key(&task_id)
    }

    /// 更新注册表中任务的状态并记录时间戳
    pub fn set_status(&self, task_id: Uuid, status: TaskStatus) -> Result<(), QueueError> {
        let mut task = self
            .registry
            .get_mut(&task_id)
            .ok_or(QueueError::NotRegistered(task_id))?;

        task.status = status;
        match status {
            TaskStatus::Running => task.started_at = Some(Utc::now()),
            s if s.is_terminal() => task.completed_at = Some(Utc::now()),
            _ => {}
        }
        Ok(())
    }
}
