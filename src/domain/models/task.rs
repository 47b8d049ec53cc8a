// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// 任务优先级
///
/// 排序键越小越先出队：High=1，Medium=2，Low=3。
/// 不同优先级之间严格有序，因此持续到达的高优先级任务可能无限期推迟低优先级任务。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// 高优先级
    High,
    /// 中优先级
    #[default]
    Medium,
    /// 低优先级
    Low,
}

impl Priority {
    /// 返回出队排序键
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

impl FromStr for Priority {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            _ => Err(()),
        }
    }
}

/// 任务状态枚举
///
/// 状态转换遵循以下流程：
/// Pending → Running → Completed/Failed/Cancelled
///
/// 尚未出队的任务也可以直接从 Pending 转为 Cancelled。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// 等待中，任务已入队但尚未被工作器取走
    #[default]
    Pending,
    /// 运行中，任务正在被某个工作器执行
    Running,
    /// 已完成
    Completed,
    /// 已失败，重试次数已耗尽
    Failed,
    /// 已取消
    Cancelled,
}

impl TaskStatus {
    /// 是否为终止状态
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            _ => Err(()),
        }
    }
}

/// 同步处理函数
pub type SyncFn = Arc<dyn Fn(&TaskContext) -> anyhow::Result<Value> + Send + Sync>;

/// 异步处理函数
pub type AsyncFn =
    Arc<dyn Fn(TaskContext) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// 任务处理器
///
/// 同步处理器在阻塞线程池中运行，异步处理器在运行时上以 future 的形式运行。
#[derive(Clone)]
pub enum Processor {
    /// 同步处理器
    Sync(SyncFn),
    /// 异步处理器
    Async(AsyncFn),
}

impl Processor {
    /// 由同步闭包创建处理器
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&TaskContext) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Processor::Sync(Arc::new(f))
    }

    /// 由返回 future 的闭包创建处理器
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Processor::Async(Arc::new(move |ctx| f(ctx).boxed()))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Processor::Async(_))
    }
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Processor::Sync(_) => write!(f, "Processor::Sync"),
            Processor::Async(_) => write!(f, "Processor::Async"),
        }
    }
}

/// 任务实体
///
/// 一个具有唯一标识、优先级和处理器的工作单元。`payload` 与 `metadata`
/// 对引擎不透明，原样传给处理器。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// 任务唯一标识符，由调用方保证唯一
    pub id: Uuid,
    /// 任务优先级
    pub priority: Priority,
    /// 任务状态
    pub status: TaskStatus,
    /// 任务负载数据
    pub payload: Value,
    /// 任意附加信息，会复制到任务结果中
    pub metadata: HashMap<String, Value>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 开始执行时间
    pub started_at: Option<DateTime<Utc>>,
    /// 完成时间
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub(crate) processor: Option<Processor>,
}

impl Task {
    /// 使用随机标识创建任务
    pub fn new(priority: Priority) -> Self {
        Self::with_id(Uuid::new_v4(), priority)
    }

    /// 使用调用方指定的标识创建任务
    pub fn with_id(id: Uuid, priority: Priority) -> Self {
        Self {
            id,
            priority,
            status: TaskStatus::Pending,
            payload: Value::Null,
            metadata: HashMap::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            processor: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// 挂载处理器
    pub fn with_processor(mut self, processor: Processor) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn processor(&self) -> Option<&Processor> {
        self.processor.as_ref()
    }

    /// 是否挂载了异步处理器
    pub fn is_async(&self) -> bool {
        self.processor.as_ref().is_some_and(Processor::is_async)
    }
}

/// 处理器执行上下文
///
/// 每次尝试都会构造一个新的上下文；取消令牌在整个任务生命周期内共享，
/// 长时间运行的处理器应定期检查 [`TaskContext::is_cancelled`]。
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: Uuid,
    pub priority: Priority,
    pub payload: Value,
    pub metadata: HashMap<String, Value>,
    /// 当前尝试序号，从 1 开始
    pub attempt: u32,
    cancellation: CancellationToken,
}

impl TaskContext {
    pub fn new(task: &Task, attempt: u32, cancellation: CancellationToken) -> Self {
        Self {
            task_id: task.id,
            priority: task.priority,
            payload: task.payload.clone(),
            metadata: task.metadata.clone(),
            attempt,
            cancellation,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// 任务被取消时完成的 future
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }
}
