// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// 单次任务执行失败的原因
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TaskError {
    /// 处理器返回错误
    #[error("Task execution failed: {0}")]
    Execution(String),

    /// 单次尝试超时
    #[error("Task timed out after {0:?}")]
    Timeout(Duration),

    /// 任务未挂载处理器
    #[error("No processor attached to task")]
    MissingProcessor,

    /// 处理器发生 panic
    #[error("Task panicked: {0}")]
    Panicked(String),

    /// 任务被取消
    #[error("Task cancelled")]
    Cancelled,
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        TaskError::Execution(format!("{:#}", err))
    }
}

/// 任务的唯一终止结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: Uuid,
    pub success: bool,
    pub result: Option<Value>,
    /// 最后一次失败的错误
    pub error: Option<TaskError>,
    /// 从首次尝试开始到结束的总耗时（包括重试退避）
    pub execution_time: Duration,
    /// 实际执行的重试次数
    pub retry_count: u32,
    pub metadata: HashMap<String, Value>,
    pub completed_at: DateTime<Utc>,
}

impl TaskResult {
    pub fn success(
        task_id: Uuid,
        result: Value,
        execution_time: Duration,
        retry_count: u32,
        metadata: HashMap<String, Value>,
    ) -> Self {
        Self {
            task_id,
            success: true,
            result: Some(result),
            error: None,
            execution_time,
            retry_count,
            metadata,
            completed_at: Utc::now(),
        }
    }

    pub fn failure(
        task_id: Uuid,
        error: TaskError,
        execution_time: Duration,
        retry_count: u32,
        metadata: HashMap<String, Value>,
    ) -> Self {
        Self {
            task_id,
            success: false,
            result: None,
            error: Some(error),
            execution_time,
            retry_count,
            metadata,
            completed_at: Utc::now(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.error, Some(TaskError::Cancelled))
    }
}
