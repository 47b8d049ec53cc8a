// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use thiserror::Error;
use uuid::Uuid;

/// 队列错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueueError {
    /// 任务未在注册表中
    #[error("Task {0} is not registered")]
    NotRegistered(Uuid),

    /// task_done 调用次数超过入队次数
    #[error("task_done() called too many times")]
    TaskDoneOverflow,
}

/// Worker错误类型
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Worker loop panicked: {0}")]
    Panicked(String),
}

/// 引擎对外暴露的错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// 相同标识的任务仍在等待或运行
    #[error("Task {0} is already pending or running")]
    DuplicateTask(Uuid),

    #[error("Load balancer requires at least one processor")]
    NoProcessors,

    #[error("Timed out waiting for the result of task {0}")]
    ResultTimeout(Uuid),
}
