// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 队列模块
///
/// 提供优先级任务队列和任务结果存储
pub mod result_store;
pub mod task_queue;
