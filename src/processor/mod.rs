// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 处理器模块
///
/// 提供并行处理器（调度器）、负载均衡器和统计信息
pub mod load_balancer;
pub mod parallel_processor;
pub mod stats;

pub use load_balancer::LoadBalancer;
pub use parallel_processor::ParallelProcessor;
pub use stats::{OverallStats, ProcessorStats};
