// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::Serialize;

use crate::infrastructure::observability::resource_monitor::ResourceStats;

/// 单个处理器的统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ProcessorStats {
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub cancelled_tasks: u64,
    /// 成功任务的平均执行时间（秒）
    pub average_execution_time: f64,
    /// 排队中的任务数
    pub queue_size: usize,
    /// 尚未被取走的结果数
    pub pending_results: usize,
    pub resources: ResourceStats,
}

/// 负载均衡器汇总的统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct OverallStats {
    pub processor_count: usize,
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub cancelled_tasks: u64,
    pub pending_results: usize,
    /// 各处理器队列长度的平均值
    pub average_queue_size: f64,
}

impl OverallStats {
    /// 汇总各处理器的统计信息
    pub fn aggregate(stats: &[ProcessorStats]) -> Self {
        let mut overall = OverallStats {
            processor_count: stats.len(),
            ..Default::default()
        };

        let mut queued = 0usize;
        for s in stats {
            overall.total_tasks += s.total_tasks;
            overall.completed_tasks += s.completed_tasks;
            overall.failed_tasks += s.failed_tasks;
            overall.cancelled_tasks += s.cancelled_tasks;
            overall.pending_results += s.pending_results;
            queued += s.queue_size;
        }

        if !stats.is_empty() {
            overall.average_queue_size = queued as f64 / stats.len() as f64;
        }
        overall
    }
}
