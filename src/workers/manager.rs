// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::workers::task_worker::{TaskWorker, WorkerShared};
use crate::workers::worker::Worker;

/// 工作管理器
///
/// 持有所有工作器的句柄和共同的关闭信号。
pub struct WorkerManager {
    shared: WorkerShared,
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerManager {
    pub fn new(shared: WorkerShared) -> Self {
        Self {
            shared,
            shutdown: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// 启动工作进程
    ///
    /// 创建并启动指定数量的工作进程
    ///
    /// # 参数
    ///
    /// * `count` - 要启动的工作进程数量
    pub fn start_workers(&mut self, count: usize) {
        let offset = self.handles.len();
        for index in 0..count {
            let worker: Arc<dyn Worker> = Arc::new(TaskWorker::new(
                offset + index,
                self.shared.clone(),
                self.shutdown.clone(),
            ));
            let handle = tokio::spawn(async move {
                worker.run().await;
            });
            self.handles.push(handle);
        }
        info!("Started {} workers", count);
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// 发出关闭信号并等待所有工作器退出
    ///
    /// 正在执行的任务会先运行完毕。
    pub async fn shutdown(&mut self) {
        info!("Shutting down workers...");
        self.shutdown.cancel();

        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!("Worker exited abnormally: {}", e);
            }
        }

        info!("Workers shut down successfully");
    }
}

impl Drop for WorkerManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
