// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{fast_config, processor};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskforge::{Priority, ProcessorConfig, Task, TaskError, TaskStatus};
use uuid::Uuid;

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_pending_task() {
    let processor = processor(fast_config(1));

    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();
    let id = processor
        .submit_task(Task::new(Priority::Medium), move |_| {
            flag.store(true, Ordering::SeqCst);
            Ok(json!(null))
        })
        .await
        .unwrap();

    assert!(processor.cancel(id));
    assert_eq!(processor.task_status(id), Some(TaskStatus::Cancelled));
    assert_eq!(processor.get_stats().queue_size, 0);

    processor.start().await;
    let result = processor.get_result(id, Some(Duration::from_secs(1))).await.unwrap();
    assert!(!result.success);
    assert!(result.is_cancelled());
    assert_eq!(result.retry_count, 0);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(processor.get_stats().cancelled_tasks, 1);

    // 已结束的任务不能再次取消
    assert!(!processor.cancel(id));
    processor.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_running_task() {
    let config = ProcessorConfig {
        retry_count: 3,
        ..fast_config(1)
    };
    let processor = processor(config);
    processor.start().await;

    let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
    let started_tx = Arc::new(parking_lot::Mutex::new(Some(started_tx)));
    let id = processor
        .submit_async_task(Task::new(Priority::High), move |ctx| {
            let started_tx = started_tx.clone();
            async move {
                if let Some(tx) = started_tx.lock().take() {
                    let _ = tx.send(());
                }
                ctx.cancelled().await;
                Ok::<_, anyhow::Error>(json!("ignored"))
            }
        })
        .await
        .unwrap();

    started_rx.await.unwrap();
    assert_eq!(processor.task_status(id), Some(TaskStatus::Running));
    assert!(processor.cancel(id));

    let result = processor.get_result(id, Some(Duration::from_secs(5))).await.unwrap();
    assert_eq!(result.error, Some(TaskError::Cancelled));
    assert_eq!(result.retry_count, 0);
    assert_eq!(processor.task_status(id), Some(TaskStatus::Cancelled));

    let stats = processor.get_stats();
    assert_eq!(stats.cancelled_tasks, 1);
    assert_eq!(stats.failed_tasks, 0);

    processor.stop().await;
}

#[tokio::test]
async fn test_cancel_unknown_task() {
    let processor = processor(fast_config(1));
    assert!(!processor.cancel(Uuid::new_v4()));
}
