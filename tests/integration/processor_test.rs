// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{fast_config, processor};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use taskforge::{Priority, Processor, Task, TaskError, TaskStatus};

#[tokio::test(flavor = "multi_thread")]
async fn test_higher_priority_runs_first() {
    let processor = processor(fast_config(1));
    let order = Arc::new(Mutex::new(Vec::new()));

    // 先全部入队再启动，唯一的工作器按优先级出队
    let mut ids = Vec::new();
    for priority in [Priority::Low, Priority::High, Priority::Medium] {
        let order = order.clone();
        let id = processor
            .submit_task(Task::new(priority), move |ctx| {
                order.lock().push(ctx.priority);
                Ok(json!(ctx.priority.to_string()))
            })
            .await
            .unwrap();
        ids.push(id);
    }

    processor.start().await;
    for id in ids {
        assert!(processor.get_result(id, None).await.unwrap().success);
    }
    processor.stop().await;

    assert_eq!(
        *order.lock(),
        vec![Priority::High, Priority::Medium, Priority::Low]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_equal_priority_is_fifo() {
    let processor = processor(fast_config(1));
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut ids = Vec::new();
    for name in ["A", "B", "C"] {
        let order = order.clone();
        let task = Task::new(Priority::Medium).with_payload(json!(name));
        let id = processor
            .submit_task(task, move |ctx| {
                order.lock().push(ctx.payload.clone());
                Ok(ctx.payload.clone())
            })
            .await
            .unwrap();
        ids.push(id);
    }

    processor.start().await;
    for id in ids {
        processor.get_result(id, None).await.unwrap();
    }
    processor.stop().await;

    assert_eq!(*order.lock(), vec![json!("A"), json!("B"), json!("C")]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_result_without_timeout_waits_until_done() {
    let processor = processor(fast_config(2));
    processor.start().await;

    let id = processor
        .submit_task(Task::new(Priority::High), |_| {
            std::thread::sleep(Duration::from_millis(300));
            Ok(json!("slow"))
        })
        .await
        .unwrap();

    let result = processor.get_result(id, None).await.unwrap();
    assert!(result.success);
    assert_eq!(result.result, Some(json!("slow")));
    assert!(result.execution_time >= Duration::from_millis(300));
    assert_eq!(processor.task_status(id), Some(TaskStatus::Completed));

    processor.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_result_is_consumed_once() {
    let processor = processor(fast_config(2));
    processor.start().await;

    let task = Task::new(Priority::Medium).with_metadata("source", json!("test"));
    let id = processor
        .submit_task(task, |ctx| Ok(json!(ctx.metadata.len())))
        .await
        .unwrap();

    let first = processor.get_result(id, Some(Duration::from_secs(5))).await;
    let first = first.unwrap();
    assert_eq!(first.task_id, id);
    assert_eq!(first.result, Some(json!(1)));
    assert_eq!(first.metadata.get("source"), Some(&json!("test")));

    let second = processor.get_result(id, Some(Duration::from_millis(200))).await;
    assert!(second.is_none());

    processor.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stats_account_for_every_task() {
    let processor = processor(fast_config(3));
    processor.start().await;

    let mut ids = Vec::new();
    for i in 0..10 {
        let id = processor
            .submit_task(Task::new(Priority::Medium), move |_| {
                if i % 3 == 0 {
                    anyhow::bail!("task {} failed", i);
                }
                Ok(json!(i))
            })
            .await
            .unwrap();
        ids.push(id);
    }

    for id in &ids {
        processor.get_result(*id, None).await.unwrap();
    }
    processor.stop().await;

    let stats = processor.get_stats();
    assert_eq!(stats.total_tasks, 10);
    assert_eq!(stats.completed_tasks, 6);
    assert_eq!(stats.failed_tasks, 4);
    assert_eq!(stats.cancelled_tasks, 0);
    assert_eq!(stats.queue_size, 0);
    assert_eq!(stats.pending_results, 0);
    assert!(stats.completed_tasks + stats.failed_tasks <= stats.total_tasks);
    assert!(stats.average_execution_time >= 0.0);
    assert_eq!(stats.resources.completed_tasks, 6);
    assert_eq!(stats.resources.failed_tasks, 4);
    assert_eq!(stats.resources.active_tasks, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_panicking_task_becomes_failure() {
    let processor = processor(fast_config(1));
    processor.start().await;

    let bad = processor
        .submit_task(Task::new(Priority::High), |_| -> anyhow::Result<serde_json::Value> {
            panic!("boom")
        })
        .await
        .unwrap();
    let good = processor
        .submit_task(Task::new(Priority::Low), |_| Ok(json!("still alive")))
        .await
        .unwrap();

    let bad = processor.get_result(bad, Some(Duration::from_secs(5))).await.unwrap();
    assert!(!bad.success);
    assert!(matches!(bad.error, Some(TaskError::Panicked(ref msg)) if msg.contains("boom")));

    let good = processor.get_result(good, Some(Duration::from_secs(5))).await.unwrap();
    assert!(good.success);

    processor.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_get_all_results_drains() {
    let processor = processor(fast_config(2));
    processor.start().await;

    let mut ids = Vec::new();
    for i in 0..4 {
        let id = processor
            .submit_task(Task::new(Priority::Medium), move |_| Ok(json!(i)))
            .await
            .unwrap();
        ids.push(id);
    }

    for _ in 0..100 {
        if processor.get_stats().pending_results == ids.len() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let all = processor.get_all_results();
    assert_eq!(all.len(), 4);
    for id in &ids {
        assert!(all.contains_key(id));
    }
    assert!(processor.get_all_results().is_empty());
    assert!(processor.get_result(ids[0], Some(Duration::from_millis(100))).await.is_none());

    processor.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_process_batch_returns_results_in_order() {
    let processor = processor(fast_config(4));
    processor.start().await;

    let items = (0..5)
        .map(|i| {
            let task = Task::new(Priority::Medium).with_payload(json!(i));
            let work = Processor::from_fn(|ctx| {
                let n = ctx.payload.as_i64().unwrap_or_default();
                std::thread::sleep(Duration::from_millis(10 * (5 - n as u64)));
                Ok(json!(n * n))
            });
            (task, work)
        })
        .collect::<Vec<_>>();

    let results = processor
        .process_batch(items, Some(Duration::from_secs(10)))
        .await
        .unwrap();

    let values: Vec<_> = results.iter().map(|r| r.result.clone()).collect();
    assert_eq!(
        values,
        vec![
            Some(json!(0)),
            Some(json!(1)),
            Some(json!(4)),
            Some(json!(9)),
            Some(json!(16))
        ]
    );

    processor.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_leaves_pending_tasks_for_restart() {
    let processor = processor(fast_config(1));
    processor.start().await;
    processor.stop().await;

    let id = processor
        .submit_task(Task::new(Priority::Medium), |_| Ok(json!("later")))
        .await
        .unwrap();
    assert!(processor
        .get_result(id, Some(Duration::from_millis(200)))
        .await
        .is_none());
    assert_eq!(processor.get_stats().queue_size, 1);

    processor.start().await;
    let result = processor.get_result(id, Some(Duration::from_secs(5))).await;
    assert_eq!(result.unwrap().result, Some(json!("later")));
    processor.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_result_survives_registry_removal_while_running() {
    let processor = processor(fast_config(1));
    processor.start().await;

    let id = processor
        .submit_task(Task::new(Priority::Medium), |_| {
            std::thread::sleep(Duration::from_millis(400));
            Ok(json!("done"))
        })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(processor.remove_task(id).is_some());
    assert_eq!(processor.task_status(id), None);
    assert!(processor.is_pending(id));

    let started = std::time::Instant::now();
    let result = processor.get_result(id, Some(Duration::from_secs(3))).await;
    assert_eq!(result.unwrap().result, Some(json!("done")));
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(processor.get_stats().pending_results, 0);
    assert!(!processor.is_pending(id));

    // 工作器循环没有因为注册表缺失而退避，下一个任务立即被处理
    let next = processor
        .submit_task(Task::new(Priority::Medium), |_| Ok(json!("next")))
        .await
        .unwrap();
    let next = processor.get_result(next, Some(Duration::from_millis(600))).await;
    assert_eq!(next.unwrap().result, Some(json!("next")));

    processor.stop().await;
}
