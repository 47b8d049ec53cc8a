// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{fast_config, processor};
use serde_json::json;
use std::time::Duration;
use taskforge::{Priority, ProcessorConfig, ProcessorType, Task};

fn thread_name() -> String {
    std::thread::current().name().unwrap_or_default().to_string()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_async_tasks_run_on_dedicated_runtime() {
    let config = ProcessorConfig {
        processor_type: ProcessorType::Async,
        ..fast_config(2)
    };
    let processor = processor(config);
    processor.start().await;

    let mut ids = Vec::new();
    for i in 0..3 {
        let id = processor
            .submit_async_task(Task::new(Priority::Medium).with_payload(json!(i)), |ctx| async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, anyhow::Error>(json!({ "thread": thread_name(), "payload": ctx.payload }))
            })
            .await
            .unwrap();
        ids.push(id);
    }

    for (i, id) in ids.into_iter().enumerate() {
        let result = processor.get_result(id, Some(Duration::from_secs(5))).await.unwrap();
        let value = result.result.unwrap();
        assert_eq!(value["thread"], json!("taskforge-async"));
        assert_eq!(value["payload"], json!(i));
    }

    processor.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sync_tasks_under_async_type_use_blocking_pool() {
    let config = ProcessorConfig {
        processor_type: ProcessorType::Async,
        ..fast_config(1)
    };
    let processor = processor(config);
    processor.start().await;

    let id = processor
        .submit_task(Task::new(Priority::Low), |_| Ok(json!(thread_name())))
        .await
        .unwrap();
    let result = processor.get_result(id, Some(Duration::from_secs(5))).await.unwrap();
    assert_ne!(result.result, Some(json!("taskforge-async")));

    processor.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_process_type_runs_each_attempt_on_own_thread() {
    let config = ProcessorConfig {
        processor_type: ProcessorType::Process,
        ..fast_config(2)
    };
    let processor = processor(config);
    processor.start().await;

    let id = processor
        .submit_task(Task::new(Priority::Medium), |_| Ok(json!(thread_name())))
        .await
        .unwrap();
    let result = processor.get_result(id, Some(Duration::from_secs(5))).await.unwrap();
    assert_eq!(result.result, Some(json!("taskforge-worker")));

    processor.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_mixed_sync_and_async_tasks() {
    let processor = processor(fast_config(2));
    processor.start().await;

    let sync_id = processor
        .submit_task(Task::new(Priority::Medium), |_| Ok(json!("sync")))
        .await
        .unwrap();
    let async_id = processor
        .submit_async_task(Task::new(Priority::Medium), |_| async { Ok::<_, anyhow::Error>(json!("async")) })
        .await
        .unwrap();

    let sync_result = processor.get_result(sync_id, Some(Duration::from_secs(5))).await;
    let async_result = processor.get_result(async_id, Some(Duration::from_secs(5))).await;
    assert_eq!(sync_result.unwrap().result, Some(json!("sync")));
    assert_eq!(async_result.unwrap().result, Some(json!("async")));

    processor.stop().await;
}
