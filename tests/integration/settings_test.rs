// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde_json::json;
use std::io::Write;
use std::time::Duration;
use taskforge::{LoadBalancer, ParallelProcessor, Priority, ProcessorType, Settings, Task};

fn settings_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[tokio::test(flavor = "multi_thread")]
async fn test_processor_from_settings_file() {
    let file = settings_file(
        r#"
[processor]
max_workers = 2
processor_type = "process"
retry_count = 0
enable_load_balancing = false
poll_interval_secs = 0.05
"#,
    );
    let settings = Settings::from_file(file.path()).unwrap();
    let processor = ParallelProcessor::from_settings(&settings).unwrap();
    assert_eq!(processor.config().max_workers, 2);
    assert_eq!(processor.config().processor_type, ProcessorType::Process);
    assert_eq!(processor.config().poll_interval, Duration::from_millis(50));

    processor.start().await;
    let id = processor
        .submit_task(Task::new(Priority::Medium), |_| Ok(json!("configured")))
        .await
        .unwrap();
    let result = processor.get_result(id, Some(Duration::from_secs(5))).await;
    assert_eq!(result.unwrap().result, Some(json!("configured")));
    processor.stop().await;
}

#[test]
fn test_load_balancer_from_settings_file() {
    let file = settings_file(
        r#"
[load_balancer]
instances = 4
"#,
    );
    let settings = Settings::from_file(file.path()).unwrap();
    let balancer = LoadBalancer::from_settings(&settings).unwrap();
    assert_eq!(balancer.processors().len(), 4);
}

#[test]
fn test_zero_instances_is_rejected() {
    let file = settings_file(
        r#"
[load_balancer]
instances = 0
"#,
    );
    let settings = Settings::from_file(file.path()).unwrap();
    assert!(LoadBalancer::from_settings(&settings).is_err());
}

#[test]
fn test_invalid_worker_count_is_rejected() {
    let file = settings_file(
        r#"
[processor]
max_workers = 0
"#,
    );
    let settings = Settings::from_file(file.path()).unwrap();
    assert!(ParallelProcessor::from_settings(&settings).is_err());
}
