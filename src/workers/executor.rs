// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::thread;
use std::time::Duration;
use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;
use tokio::task::{AbortHandle, JoinError};
use tracing::{info, warn};

use crate::config::processor_config::ProcessorType;
use crate::domain::models::task::{Processor, TaskContext};
use crate::domain::models::task_result::TaskError;

/// 单独线程上的 current-thread 运行时，用于执行异步处理器
struct DedicatedRuntime {
    handle: Handle,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl DedicatedRuntime {
    fn start() -> std::io::Result<Self> {
        let (handle_tx, handle_rx) = std::sync::mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread = thread::Builder::new()
            .name("taskforge-async".to_string())
            .spawn(move || {
                let runtime = match Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = handle_tx.send(Err(e));
                        return;
                    }
                };
                let _ = handle_tx.send(Ok(runtime.handle().clone()));
                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });
            })?;

        let handle = match handle_rx.recv() {
            Ok(result) => result?,
            Err(_) => {
                return Err(std::io::Error::other(
                    "async runtime thread exited before start",
                ))
            }
        };

        Ok(Self {
            handle,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            match tokio::task::spawn_blocking(move || thread.join()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => warn!("Async runtime thread panicked"),
                Err(e) => warn!("Failed to join async runtime thread: {}", e),
            }
        }
    }
}

impl Drop for DedicatedRuntime {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// 超时或取消时中止已派发的异步任务
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// 执行后端
///
/// 负责把一次尝试派发到合适的执行环境并施加超时：
///
/// * 同步处理器：`Thread`/`Async` 使用 tokio 阻塞线程池，`Process` 每次尝试使用独立线程；
/// * 异步处理器：`Async` 类型在专用运行时线程上执行（启动失败时回退到当前运行时），
///   其他类型在当前运行时上执行。
///
/// 超时后同步处理器所在线程无法被强制终止，只是不再等待其结果。
pub struct ExecutionBackend {
    processor_type: ProcessorType,
    timeout: Duration,
    async_handle: Option<Handle>,
    runtime: Mutex<Option<DedicatedRuntime>>,
}

impl ExecutionBackend {
    pub fn new(processor_type: ProcessorType, timeout: Duration) -> Self {
        let runtime = if processor_type == ProcessorType::Async {
            match DedicatedRuntime::start() {
                Ok(runtime) => {
                    info!("Dedicated async runtime started");
                    Some(runtime)
                }
                Err(e) => {
                    warn!(
                        "Failed to start dedicated async runtime, falling back to the shared runtime: {}",
                        e
                    );
                    None
                }
            }
        } else {
            None
        };

        Self {
            processor_type,
            timeout,
            async_handle: runtime.as_ref().map(|runtime| runtime.handle.clone()),
            runtime: Mutex::new(runtime),
        }
    }

    pub fn processor_type(&self) -> ProcessorType {
        self.processor_type
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 是否拥有专用异步运行时
    pub fn has_dedicated_runtime(&self) -> bool {
        self.runtime.lock().is_some()
    }

    /// 执行一次尝试
    ///
    /// 超时返回 [`TaskError::Timeout`]；上下文中的取消令牌被触发时返回
    /// [`TaskError::Cancelled`]。
    pub async fn run_attempt(
        &self,
        processor: &Processor,
        ctx: TaskContext,
    ) -> Result<Value, TaskError> {
        let token = ctx.cancellation_token().clone();
        let attempt = self.dispatch(processor, ctx);

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(TaskError::Cancelled),
            outcome = tokio::time::timeout(self.timeout, attempt) => match outcome {
                Ok(result) => result,
                Err(_) => Err(TaskError::Timeout(self.timeout)),
            },
        }
    }

    fn dispatch(
        &self,
        processor: &Processor,
        ctx: TaskContext,
    ) -> BoxFuture<'static, Result<Value, TaskError>> {
        match processor {
            Processor::Sync(f) => {
                let f = f.clone();
                match self.processor_type {
                    ProcessorType::Process => run_on_dedicated_thread(move || f(&ctx)),
                    ProcessorType::Thread | ProcessorType::Async => {
                        let handle = tokio::task::spawn_blocking(move || f(&ctx));
                        async move { join_outcome(handle.await) }.boxed()
                    }
                }
            }
            Processor::Async(f) => {
                let future = f(ctx);
                let handle = match &self.async_handle {
                    Some(runtime) => runtime.spawn(future),
                    None => tokio::spawn(future),
                };
                let guard = AbortOnDrop(handle.abort_handle());
                async move {
                    let outcome = join_outcome(handle.await);
                    drop(guard);
                    outcome
                }
                .boxed()
            }
        }
    }

    /// 关闭专用运行时并等待其线程退出
    pub async fn shutdown(&self) {
        let runtime = self.runtime.lock().take();
        if let Some(mut runtime) = runtime {
            runtime.shutdown().await;
            info!("Dedicated async runtime stopped");
        }
    }
}

fn run_on_dedicated_thread<F>(f: F) -> BoxFuture<'static, Result<Value, TaskError>>
where
    F: FnOnce() -> anyhow::Result<Value> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let spawned = thread::Builder::new()
        .name("taskforge-worker".to_string())
        .spawn(move || {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(f));
            let _ = tx.send(outcome);
        });

    async move {
        if let Err(e) = spawned {
            return Err(TaskError::Execution(format!(
                "failed to spawn worker thread: {}",
                e
            )));
        }
        match rx.await {
            Ok(Ok(result)) => result.map_err(TaskError::from),
            Ok(Err(panic)) => Err(TaskError::Panicked(panic_message(panic.as_ref()))),
            Err(_) => Err(TaskError::Panicked(
                "worker thread dropped its result".to_string(),
            )),
        }
    }
    .boxed()
}

fn join_outcome(outcome: Result<anyhow::Result<Value>, JoinError>) -> Result<Value, TaskError> {
    match outcome {
        Ok(result) => result.map_err(TaskError::from),
        Err(e) if e.is_panic() => Err(TaskError::Panicked(panic_message(e.into_panic().as_ref()))),
        Err(_) => Err(TaskError::Cancelled),
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
