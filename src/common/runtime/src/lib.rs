//! Async runtime utilities for Federa.
//!
//! Queries are synchronous. The one asynchronous entry point, a directory
//! search dispatched to a background worker, runs on a [`BackgroundRuntime`]
//! and is observed through a [`TaskHandle`].

use std::future::Future;
use std::sync::Arc;

use common_config::RuntimeConfig;
use common_error::{FederaError, FederaResult};
use log::debug;
use tokio::runtime::{Builder, Runtime};

/// Get or create a Tokio runtime for blocking operations.
pub fn get_runtime() -> FederaResult<Runtime> {
    Runtime::new().map_err(|e| FederaError::InternalError(format!("Failed to create runtime: {e}")))
}

/// Block on a future using the default runtime.
pub fn block_on<F: Future>(future: F) -> FederaResult<F::Output> {
    let runtime = get_runtime()?;
    Ok(runtime.block_on(future))
}

/// A shared multi-thread runtime for background work.
#[derive(Debug, Clone)]
pub struct BackgroundRuntime {
    runtime: Arc<Runtime>,
}

impl BackgroundRuntime {
    /// Create a runtime with the tokio default worker count.
    pub fn new() -> FederaResult<Self> {
        Self::with_worker_threads(None)
    }

    /// Create a runtime sized by the `runtime` section of the configuration.
    pub fn from_config(config: &RuntimeConfig) -> FederaResult<Self> {
        Self::with_worker_threads(config.worker_threads)
    }

    /// Create a runtime with an explicit worker count.
    pub fn with_worker_threads(worker_threads: Option<usize>) -> FederaResult<Self> {
        let mut builder = Builder::new_multi_thread();
        builder.enable_time().thread_name("federa-background");
        if let Some(n) = worker_threads {
            builder.worker_threads(n.max(1));
        }
        let runtime = builder.build().map_err(|e| {
            FederaError::InternalError(format!("Failed to create background runtime: {e}"))
        })?;
        debug!("background runtime started, worker threads: {worker_threads:?}");
        Ok(Self {
            runtime: Arc::new(runtime),
        })
    }

    /// Run a blocking closure on the runtime's blocking pool.
    ///
    /// There is no cancellation: once dispatched the closure runs to
    /// completion, even if the handle is dropped.
    pub fn spawn_blocking<F, T>(&self, task: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        debug!("dispatching background task");
        TaskHandle {
            inner: self.runtime.spawn_blocking(task),
            runtime: Arc::clone(&self.runtime),
        }
    }
}

/// Handle to a task dispatched on a [`BackgroundRuntime`].
#[derive(Debug)]
pub struct TaskHandle<T> {
    inner: tokio::task::JoinHandle<T>,
    runtime: Arc<Runtime>,
}

impl<T: Send + 'static> TaskHandle<T> {
    /// Whether the task has finished. Never blocks.
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Block the calling thread until the task finishes.
    ///
    /// Must not be called from inside an async context.
    pub fn wait(self) -> FederaResult<T> {
        self.runtime
            .block_on(self.inner)
            .map_err(|e| FederaError::InternalError(format!("Background task failed: {e}")))
    }
}
