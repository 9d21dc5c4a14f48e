use anyhow::{Context, Result};
use std::future::Future;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::ui::UiDispatcher;

/// Handle to a spawned background task
///
/// Dropping the handle detaches the task. [`TaskHandle::cancel`] is
/// cooperative: the task observes it through the token it was given.
#[derive(Debug)]
pub struct TaskHandle<T> {
    name: String,
    token: CancellationToken,
    join: JoinHandle<T>,
}

impl<T> TaskHandle<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cancel(&self) {
        debug!("Cancelling task {}", self.name);
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Cancel and stop the task at its next await point.
    pub fn abort(&self) {
        self.token.cancel();
        self.join.abort();
    }

    /// Wait for the task to finish. Returns None if it panicked or was aborted.
    pub async fn join(self) -> Option<T> {
        match self.join.await {
            Ok(value) => Some(value),
            Err(e) if e.is_panic() => {
                error!("Task {} panicked: {}", self.name, e);
                None
            }
            Err(_) => {
                debug!("Task {} was aborted", self.name);
                None
            }
        }
    }
}

/// Spawns background work on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TaskSpawner {
    runtime: Handle,
}

impl TaskSpawner {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Spawner for the runtime the caller is running inside.
    pub fn current() -> Result<Self> {
        let runtime = Handle::try_current().context("No tokio runtime is running")?;
        Ok(Self::new(runtime))
    }

    /// Spawn an async task that receives its own cancellation token.
    pub fn spawn<F, Fut, T>(&self, name: &str, task: F) -> TaskHandle<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let token = CancellationToken::new();
        let join = self.runtime.spawn(task(token.clone()));
        debug!("Spawned task {}", name);

        TaskHandle {
            name: name.to_string(),
            token,
            join,
        }
    }

    /// Run blocking work on a dedicated background thread, fire-and-forget.
    pub fn run_detached<F>(&self, name: &str, task: F) -> TaskHandle<()>
    where
        F: FnOnce(CancellationToken) + Send + 'static,
    {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let join = self.runtime.spawn_blocking(move || task(task_token));

        TaskHandle {
            name: name.to_string(),
            token,
            join,
        }
    }

    /// Run blocking work in the background, then hand its result to
    /// `on_done` on the UI loop. A task cancelled before it finishes never
    /// reaches `on_done`.
    pub fn run_with_result<T, F, D>(
        &self,
        name: &str,
        ui: &UiDispatcher,
        task: F,
        on_done: D,
    ) -> TaskHandle<()>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> T + Send + 'static,
        D: FnOnce(T) + Send + 'static,
    {
        let ui = ui.clone();
        let task_name = name.to_string();

        self.run_detached(name, move |token| {
            let result = task(token.clone());
            Self::deliver(&task_name, &ui, &token, result, on_done);
        })
    }

    /// Async counterpart of [`TaskSpawner::run_with_result`].
    pub fn spawn_with_result<T, F, Fut, D>(
        &self,
        name: &str,
        ui: &UiDispatcher,
        task: F,
        on_done: D,
    ) -> TaskHandle<()>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        D: FnOnce(T) + Send + 'static,
    {
        let ui = ui.clone();
        let task_name = name.to_string();

        self.spawn(name, move |token| {
            let work = task(token.clone());
            async move {
                let result = work.await;
                Self::deliver(&task_name, &ui, &token, result, on_done);
            }
        })
    }

    fn deliver<T, D>(name: &str, ui: &UiDispatcher, token: &CancellationToken, result: T, on_done: D)
    where
        T: Send + 'static,
        D: FnOnce(T) + Send + 'static,
    {
        if token.is_cancelled() {
            debug!("Task {} cancelled, dropping its result", name);
            return;
        }
        if !ui.dispatch(move || on_done(result)) {
            warn!("Task {} finished after the UI loop closed", name);
        }
    }
}
