//! Background task registry
//!
//! Owns the join handles of every long-running background task so that
//! shutdown can await them instead of leaving them orphaned.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::Result;

/// Background task states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    /// Task is running
    Running,
    /// Task returned normally
    Stopped,
    /// Task returned an error or panicked
    Failed,
}

impl ComponentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ComponentState::Stopped | ComponentState::Failed)
    }
}

impl std::fmt::Display for ComponentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentState::Running => write!(f, "running"),
            ComponentState::Stopped => write!(f, "stopped"),
            ComponentState::Failed => write!(f, "failed"),
        }
    }
}

struct TrackedTask {
    name: String,
    handle: JoinHandle<()>,
}

/// Registry of spawned background tasks
#[derive(Clone, Default)]
pub struct TaskSet {
    tasks: Arc<Mutex<Vec<TrackedTask>>>,
    states: Arc<Mutex<HashMap<String, ComponentState>>>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a named task; its outcome is recorded and logged when it ends
    pub fn spawn<F>(&self, name: &str, fut: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let task_name = name.to_string();
        let states = Arc::clone(&self.states);
        set_state(&states, &task_name, ComponentState::Running);

        let handle = tokio::spawn({
            let task_name = task_name.clone();
            async move {
                match fut.await {
                    Ok(()) => {
                        debug!("Task {} finished", task_name);
                        set_state(&states, &task_name, ComponentState::Stopped);
                    }
                    Err(e) => {
                        error!("Task {} failed: {}", task_name, e);
                        set_state(&states, &task_name, ComponentState::Failed);
                    }
                }
            }
        });

        info!("Started background task: {}", name);
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(TrackedTask {
                name: task_name,
                handle,
            });
        }
    }

    /// Current state of every task ever spawned
    pub fn states(&self) -> HashMap<String, ComponentState> {
        self.states
            .lock()
            .map(|states| states.clone())
            .unwrap_or_default()
    }

    pub fn state(&self, name: &str) -> Option<ComponentState> {
        self.states.lock().ok()?.get(name).copied()
    }

    /// Await every task, aborting the ones still running after `timeout`.
    ///
    /// Tasks are expected to have been told to stop already (shutdown token
    /// or their own stop method).
    pub async fn join_all(&self, timeout: Duration) {
        let tasks: Vec<TrackedTask> = match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(_) => return,
        };

        let deadline = Instant::now() + timeout;
        info!("Joining {} background tasks", tasks.len());

        for task in tasks {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let abort = task.handle.abort_handle();
            match tokio::time::timeout(remaining, task.handle).await {
                Ok(Ok(())) => debug!("Task {} joined", task.name),
                Ok(Err(e)) => {
                    error!("Task {} panicked or was aborted: {}", task.name, e);
                    set_state(&self.states, &task.name, ComponentState::Failed);
                }
                Err(_) => {
                    warn!("Task {} did not stop within {:?}, aborting", task.name, timeout);
                    abort.abort();
                    set_state(&self.states, &task.name, ComponentState::Stopped);
                }
            }
        }
    }
}

fn set_state(states: &Mutex<HashMap<String, ComponentState>>, name: &str, state: ComponentState) {
    if let Ok(mut states) = states.lock() {
        states.insert(name.to_string(), state);
    }
}
