//! Periodic background tasks

use crate::utils::error::{ObservabilityError, Result};
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

/// Owns the pipeline's named background tasks
///
/// Each task runs on its own tokio task and can be aborted or replaced
/// independently of the others. Scheduling a name that is already taken
/// aborts the old task before the new one is stored, under one lock.
#[derive(Debug, Default)]
pub struct TaskScheduler {
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `job` every `period`, starting one period from now
    ///
    /// A panic inside one run is logged and the next tick runs as usual.
    pub fn schedule<F, Fut>(&self, name: &str, period: Duration, job: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if period.is_zero() {
            return Err(ObservabilityError::validation(format!(
                "task {} needs a positive period",
                name
            )));
        }

        let task_name = name.to_string();
        self.spawn(name, async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                if AssertUnwindSafe(async { job().await })
                    .catch_unwind()
                    .await
                    .is_err()
                {
                    error!(task = %task_name, "Background task run panicked");
                }
            }
        });
        Ok(())
    }

    /// Run an arbitrary long-lived future under `name`, replacing any task of that name
    pub fn spawn<Fut>(&self, name: &str, task: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock();
        if let Some(previous) = tasks.remove(name) {
            previous.abort();
            debug!(task = %name, "Rescheduling background task");
        } else {
            debug!(task = %name, "Scheduling background task");
        }
        tasks.insert(name.to_string(), tokio::spawn(task));
    }

    /// Abort one task
    pub fn cancel(&self, name: &str) -> bool {
        match self.tasks.lock().remove(name) {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    /// Abort every task, returning how many were running
    pub fn cancel_all(&self) -> usize {
        let tasks: Vec<_> = self.tasks.lock().drain().collect();
        let count = tasks.len();
        for (_, task) in tasks {
            task.abort();
        }
        count
    }

    /// Abort every task and wait until each has stopped
    ///
    /// Once this returns no task is left mid-run, so anything a task had
    /// taken and puts back on drop is back in place.
    pub async fn shutdown(&self) -> usize {
        let tasks: Vec<_> = self.tasks.lock().drain().collect();
        let count = tasks.len();
        for (_, task) in &tasks {
            task.abort();
        }
        for (name, task) in tasks {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!(task = %name, "Background task panicked");
                }
            }
        }
        count
    }

    pub fn is_scheduled(&self, name: &str) -> bool {
        self.tasks
            .lock()
            .get(name)
            .is_some_and(|task| !task.is_finished())
    }

    /// Names of the scheduled tasks, sorted
    pub fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        for (_, task) in self.tasks.get_mut().drain() {
            task.abort();
        }
    }
}
