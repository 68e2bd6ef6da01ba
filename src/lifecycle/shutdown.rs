//! Shutdown coordination for the balancer daemon.

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

/// Owns the long-running tasks and the channel that tells them to stop.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            tasks: Vec::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Spawn a task that receives its own shutdown subscription.
    pub fn spawn<F, Fut>(&mut self, name: &'static str, task: F)
    where
        F: FnOnce(broadcast::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task(self.subscribe()));
        self.track(name, handle);
    }

    /// Track a task that was spawned elsewhere.
    pub fn track(&mut self, name: &'static str, handle: JoinHandle<()>) {
        tracing::debug!(task = name, "Tracking task");
        self.tasks.push((name, handle));
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Signal every task and wait up to `grace` for each to finish.
    /// Returns how many had to be aborted.
    pub async fn drain(self, grace: Duration) -> usize {
        self.trigger();
        let deadline = time::Instant::now() + grace;

        let mut aborted = 0;
        for (name, mut handle) in self.tasks {
            match time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => tracing::debug!(task = name, "Task stopped"),
                Ok(Err(e)) => tracing::error!(task = name, error = %e, "Task failed"),
                Err(_) => {
                    tracing::warn!(task = name, "Task did not stop in time, aborting");
                    handle.abort();
                    aborted += 1;
                }
            }
        }
        aborted
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn drains_cooperative_tasks() {
        let mut shutdown = Shutdown::new();
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = stopped.clone();
        shutdown.spawn("worker", move |mut rx| async move {
            let _ = rx.recv().await;
            flag.store(true, Ordering::SeqCst);
        });
        assert_eq!(shutdown.task_count(), 1);

        assert_eq!(shutdown.drain(Duration::from_secs(1)).await, 0);
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn aborts_stragglers_after_grace() {
        let mut shutdown = Shutdown::new();
        shutdown.spawn("stubborn", |_rx| async {
            time::sleep(Duration::from_secs(3600)).await;
        });
        shutdown.spawn("polite", |mut rx| async move {
            let _ = rx.recv().await;
        });

        assert_eq!(shutdown.drain(Duration::from_secs(5)).await, 1);
    }
}
