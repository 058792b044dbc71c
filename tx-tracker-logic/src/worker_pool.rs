use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};

type Task = BoxFuture<'static, ()>;

/// Fixed number of workers draining a shared bounded task queue.
pub struct WorkerPool {
    sender: mpsc::Sender<Task>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// `capacity` bounds the number of queued tasks not yet picked up by a worker.
    pub fn new(workers: usize, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Task>(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = (0..workers.max(1))
            .map(|worker| {
                let receiver = receiver.clone();
                tokio::spawn(async move {
                    loop {
                        // the lock is released before the task runs
                        let task = receiver.lock().await.recv().await;
                        match task {
                            Some(task) => task.await,
                            None => break,
                        }
                    }
                    tracing::debug!(worker, "worker stopped");
                })
            })
            .collect();
        Self { sender, workers }
    }

    /// Queues a task, waiting while the queue is full.
    pub async fn submit<F>(&self, task: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.sender
            .send(Box::pin(task))
            .await
            .map_err(|_| anyhow::anyhow!("worker pool is closed"))
    }

    /// Stops accepting tasks and waits until every queued task has finished.
    pub async fn join(self) {
        drop(self.sender);
        for result in futures::future::join_all(self.workers).await {
            if let Err(err) = result {
                tracing::error!(err = ?err, "worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    #[tokio::test]
    async fn join_waits_for_all_tasks() {
        let pool = WorkerPool::new(3, 2);
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let done = done.clone();
            pool.submit(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                done.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        }
        pool.join().await;
        assert_eq!(done.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn runs_at_most_worker_count_tasks_at_once() {
        let pool = WorkerPool::new(2, 1);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for _ in 0..6 {
            let running = running.clone();
            let peak = peak.clone();
            pool.submit(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(1)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        }
        pool.join().await;
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_applies_backpressure() {
        let pool = WorkerPool::new(1, 1);
        let gate = Arc::new(tokio::sync::Notify::new());
        for _ in 0..2 {
            let gate = gate.clone();
            pool.submit(async move { gate.notified().await }).await.unwrap();
        }
        // one task running, one queued: the next submit must wait
        let blocked = tokio::time::timeout(Duration::from_secs(1), pool.submit(async {})).await;
        assert!(blocked.is_err());
        gate.notify_waiters();
    }
}
