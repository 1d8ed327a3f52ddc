//! Bounded worker pool over a shared task queue.
//!
//! One mpsc channel feeds every worker; the receiver sits behind an async
//! mutex so workers pull tasks whenever they go idle. Shutdown is one `None`
//! sentinel per worker: a worker that receives the sentinel exits its loop,
//! and `join` waits for all of them. Enqueueing blocks once the queue is
//! full, which is the backpressure that keeps producers from racing ahead
//! of the workers.

use std::future::Future;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// A worker's handle on the shared queue.
pub struct TaskQueue<T> {
    rx: Arc<Mutex<mpsc::Receiver<Option<T>>>>,
}

impl<T> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<T> TaskQueue<T> {
    /// Next task, or `None` once a shutdown sentinel arrives or the channel
    /// closes. Each sentinel stops exactly one worker.
    pub async fn next(&self) -> Option<T> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(Some(task)) => Some(task),
            _ => None,
        }
    }
}

pub struct WorkerPool<T> {
    tx: mpsc::Sender<Option<T>>,
    workers: Vec<JoinHandle<Result<()>>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Spawns `count` workers, each running the future produced by
    /// `worker(id, queue)`. Workers own the only clones of the queue, so
    /// once every worker has exited the channel closes and `enqueue`
    /// fails fast instead of blocking forever.
    pub fn spawn<F, Fut>(count: usize, queue_depth: usize, worker: F) -> Self
    where
        F: Fn(usize, TaskQueue<T>) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let workers = (0..count.max(1))
            .map(|id| {
                let queue = TaskQueue { rx: rx.clone() };
                tokio::spawn(worker(id, queue))
            })
            .collect();
        Self { tx, workers }
    }

    /// Hands a task to the pool, waiting while the queue is full.
    pub async fn enqueue(&self, task: T) -> Result<()> {
        self.tx
            .send(Some(task))
            .await
            .map_err(|_| anyhow!("all workers have exited"))
    }

    /// Sends one sentinel per worker and waits for every worker to finish.
    /// The first worker error is returned after all workers have stopped.
    pub async fn join(self) -> Result<()> {
        for _ in 0..self.workers.len() {
            if self.tx.send(None).await.is_err() {
                break;
            }
        }
        drop(self.tx);

        let mut first_err = None;
        for (id, handle) in self.workers.into_iter().enumerate() {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    if first_err.is_none() {
                        first_err = Some(err.context(format!("worker {id} failed")));
                    }
                }
                Err(err) => {
                    if first_err.is_none() {
                        first_err = Some(anyhow!("worker {id} panicked: {err}"));
                    }
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
