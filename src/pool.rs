//! Fixed-size worker pool: the async analogue of a `std::queue` guarded
//! by a mutex and condition variable. Here the queue is a bounded
//! `tokio::sync::mpsc` channel and the condition variable is whatever
//! `tokio`'s scheduler uses to wake a task blocked on `recv`; the pool
//! still has exactly `NUM_WORKERS` workers pulling one task at a time.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const NUM_WORKERS: usize = 100;
const QUEUE_CAPACITY: usize = 1024;

type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub struct WorkerPool {
    sender: mpsc::Sender<Task>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns [`NUM_WORKERS`] tokio tasks, each looping on `recv` from a
    /// shared queue. The channel is bounded: `enqueue` backpressures the
    /// caller rather than growing without limit when workers fall
    /// behind.
    pub fn new() -> Self {
        Self::with_workers(NUM_WORKERS)
    }

    /// Same as [`WorkerPool::new`] but with an explicit worker count,
    /// letting `main` honour [`crate::config::Config::num_workers`]
    /// instead of always spawning the fixed default.
    pub fn with_workers(num_workers: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Task>(QUEUE_CAPACITY);
        let receiver = std::sync::Arc::new(tokio::sync::Mutex::new(receiver));

        let workers = (0..num_workers)
            .map(|_| {
                let receiver = receiver.clone();
                tokio::spawn(async move {
                    loop {
                        let task = {
                            let mut guard = receiver.lock().await;
                            guard.recv().await
                        };
                        match task {
                            Some(task) => task.await,
                            None => break,
                        }
                    }
                })
            })
            .collect();

        Self { sender, workers }
    }

    /// Enqueues a task for the next free worker. Fails only once every
    /// worker has shut down and the channel's receiver side is gone.
    pub async fn enqueue<F>(&self, task: F) -> Result<(), ()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.sender.send(Box::pin(task)).await.map_err(|_| ())
    }

    /// Drops the sender so workers exit their `recv` loop once the queue
    /// drains, then waits for all of them to finish.
    pub async fn shutdown(self) {
        drop(self.sender);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}
