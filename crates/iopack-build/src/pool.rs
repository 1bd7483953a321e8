use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::{self, JoinSet};
use tracing::{debug, error};

use crate::error::{BuildError, BuildResult};

/// Bounded pool for CPU-heavy stages.
///
/// Every item runs on tokio's blocking pool while holding a semaphore
/// permit, so at most `workers` jobs execute at once. Results flow back over
/// a channel to the single caller of [`WorkerPool::map`], which returns only
/// after every job has finished.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Apply `job` to every item. Results are returned in input order.
    pub async fn map<T, R, F>(&self, items: Vec<T>, job: F) -> BuildResult<Vec<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        let count = items.len();
        let job = Arc::new(job);
        let (results, mut received) = mpsc::channel(count.max(1));
        let mut tasks: JoinSet<BuildResult<()>> = JoinSet::new();

        for (index, item) in items.into_iter().enumerate() {
            let permits = Arc::clone(&self.permits);
            let job = Arc::clone(&job);
            let results = results.clone();
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| BuildError::Worker(e.to_string()))?;
                let output = task::spawn_blocking(move || job(item))
                    .await
                    .map_err(|e| BuildError::Worker(e.to_string()))?;
                results
                    .send((index, output))
                    .await
                    .map_err(|_| BuildError::Worker("result channel closed".into()))
            });
        }
        drop(results);

        let mut slots: Vec<Option<R>> = (0..count).map(|_| None).collect();
        while let Some((index, output)) = received.recv().await {
            slots[index] = Some(output);
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => result?,
                Err(join_error) => {
                    error!(error = %join_error, "worker task join error");
                    return Err(BuildError::Worker(join_error.to_string()));
                }
            }
        }

        debug!(jobs = count, workers = self.workers, "worker pool batch complete");
        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| BuildError::Worker(format!("job {index} produced no result")))
            })
            .collect()
    }
}
