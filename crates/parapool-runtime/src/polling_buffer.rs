//! An `AsyncBuffer` fed by a pool of `PollingRunner`s, each polled in a loop and scaled by
//! observed idle/success streaks rather than by claim-time utilization alone.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;

use parapool_core::constants::POLL_SUCCESS_SCALE_UP_FACTOR;
use parapool_core::error::{PoolError, PoolResult};
use parapool_core::events::{BufferEvent, PoolEvent};
use parapool_core::runner::{FetchOutcome, PollingRunner};
use parapool_core::{diag_debug, diag_warn};

use crate::buffer::AsyncBuffer;
use crate::options::{AsyncBufferOptions, ConnectionPoolOptions};
use crate::pool::ScalingConnectionPool;

/// Composes a [`ScalingConnectionPool`] of pollers with an [`AsyncBuffer`] sink: each poller is
/// claimed, polled in a loop pushing batches into the buffer, and released back when it goes
/// idle (`FetchOutcome::Timeout`/`Empty`) so the pool's own elasticity can reclaim it.
///
/// This is composition, not inheritance — `PollingAsyncBuffer` owns a pool and a buffer rather
/// than being one, mirroring how the pool itself is independent of any particular poll loop.
pub struct PollingAsyncBuffer<T: Send + 'static> {
    buffer: AsyncBuffer<T>,
    pool: Arc<ScalingConnectionPool<PollWrapper<T>>>,
    driver: JoinHandle<()>,
}

impl<T: Send + 'static> PollingAsyncBuffer<T> {
    /// Construct a polling buffer, spawning the poll-driver task that keeps claiming and polling
    /// runners for as long as the buffer runs.
    pub fn new<R, F>(factory: F, buffer_options: AsyncBufferOptions, pool_options: ConnectionPoolOptions) -> Self
    where
        R: PollingRunner<T> + 'static,
        F: Fn() -> PoolResult<R> + Send + Sync + 'static,
    {
        let buffer = AsyncBuffer::new(buffer_options);
        let pool = ScalingConnectionPool::new(
            move || -> PoolResult<PollWrapper<T>> {
                Ok(PollWrapper::new(factory()?))
            },
            pool_options,
        );

        let driver_buffer = buffer.clone();
        let driver_pool = pool.clone();
        let min_instances = pool_options.min_instances;
        let driver = tokio::spawn(async move {
            poll_driver(driver_pool, driver_buffer, min_instances).await;
        });

        Self { buffer, pool, driver }
    }

    /// Pop the next item, suspending while empty.
    pub async fn pop(&self) -> Option<T> {
        self.buffer.pop().await
    }

    /// Subscribe to buffer push/pop notifications.
    pub fn subscribe_buffer(&self) -> tokio::sync::broadcast::Receiver<BufferEvent> {
        self.buffer.subscribe()
    }

    /// Subscribe to pool scaling notifications.
    pub fn subscribe_pool(&self) -> tokio::sync::broadcast::Receiver<PoolEvent> {
        self.pool.subscribe()
    }

    /// Current number of buffered items.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Current poller instance count.
    pub fn instance_count(&self) -> usize {
        self.pool.instance_count()
    }

    /// Ordered shutdown: drain the buffer, then quit the pool, matching the teacher's
    /// quit-inner-before-outer convention for composed resources.
    pub async fn quit(self) {
        self.driver.abort();
        self.pool.quit().await;
        self.buffer.quit().await;
    }
}

/// Wraps a `PollingRunner<T>` as a plain `Runner` so it can live in a `ScalingConnectionPool`;
/// the pool only ever calls `quit` on it, while `poll_driver` calls `fetch` through the claim
/// guard directly.
pub struct PollWrapper<T> {
    inner: Option<Box<dyn PollingRunnerObj<T>>>,
}

/// Object-safe facade over `PollingRunner<T>`, needed because the pool stores `PollWrapper<T>` as
/// a single concrete type regardless of which concrete `R: PollingRunner<T>` backs it.
trait PollingRunnerObj<T>: Send {
    fn fetch_boxed<'a>(
        &'a mut self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<FetchOutcome<T>, String>> + Send + 'a>>;
    fn quit_boxed(self: Box<Self>) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), String>> + Send>>;
}

impl<T, R> PollingRunnerObj<T> for R
where
    R: PollingRunner<T>,
{
    fn fetch_boxed<'a>(
        &'a mut self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<FetchOutcome<T>, String>> + Send + 'a>> {
        Box::pin(self.fetch())
    }

    fn quit_boxed(self: Box<Self>) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), String>> + Send>> {
        Box::pin((*self).quit())
    }
}

impl<T: Send + 'static> PollWrapper<T> {
    fn new<R: PollingRunner<T> + 'static>(runner: R) -> Self {
        Self {
            inner: Some(Box::new(runner)),
        }
    }

    async fn fetch(&mut self) -> Result<FetchOutcome<T>, String> {
        self.inner
            .as_mut()
            .expect("runner present until quit")
            .fetch_boxed()
            .await
    }
}

impl<T: Send + 'static> parapool_core::runner::Runner for PollWrapper<T> {
    async fn quit(mut self) -> Result<(), String> {
        match self.inner.take() {
            Some(inner) => inner.quit_boxed().await,
            None => Ok(()),
        }
    }
}

/// One worker per live instance: claims it, fetches once, reacts, releases or discards, repeats.
/// A success streak beyond `POLL_SUCCESS_SCALE_UP_FACTOR * instance_count` scales the pool up and
/// spawns a sibling worker to drive the new instance; an idle (`Timeout`/`Empty`) outcome tries to
/// discard the instance, and a successful discard ends this worker, shrinking concurrency to match.
///
/// `min_instances` workers are seeded directly at startup rather than in response to the pool's
/// own `Available` broadcast, since subscribing only after construction could race the initial
/// convergence-to-min scale-ups and miss their `Available` events; `pool.claim` blocks
/// unconditionally until an instance exists, so seeding is race-free regardless of startup timing.
async fn poll_driver<T: Send + 'static>(
    pool: Arc<ScalingConnectionPool<PollWrapper<T>>>,
    buffer: AsyncBuffer<T>,
    min_instances: usize,
) {
    let success_count = Arc::new(AtomicUsize::new(0));
    let mut workers = Vec::new();
    for _ in 0..min_instances.max(1) {
        workers.push(spawn_poll_worker(pool.clone(), buffer.clone(), success_count.clone()));
    }
    for worker in workers {
        let _ = worker.await;
    }
}

fn spawn_poll_worker<T: Send + 'static>(
    pool: Arc<ScalingConnectionPool<PollWrapper<T>>>,
    buffer: AsyncBuffer<T>,
    success_count: Arc<AtomicUsize>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            // `claim`/`fetch` on an idle, at-floor instance can both resolve without ever
            // suspending, which would otherwise spin this task forever without yielding to the
            // executor — fatal on a current-thread runtime where nothing else could ever run.
            tokio::task::yield_now().await;
            buffer.wait_for_space().await;
            let mut guard = match pool.claim().await {
                Ok(g) => g,
                Err(PoolError::Quitting) => return,
                Err(e) => {
                    diag_warn!("poll worker failed to claim an instance: {e}");
                    return;
                }
            };

            match guard.get_mut().fetch().await {
                Ok(FetchOutcome::Batch(items)) if !items.is_empty() => {
                    let len = items.len();
                    for item in items {
                        if buffer.push(item).await.is_err() {
                            return;
                        }
                    }
                    drop(guard);
                    let streak = success_count.fetch_add(1, Ordering::SeqCst) + 1;
                    diag_debug!("poller produced batch of {len} items (streak {streak})");
                    let instances = pool.instance_count().max(1);
                    if streak > POLL_SUCCESS_SCALE_UP_FACTOR * instances {
                        success_count.store(0, Ordering::SeqCst);
                        pool.scale_up().await;
                        spawn_poll_worker(pool.clone(), buffer.clone(), success_count.clone());
                    }
                }
                Ok(other) => {
                    debug_assert!(other.is_idle() || matches!(other, FetchOutcome::Batch(_)));
                    success_count.store(0, Ordering::SeqCst);
                    if !pool.is_scaling() && guard.discard().await {
                        return;
                    }
                }
                Err(e) => {
                    diag_warn!("poller fetch failed: {e}");
                    drop(guard);
                }
            }
        }
    })
}
