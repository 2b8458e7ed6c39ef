//! Integration tests exercising the concrete timing/scaling scenarios that don't fit naturally
//! as inline unit tests: they cross the executor/pool/polling-buffer boundary and depend on real
//! (if short) timing, so they live here against `tokio`'s test harness rather than in any single
//! module's `#[cfg(test)]` block.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use parapool::{
    execute, AsyncBufferOptions, CallbackFailure, ConnectionPoolOptions, ExecutorConfig,
    FetchOutcome, PollingAsyncBuffer, PollingRunner, Runner, ScalingConnectionPool, Source,
};

#[tokio::test]
async fn scenario_varying_parallelism_scales_total_time() {
    async fn run_with_parallel(parallel: usize) -> Duration {
        let source = Source::<u32, ()>::from_iter(1..=10u32);
        let start = std::time::Instant::now();
        let result = execute(
            source,
            |v, _init: Option<Arc<()>>| async move {
                tokio::time::sleep(Duration::from_millis(10 * v as u64)).await;
                Ok::<_, CallbackFailure>(v)
            },
            ExecutorConfig::default().with_parallel(parallel),
            None::<fn(Option<Arc<()>>) -> std::future::Ready<()>>,
        )
        .await
        .unwrap();
        assert_eq!(result.fulfilled, 10);
        let mut values = result.results;
        values.sort();
        assert_eq!(values, (1..=10).collect::<Vec<_>>());
        start.elapsed()
    }

    let t1 = run_with_parallel(1).await;
    let t4 = run_with_parallel(4).await;
    // Looser bound than a strict wall-clock assertion: higher parallelism must meaningfully
    // shrink total time for a workload this skewed, without pinning an exact ratio.
    assert!(t4 < t1 / 2, "parallel=4 ({t4:?}) should be well under half of parallel=1 ({t1:?})");
}

struct CountingRunner {
    id: usize,
    created: Arc<AtomicUsize>,
    destroyed: Arc<AtomicUsize>,
}

impl Runner for CountingRunner {
    async fn quit(self) -> Result<(), String> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn scenario_pool_converges_after_claim_burst() {
    let next_id = Arc::new(AtomicUsize::new(0));
    let created = Arc::new(AtomicUsize::new(0));
    let destroyed = Arc::new(AtomicUsize::new(0));

    let nid = next_id.clone();
    let c = created.clone();
    let d = destroyed.clone();
    let pool = ScalingConnectionPool::new(
        move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(CountingRunner {
                id: nid.fetch_add(1, Ordering::SeqCst),
                created: c.clone(),
                destroyed: d.clone(),
            })
        },
        ConnectionPoolOptions::default()
            .with_min_instances(1)
            .with_max_instances(4)
            .with_auto_scale(true)
            .with_responsive_scale(true)
            .with_scale_interval(Duration::from_millis(30))
            .with_scale_down_at(0.1)
            .with_scale_up_at(0.9),
    );

    tokio::time::sleep(Duration::from_millis(20)).await;

    let guards = vec![
        pool.claim().await.unwrap(),
        pool.claim().await.unwrap(),
        pool.claim().await.unwrap(),
        pool.claim().await.unwrap(),
    ];
    assert_eq!(pool.instance_count(), 4);
    drop(guards);

    assert_eq!(created.load(Ordering::SeqCst), 4);

    // Every instance is idle now; each auto-scale tick should scale the pool down by one on
    // its own until it converges back to `min_instances`, with no explicit `scale_down` calls.
    let converged = tokio::time::timeout(Duration::from_millis(2000), async {
        while pool.instance_count() > 1 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(converged.is_ok(), "pool should converge to min_instances on its own");
    assert_eq!(pool.instance_count(), 1);
    assert_eq!(destroyed.load(Ordering::SeqCst), 3);

    pool.quit().await;
    assert_eq!(pool.instance_count(), 0);
    assert_eq!(destroyed.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn scenario_pool_claim_blocks_at_max_until_release() {
    let next_id = Arc::new(AtomicUsize::new(0));
    let created = Arc::new(AtomicUsize::new(0));
    let destroyed = Arc::new(AtomicUsize::new(0));
    let nid = next_id.clone();
    let c = created.clone();
    let d = destroyed.clone();
    let pool = ScalingConnectionPool::new(
        move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(CountingRunner {
                id: nid.fetch_add(1, Ordering::SeqCst),
                created: c.clone(),
                destroyed: d.clone(),
            })
        },
        ConnectionPoolOptions::default()
            .with_min_instances(1)
            .with_max_instances(1)
            .with_auto_scale(false)
            .with_responsive_scale(false),
    );
    tokio::time::sleep(Duration::from_millis(20)).await;

    let guard = pool.claim().await.unwrap();
    let pool2 = pool.clone();
    let waiter = tokio::spawn(async move { pool2.claim().await.unwrap().get().id });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    let released_id = guard.get().id;
    drop(guard);
    let claimed_id = waiter.await.unwrap();
    assert_eq!(claimed_id, released_id);

    pool.quit().await;
}

struct FixedBatchRunner {
    batches: Arc<Mutex<Vec<Vec<u32>>>>,
}

impl PollingRunner<u32> for FixedBatchRunner {
    async fn fetch(&mut self) -> Result<FetchOutcome<u32>, String> {
        let mut batches = self.batches.lock().unwrap();
        if batches.is_empty() {
            Ok(FetchOutcome::Timeout)
        } else {
            Ok(FetchOutcome::Batch(batches.remove(0)))
        }
    }
}

impl Runner for FixedBatchRunner {
    async fn quit(self) -> Result<(), String> {
        Ok(())
    }
}

#[tokio::test]
async fn scenario_polling_buffer_drains_all_pushed_batches() {
    let mut all_batches = Vec::new();
    let mut expected = Vec::new();
    for batch_start in (0..1000u32).step_by(50) {
        let batch: Vec<u32> = (batch_start..batch_start + 50).collect();
        expected.extend(batch.iter().copied());
        all_batches.push(batch);
    }
    let batches = Arc::new(Mutex::new(all_batches));

    let b = batches.clone();
    let polling = PollingAsyncBuffer::new(
        move || {
            Ok(FixedBatchRunner { batches: b.clone() })
        },
        AsyncBufferOptions::default().with_max_size(64),
        ConnectionPoolOptions::default()
            .with_min_instances(1)
            .with_max_instances(4)
            .with_auto_scale(false)
            .with_responsive_scale(false),
    );

    let mut received = Vec::new();
    for _ in 0..1000 {
        let v = tokio::time::timeout(Duration::from_secs(2), polling.pop())
            .await
            .expect("pop should not hang")
            .expect("buffer should not terminate before all items are consumed");
        received.push(v);
    }
    received.sort();
    assert_eq!(received, expected);

    tokio::time::timeout(Duration::from_millis(200), polling.quit())
        .await
        .unwrap();
}
