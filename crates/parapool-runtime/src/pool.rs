//! An elastic pool of `Runner` instances that scales itself between `min_instances` and
//! `max_instances` based on observed utilization.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, oneshot, Notify};
use tokio::task::JoinHandle;

use parapool_core::error::{PoolError, PoolResult};
use parapool_core::events::PoolEvent;
use parapool_core::runner::Runner;
use parapool_core::{diag_debug, diag_warn};

use crate::options::ConnectionPoolOptions;

/// A pool slot. `runner` is `Some` while the instance is free, and `None` while a `PoolGuard` has
/// it claimed — the guard owns the runner directly for the duration of the claim, so indices
/// never shift and no unsafe borrow juggling is needed to hand a live `&R` to the caller.
struct Slot<R> {
    runner: Option<R>,
    /// Set once `quit` has asked this instance to be torn down; honored on release if still
    /// claimed, or immediately if already free.
    quitting: bool,
    /// `Some(t)` while claimed, the instant the current claim (or the current tick, whichever is
    /// most recent) started. Drives the time-weighted utilization accumulator.
    claimed_at: Option<Instant>,
}

/// A runner handed directly to the oldest pending waiter rather than left in its slot, so claim
/// resolution is FIFO instead of every blocked claimer racing the state mutex on wakeup.
struct Handoff<R> {
    index: usize,
    runner: R,
}

struct State<R> {
    /// Indexed by slot id. `None` entries are tombstones left by a completed teardown, reused by
    /// the next scale-up instead of growing the vector forever.
    slots: Vec<Option<Slot<R>>>,
    scaling: bool,
    running: bool,
    /// Claimers parked because no instance was free, oldest-first. Resolved directly by
    /// `hand_off_or_free` rather than by broadcasting and letting everyone race.
    waiters: VecDeque<oneshot::Sender<Handoff<R>>>,
    /// Claimed-time accumulated across all instances since the last tick reset.
    utilization_accum: Duration,
}

impl<R> State<R> {
    fn total(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    fn claimed(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, Some(slot) if slot.runner.is_none()))
            .count()
    }
}

/// Gives `runner` directly to the oldest pending waiter if one is still listening, otherwise
/// marks slot `index` free and returns `false` so the caller can broadcast `Available`.
fn hand_off_or_free<R>(state: &mut State<R>, index: usize, mut runner: R) -> bool {
    while let Some(tx) = state.waiters.pop_front() {
        match tx.send(Handoff { index, runner }) {
            Ok(()) => return true,
            Err(rejected) => {
                // The waiter's claim future was dropped (e.g. cancelled by a timeout) before it
                // could receive; try the next one instead of losing the runner.
                runner = rejected.runner;
                continue;
            }
        }
    }
    if let Some(Some(slot)) = state.slots.get_mut(index) {
        slot.runner = Some(runner);
        slot.claimed_at = None;
    }
    false
}

struct Shared<R: Runner> {
    state: Mutex<State<R>>,
    changed: Notify,
    events: broadcast::Sender<PoolEvent>,
    options: ConnectionPoolOptions,
    factory: Box<dyn Fn() -> PoolResult<R> + Send + Sync>,
}

/// An elastic pool of `Runner` instances.
///
/// Instances are claimed exclusively (one caller at a time), released back when the caller is
/// done, and the pool periodically (or responsively) adjusts the instance count to track
/// utilization between `min_instances` and `max_instances`.
pub struct ScalingConnectionPool<R: Runner> {
    shared: Arc<Shared<R>>,
    scale_task: Mutex<Option<JoinHandle<()>>>,
}

/// Outcome of a single pass through `claim`'s state-locked decision step.
enum ClaimOutcome<R: Runner> {
    Ready(PoolGuard<R>),
    Wait(oneshot::Receiver<Handoff<R>>, bool),
}

impl<R: Runner> ScalingConnectionPool<R> {
    /// Construct a pool with the given factory and options, spawning `min_instances` immediately
    /// and, if `options.auto_scale` is set, a periodic usage-tick task.
    pub fn new<F>(factory: F, options: ConnectionPoolOptions) -> Arc<Self>
    where
        F: Fn() -> PoolResult<R> + Send + Sync + 'static,
    {
        options.validate();
        let (events, _) = broadcast::channel(64);
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                slots: Vec::new(),
                scaling: false,
                running: true,
                waiters: VecDeque::new(),
                utilization_accum: Duration::ZERO,
            }),
            changed: Notify::new(),
            events,
            options,
            factory: Box::new(factory),
        });

        let pool = Arc::new(Self {
            shared: shared.clone(),
            scale_task: Mutex::new(None),
        });

        let converge_shared = shared.clone();
        tokio::spawn(async move {
            converge_to_min(&converge_shared).await;
        });

        if shared.options.auto_scale {
            let tick_shared = shared.clone();
            let handle = tokio::spawn(async move {
                scale_tick_loop(tick_shared).await;
            });
            *pool.scale_task.lock().unwrap() = Some(handle);
        }

        pool
    }

    /// Subscribe to this pool's scaling/availability notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.shared.events.subscribe()
    }

    /// Current total instance count (claimed + free).
    pub fn instance_count(&self) -> usize {
        self.shared.state.lock().unwrap().total()
    }

    /// Current number of claimed instances.
    pub fn claimed_count(&self) -> usize {
        self.shared.state.lock().unwrap().claimed()
    }

    /// The pool's configured floor.
    pub fn min_instances(&self) -> usize {
        self.shared.options.min_instances
    }

    /// The pool's configured ceiling.
    pub fn max_instances(&self) -> usize {
        self.shared.options.max_instances
    }

    /// Number of callers currently parked in `claim`, waiting for an instance.
    pub fn pending_claim_count(&self) -> usize {
        self.shared.state.lock().unwrap().waiters.len()
    }

    /// Current fraction of instances claimed, in `[0, 1]`. `0.0` when there are no instances.
    ///
    /// An instantaneous snapshot, handy for diagnostics; the auto-scaler itself uses the
    /// time-weighted accumulator computed in `scale_tick_loop`, not this value.
    pub fn utilization(&self) -> f64 {
        let state = self.shared.state.lock().unwrap();
        let total = state.total();
        if total == 0 {
            0.0
        } else {
            state.claimed() as f64 / total as f64
        }
    }

    /// Claim a free instance, suspending until one becomes available.
    ///
    /// If no instance is free, the caller is enqueued as a FIFO waiter; when a slot frees up
    /// (release) or a new one is created (scale-up), the oldest waiter receives it directly
    /// rather than every blocked caller racing to re-check the state. If `responsive_scale` and
    /// `auto_scale` are both enabled and the pool is below `max_instances`, a scale-up is
    /// triggered immediately instead of waiting for the next tick.
    pub async fn claim(self: &Arc<Self>) -> PoolResult<PoolGuard<R>> {
        loop {
            let outcome = {
                let mut state = self.shared.state.lock().unwrap();
                if !state.running {
                    return Err(PoolError::Quitting);
                }
                let free = state.slots.iter().position(
                    |s| matches!(s, Some(slot) if slot.runner.is_some() && !slot.quitting),
                );
                if let Some(index) = free {
                    let runner = state.slots[index].as_mut().unwrap().runner.take().unwrap();
                    let now = Instant::now();
                    state.slots[index].as_mut().unwrap().claimed_at = Some(now);
                    ClaimOutcome::Ready(PoolGuard {
                        pool: self.clone(),
                        index,
                        runner: Some(runner),
                        claimed_at: now,
                    })
                } else {
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push_back(tx);
                    let below_max = state.total() < self.shared.options.max_instances;
                    let should_scale_up = below_max
                        && self.shared.options.responsive_scale
                        && self.shared.options.auto_scale
                        && !state.scaling;
                    if should_scale_up {
                        state.scaling = true;
                    }
                    ClaimOutcome::Wait(rx, should_scale_up)
                }
            };
            match outcome {
                ClaimOutcome::Ready(guard) => return Ok(guard),
                ClaimOutcome::Wait(rx, should_scale_up) => {
                    if should_scale_up {
                        let shared = self.shared.clone();
                        tokio::spawn(async move {
                            scale_up_one(&shared).await;
                        });
                    }
                    match rx.await {
                        Ok(Handoff { index, runner }) => {
                            let now = Instant::now();
                            {
                                let mut state = self.shared.state.lock().unwrap();
                                if let Some(Some(slot)) = state.slots.get_mut(index) {
                                    slot.claimed_at = Some(now);
                                }
                            }
                            return Ok(PoolGuard {
                                pool: self.clone(),
                                index,
                                runner: Some(runner),
                                claimed_at: now,
                            });
                        }
                        // The sender was dropped without sending only when `quit` clears the
                        // waiter queue; loop back around to observe `running == false`.
                        Err(_) => continue,
                    }
                }
            }
        }
    }

    /// Claim an instance, invoke `f` with exclusive access to it, and release it on every exit
    /// path — success, `f`'s own error, or a panic unwinding through the guard's `Drop` — then
    /// surface `f`'s result unchanged.
    pub async fn run<F, Fut, V, E>(self: &Arc<Self>, f: F) -> Result<V, E>
    where
        F: FnOnce(&mut R) -> Fut,
        Fut: std::future::Future<Output = Result<V, E>>,
        E: From<PoolError>,
    {
        let mut guard = self.claim().await.map_err(E::from)?;
        f(guard.get_mut()).await
    }

    /// Returns the runner to its slot. A slot marked `quitting` (only ever set by `quit`'s own
    /// loop) is deliberately not torn down here: `quit` itself discovers the now-free slot on its
    /// next wakeup and awaits `Runner::quit` synchronously, so there is exactly one code path that
    /// ever calls it, with no detached task racing the pool's own shutdown bookkeeping.
    fn release(&self, index: usize, runner: R) {
        let mut emit_available = false;
        {
            let mut state = self.shared.state.lock().unwrap();
            let elapsed = match state.slots.get_mut(index) {
                Some(Some(slot)) => slot.claimed_at.take().map(|at| at.elapsed()),
                _ => None,
            };
            if let Some(d) = elapsed {
                state.utilization_accum += d;
            }
            let quitting = matches!(state.slots.get(index), Some(Some(slot)) if slot.quitting);
            if !state.running || quitting {
                if let Some(Some(slot)) = state.slots.get_mut(index) {
                    slot.runner = Some(runner);
                }
            } else {
                emit_available = !hand_off_or_free(&mut state, index, runner);
            }
        }
        self.shared.changed.notify_waiters();
        let _ = self.shared.events.send(PoolEvent::Released { index });
        if emit_available {
            let _ = self.shared.events.send(PoolEvent::Available { index });
        }
    }

    /// Permanently remove a claimed instance instead of returning it to the pool. Declines (and
    /// releases the runner normally instead) if doing so would drop the pool below
    /// `min_instances`. Returns whether the instance was actually torn down.
    async fn discard(&self, index: usize, runner: R) -> bool {
        let should_discard = {
            let mut state = self.shared.state.lock().unwrap();
            let elapsed = match state.slots.get_mut(index) {
                Some(Some(slot)) => slot.claimed_at.take().map(|at| at.elapsed()),
                _ => None,
            };
            if let Some(d) = elapsed {
                state.utilization_accum += d;
            }
            if state.total().saturating_sub(1) < self.shared.options.min_instances {
                false
            } else {
                state.slots[index] = None;
                true
            }
        };
        if !should_discard {
            self.release(index, runner);
            return false;
        }
        self.shared.changed.notify_waiters();
        if let Err(e) = runner.quit().await {
            diag_warn!("runner quit failed during reap: {e}");
            let _ = self.shared.events.send(PoolEvent::Error(e));
        }
        let count = self.shared.state.lock().unwrap().total();
        diag_debug!("pool scaled down to {count} instances (reaped)");
        let _ = self.shared.events.send(PoolEvent::Scale {
            instance_count: count,
        });
        true
    }

    /// Attempt to scale up by one instance. No-op at `max_instances` or while another scale is
    /// already in flight.
    pub async fn scale_up(self: &Arc<Self>) {
        let already_scaling = {
            let mut state = self.shared.state.lock().unwrap();
            let busy = state.scaling;
            if !busy {
                state.scaling = true;
            }
            busy
        };
        if !already_scaling {
            scale_up_one(&self.shared).await;
        }
    }

    /// Attempt to scale down by one instance, preferring an unclaimed, non-quitting one. No-op at
    /// `min_instances` or if every instance is currently claimed; callable independent of holding
    /// a claim, unlike `PoolGuard::discard`.
    pub async fn scale_down(self: &Arc<Self>) {
        scale_down_one(&self.shared).await;
    }

    /// True while a scale-up is in flight (factory call not yet resolved).
    pub fn is_scaling(&self) -> bool {
        self.shared.state.lock().unwrap().scaling
    }

    /// Initiate shutdown: stop accepting claims, quit every currently free instance, and let
    /// claimed instances be torn down as they're released. Waits for the periodic scale task
    /// (if any) to stop and for every instance to finish quitting.
    pub async fn quit(self: &Arc<Self>) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.running = false;
            // Dropping these senders fails any in-flight `rx.await` in `claim`, which then
            // observes `running == false` and returns `PoolError::Quitting` instead of hanging.
            state.waiters.clear();
        }
        self.shared.changed.notify_waiters();

        if let Some(handle) = self.scale_task.lock().unwrap().take() {
            handle.abort();
        }

        loop {
            let (to_quit, wait) = {
                let mut state = self.shared.state.lock().unwrap();
                let mut to_quit = Vec::new();
                for slot in state.slots.iter_mut() {
                    match slot {
                        Some(s) if s.runner.is_some() => {
                            if let Some(runner) = s.runner.take() {
                                to_quit.push(runner);
                            }
                        }
                        Some(s) => s.quitting = true,
                        None => {}
                    }
                }
                state.slots.retain(|s| s.is_some());
                if state.total() == 0 {
                    (to_quit, None)
                } else {
                    (to_quit, Some(self.shared.changed.notified()))
                }
            };
            for runner in to_quit {
                if let Err(e) = runner.quit().await {
                    diag_warn!("runner quit failed during pool shutdown: {e}");
                }
            }
            match wait {
                Some(n) => n.await,
                None => break,
            }
        }
    }
}

/// A claimed, exclusively-held runner instance. Releases automatically on drop.
pub struct PoolGuard<R: Runner> {
    pool: Arc<ScalingConnectionPool<R>>,
    index: usize,
    runner: Option<R>,
    claimed_at: Instant,
}

impl<R: Runner> PoolGuard<R> {
    /// Borrow the underlying runner.
    pub fn get(&self) -> &R {
        self.runner.as_ref().expect("runner present until drop")
    }

    /// Mutably borrow the underlying runner.
    pub fn get_mut(&mut self) -> &mut R {
        self.runner.as_mut().expect("runner present until drop")
    }

    /// How long this instance has been claimed.
    pub fn claimed_for(&self) -> std::time::Duration {
        self.claimed_at.elapsed()
    }

    /// Tear this instance down instead of returning it to the pool, unless doing so would drop
    /// the pool below `min_instances` (in which case it's released normally). Returns whether the
    /// instance was actually discarded.
    pub async fn discard(mut self) -> bool {
        let runner = self.runner.take().expect("runner present until drop");
        let pool = self.pool.clone();
        let index = self.index;
        pool.discard(index, runner).await
    }
}

impl<R: Runner> Drop for PoolGuard<R> {
    fn drop(&mut self) {
        if let Some(runner) = self.runner.take() {
            self.pool.release(self.index, runner);
        }
    }
}

async fn converge_to_min<R: Runner>(shared: &Arc<Shared<R>>) {
    loop {
        let need = {
            let state = shared.state.lock().unwrap();
            if !state.running {
                return;
            }
            shared.options.min_instances.saturating_sub(state.total())
        };
        if need == 0 {
            return;
        }
        scale_up_one(shared).await;
    }
}

/// Finds a tombstoned slot to reuse, or reserves a new one. Returns `None` (and clears
/// `state.scaling`) if the pool is no longer running or is already at `max_instances`.
fn reserve_slot<R: Runner>(shared: &Arc<Shared<R>>) -> Option<usize> {
    let mut state = shared.state.lock().unwrap();
    if !state.running || state.total() >= shared.options.max_instances {
        state.scaling = false;
        return None;
    }
    if let Some(index) = state.slots.iter().position(|s| s.is_none()) {
        Some(index)
    } else {
        state.slots.push(None);
        Some(state.slots.len() - 1)
    }
}

async fn scale_up_one<R: Runner>(shared: &Arc<Shared<R>>) {
    let Some(index) = reserve_slot(shared) else {
        shared.changed.notify_waiters();
        return;
    };
    let runner = (shared.factory)();
    match runner {
        Ok(runner) => {
            let (handed_off, count) = {
                let mut state = shared.state.lock().unwrap();
                state.scaling = false;
                state.slots[index] = Some(Slot {
                    runner: None,
                    quitting: false,
                    claimed_at: None,
                });
                let handed = hand_off_or_free(&mut state, index, runner);
                (handed, state.total())
            };
            diag_debug!("pool scaled up to {count} instances");
            let _ = shared.events.send(PoolEvent::Scale {
                instance_count: count,
            });
            if !handed_off {
                let _ = shared.events.send(PoolEvent::Available { index });
            }
        }
        Err(e) => {
            {
                let mut state = shared.state.lock().unwrap();
                state.scaling = false;
            }
            diag_warn!("factory failed during scale-up: {e}");
            let _ = shared.events.send(PoolEvent::Error(e.to_string()));
        }
    }
    shared.changed.notify_waiters();
}

async fn scale_down_one<R: Runner>(shared: &Arc<Shared<R>>) {
    let victim = {
        let mut state = shared.state.lock().unwrap();
        if state.total() <= shared.options.min_instances {
            return;
        }
        let index = state.slots.iter().position(
            |s| matches!(s, Some(slot) if slot.runner.is_some() && !slot.quitting),
        );
        index.and_then(|i| state.slots[i].take()).and_then(|s| s.runner)
    };
    if let Some(runner) = victim {
        if let Err(e) = runner.quit().await {
            diag_warn!("runner quit failed during scale-down: {e}");
            let _ = shared.events.send(PoolEvent::Error(e));
        }
        let count = shared.state.lock().unwrap().total();
        diag_debug!("pool scaled down to {count} instances");
        let _ = shared.events.send(PoolEvent::Scale {
            instance_count: count,
        });
    }
}

async fn scale_tick_loop<R: Runner>(shared: Arc<Shared<R>>) {
    let interval = shared.options.scale_interval;
    loop {
        tokio::time::sleep(interval).await;
        loop {
            if !shared.state.lock().unwrap().running {
                return;
            }
            if tick_once(&shared).await {
                // Below `min_instances`: re-tick immediately so the pool converges without
                // waiting for the next full interval.
                continue;
            }
            break;
        }
    }
}

/// One utilization tick: accumulate claimed-time, compute and emit usage, then act on it.
/// Returns `true` if it scaled up to converge toward `min_instances` and should be re-run
/// immediately rather than waiting out the rest of the interval.
async fn tick_once<R: Runner>(shared: &Arc<Shared<R>>) -> bool {
    let now = Instant::now();
    let (utilization, total) = {
        let mut state = shared.state.lock().unwrap();
        let mut elapsed_sum = Duration::ZERO;
        for slot in state.slots.iter_mut().flatten() {
            if let Some(claimed_at) = slot.claimed_at {
                elapsed_sum += now.saturating_duration_since(claimed_at);
                slot.claimed_at = Some(now);
            }
        }
        state.utilization_accum += elapsed_sum;
        let total = state.total();
        let accum = std::mem::replace(&mut state.utilization_accum, Duration::ZERO);
        let interval_secs = shared.options.scale_interval.as_secs_f64();
        let utilization = if total == 0 || interval_secs <= 0.0 {
            0.0
        } else {
            accum.as_secs_f64() / (interval_secs * total as f64)
        };
        (utilization, total)
    };
    let _ = shared.events.send(PoolEvent::Usage(utilization));

    if total < shared.options.min_instances {
        scale_up_one(shared).await;
        return true;
    }

    if utilization >= shared.options.scale_up_at && total < shared.options.max_instances {
        let already_scaling = {
            let mut state = shared.state.lock().unwrap();
            let busy = state.scaling;
            if !busy {
                state.scaling = true;
            }
            busy
        };
        if !already_scaling {
            scale_up_one(shared).await;
        }
    } else if utilization <= shared.options.scale_down_at && total > shared.options.min_instances {
        scale_down_one(shared).await;
    }
    false
}
