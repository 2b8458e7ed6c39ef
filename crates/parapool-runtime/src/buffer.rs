//! Size-bounded FIFO queue with asynchronous push/pop and drain-on-quit shutdown.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures_core::Stream;
use futures_util::stream;
use tokio::sync::{broadcast, Notify};

use parapool_core::error::{BufferError, BufferResult};
use parapool_core::events::BufferEvent;

use crate::options::AsyncBufferOptions;

struct State<T> {
    queue: VecDeque<T>,
    max_size: usize,
    running: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    /// Signaled on every push, pop, and quit so that whichever side is waiting re-checks its
    /// condition. A single condvar-style `Notify` is simpler than separate push/pop notifiers and
    /// the extra wakeups it causes are harmless (see module docs on suspension points).
    changed: Notify,
    events: broadcast::Sender<BufferEvent>,
}

/// A size-bounded FIFO queue with asynchronous push/pop.
///
/// Cheaply cloneable: clones share the same underlying queue, exactly like an `Arc`-backed
/// channel handle. This is what lets a `ParallelExecutor` and a `PollingAsyncBuffer`'s poll driver
/// both hold a buffer and interact with it concurrently.
pub struct AsyncBuffer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for AsyncBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> AsyncBuffer<T> {
    /// Create a new buffer with the given options.
    pub fn new(options: AsyncBufferOptions) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    max_size: options.max_size,
                    running: true,
                }),
                changed: Notify::new(),
                events,
            }),
        }
    }

    /// Subscribe to this buffer's push/pop/error notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<BufferEvent> {
        self.shared.events.subscribe()
    }

    /// Current number of buffered items.
    pub fn len(&self) -> usize {
        self.shared.state.lock().unwrap().queue.len()
    }

    /// True if the buffer currently holds no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The buffer's configured capacity.
    pub fn capacity(&self) -> usize {
        self.shared.state.lock().unwrap().max_size
    }

    /// Suspend until the buffer has room for at least one more item, or has been quit.
    pub async fn wait_for_space(&self) {
        loop {
            let notified = {
                let state = self.shared.state.lock().unwrap();
                if !state.running || state.queue.len() < state.max_size {
                    return;
                }
                self.shared.changed.notified()
            };
            notified.await;
        }
    }

    /// Push a value, suspending while the buffer is full.
    ///
    /// Returns [`BufferError::Quitting`] synchronously if `quit` has already been initiated.
    pub async fn push(&self, value: T) -> BufferResult<()> {
        let mut value = Some(value);
        loop {
            let notified = {
                let mut state = self.shared.state.lock().unwrap();
                if !state.running {
                    return Err(BufferError::Quitting);
                }
                if state.queue.len() < state.max_size {
                    state.queue.push_back(value.take().unwrap());
                    let len = state.queue.len();
                    drop(state);
                    self.shared.changed.notify_waiters();
                    let _ = self.shared.events.send(BufferEvent::Pushed { len });
                    return Ok(());
                }
                // Buffer full: register for the next state change before releasing the lock, so
                // a pop that happens between the check above and the await below is not missed.
                self.shared.changed.notified()
            };
            notified.await;
        }
    }

    /// Pop the next value, suspending while the buffer is empty and running.
    ///
    /// Returns `None` once the buffer has been quit and fully drained — the terminal signal. A
    /// quitting-but-not-yet-drained buffer still yields values from `pop`.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = {
                let mut state = self.shared.state.lock().unwrap();
                if let Some(value) = state.queue.pop_front() {
                    let len = state.queue.len();
                    drop(state);
                    self.shared.changed.notify_waiters();
                    let _ = self.shared.events.send(BufferEvent::Popped { len });
                    return Some(value);
                }
                if !state.running {
                    // Drained and quit: terminal.
                    return None;
                }
                self.shared.changed.notified()
            };
            notified.await;
        }
    }

    /// Initiate shutdown: stop accepting new pushes, wait for the buffer to drain, then wake any
    /// pending/future pops with `None`.
    ///
    /// Idempotent: calling `quit` again after the buffer is already quit resolves immediately.
    pub async fn quit(&self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.running = false;
        }
        self.shared.changed.notify_waiters();
        loop {
            let notified = {
                let state = self.shared.state.lock().unwrap();
                if state.queue.is_empty() {
                    break;
                }
                self.shared.changed.notified()
            };
            notified.await;
        }
        // Wake anyone still waiting in `pop` so they observe the drained, non-running state.
        self.shared.changed.notify_waiters();
    }

    /// Consume this handle as a `Stream`, yielding values until the buffer is quit and drained.
    pub fn into_stream(self) -> impl Stream<Item = T> {
        stream::unfold(self, |buf| async move {
            let value = buf.pop().await?;
            Some((value, buf))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::time::Duration;

    #[tokio::test]
    async fn test_push_pop_fifo() {
        let buf = AsyncBuffer::<i32>::new(AsyncBufferOptions::default().with_max_size(4));
        buf.push(1).await.unwrap();
        buf.push(2).await.unwrap();
        assert_eq!(buf.pop().await, Some(1));
        assert_eq!(buf.pop().await, Some(2));
    }

    #[tokio::test]
    async fn test_push_blocks_when_full() {
        let buf = AsyncBuffer::<i32>::new(AsyncBufferOptions::default().with_max_size(1));
        buf.push(1).await.unwrap();

        let buf2 = buf.clone();
        let handle = tokio::spawn(async move {
            buf2.push(2).await.unwrap();
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        assert_eq!(buf.pop().await, Some(1));
        handle.await.unwrap();
        assert_eq!(buf.pop().await, Some(2));
    }

    #[tokio::test]
    async fn test_pop_blocks_when_empty() {
        let buf = AsyncBuffer::<i32>::new(AsyncBufferOptions::default());
        let buf2 = buf.clone();
        let handle = tokio::spawn(async move { buf2.pop().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        buf.push(7).await.unwrap();
        assert_eq!(handle.await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_quit_drains_then_terminates() {
        let buf = AsyncBuffer::<i32>::new(AsyncBufferOptions::default());
        buf.push(1).await.unwrap();
        buf.push(2).await.unwrap();

        let buf2 = buf.clone();
        let quitter = tokio::spawn(async move { buf2.quit().await });

        assert_eq!(buf.pop().await, Some(1));
        assert_eq!(buf.pop().await, Some(2));
        quitter.await.unwrap();

        assert_eq!(buf.pop().await, None);
        assert!(matches!(buf.push(3).await, Err(BufferError::Quitting)));
    }

    #[tokio::test]
    async fn test_quit_idempotent() {
        let buf = AsyncBuffer::<i32>::new(AsyncBufferOptions::default());
        buf.quit().await;
        buf.quit().await;
        assert_eq!(buf.pop().await, None);
    }

    #[tokio::test]
    async fn test_as_stream() {
        let buf = AsyncBuffer::<i32>::new(AsyncBufferOptions::default());
        buf.push(1).await.unwrap();
        buf.push(2).await.unwrap();
        buf.push(3).await.unwrap();
        buf.quit().await;

        let values: Vec<i32> = buf.into_stream().collect().await;
        assert_eq!(values, vec![1, 2, 3]);
    }
}
