//! Flush coalescing for the drain loop.
//!
//! While the drain loop owns an inner flush, further flush requests do not
//! reach the sink. Each one is parked here as a `oneshot` completion signal
//! and resolved, in arrival order, with the outcome of the loop.

use crate::error::{BodyError, Result};
use crate::sink::FlushResult;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

type Waiter = oneshot::Sender<Result<FlushResult>>;

/// The drain-loop flag plus the requests waiting on it.
#[derive(Debug, Default)]
pub struct FlushCoalescer {
    draining: bool,
    waiters: VecDeque<Waiter>,
}

impl FlushCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the drain loop as running.
    pub fn begin(&mut self) {
        debug_assert!(!self.draining, "drain loop already running");
        self.draining = true;
    }

    #[inline]
    pub fn is_draining(&self) -> bool {
        self.draining
    }

    /// Park a flush request until the loop resolves.
    pub fn register(&mut self) -> FlushHandle {
        let (tx, rx) = oneshot::channel();
        self.waiters.push_back(tx);
        FlushHandle {
            inner: HandleState::Waiting(rx),
        }
    }

    /// Clear the flag and resolve every parked request with `outcome`.
    ///
    /// Returns how many requests were resolved.
    pub fn resolve(&mut self, outcome: Result<FlushResult>) -> usize {
        self.draining = false;
        let count = self.waiters.len();
        for waiter in self.waiters.drain(..) {
            // A dropped handle just means nobody is listening
            let _ = waiter.send(outcome.clone());
        }
        count
    }

    /// Number of parked requests.
    pub fn waiting(&self) -> usize {
        self.waiters.len()
    }
}

/// Completion of one flush request.
///
/// Either ready at creation (fast path, usage error) or waiting for the drain
/// loop. If the loop goes away without resolving it, the handle yields
/// [`BodyError::DrainAborted`].
#[must_use = "a flush handle does nothing unless awaited or dropped deliberately"]
#[derive(Debug)]
pub struct FlushHandle {
    inner: HandleState,
}

#[derive(Debug)]
enum HandleState {
    Ready(Option<Result<FlushResult>>),
    Waiting(oneshot::Receiver<Result<FlushResult>>),
}

impl FlushHandle {
    /// A handle that is already resolved.
    pub fn ready(outcome: Result<FlushResult>) -> Self {
        Self {
            inner: HandleState::Ready(Some(outcome)),
        }
    }

    /// True if the outcome was known when the handle was created.
    pub fn is_immediate(&self) -> bool {
        matches!(self.inner, HandleState::Ready(_))
    }
}

impl Future for FlushHandle {
    type Output = Result<FlushResult>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            HandleState::Ready(slot) => Poll::Ready(
                slot.take()
                    .unwrap_or(Err(BodyError::Usage("flush handle polled after completion"))),
            ),
            HandleState::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or_else(|_| Err(BodyError::DrainAborted))),
        }
    }
}
