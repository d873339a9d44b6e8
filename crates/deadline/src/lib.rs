//! Deadline guard shared by every blocking wait in the harness.
//!
//! A [`Completion`] races a one-shot result against a deadline. It is either created already
//! settled (no timer is started) or pending on a `oneshot` receiver. Callers that register
//! listeners attach an abandon hook with [`Completion::on_abandon`] so the registration is
//! removed when the deadline wins or the handle is dropped before settling.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::{sleep_until, Instant, Sleep};
use tracing::debug;

/// Failure produced by a deadline guard.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WaitError {
    #[error("{what}: timed out after {} ms", after.as_millis())]
    Timeout { what: String, after: Duration },
}

impl WaitError {
    pub fn what(&self) -> &str {
        match self {
            WaitError::Timeout { what, .. } => what,
        }
    }
}

struct AbandonHook(Option<Box<dyn FnOnce() + Send + 'static>>);

impl AbandonHook {
    fn fire(&mut self) {
        if let Some(hook) = self.0.take() {
            hook();
        }
    }

    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for AbandonHook {
    fn drop(&mut self) {
        self.fire();
    }
}

struct Waiting<T> {
    rx: Option<oneshot::Receiver<T>>,
    sleep: Pin<Box<Sleep>>,
    what: String,
    after: Duration,
    hook: AbandonHook,
}

enum State<T> {
    Settled(Option<T>),
    Waiting(Waiting<T>),
    Done,
}

/// Awaitable handle that settles exactly once, either with a value or with
/// [`WaitError::Timeout`].
pub struct Completion<T> {
    state: State<T>,
    settled_at_creation: bool,
}

// `T` is only ever moved out, never pinned in place.
impl<T> Unpin for Completion<T> {}

impl<T> Completion<T> {
    /// Already-settled handle. No timer is armed.
    pub fn ready(value: T) -> Self {
        Self {
            state: State::Settled(Some(value)),
            settled_at_creation: true,
        }
    }

    /// Handle that resolves with whatever `rx` delivers, or fails once `timeout` elapses.
    ///
    /// The deadline is fixed at creation time. A dropped sender does not fail the handle
    /// early: it simply keeps waiting for the deadline.
    pub fn pending(rx: oneshot::Receiver<T>, timeout: Duration, what: impl Into<String>) -> Self {
        Self {
            state: State::Waiting(Waiting {
                rx: Some(rx),
                sleep: Box::pin(sleep_until(Instant::now() + timeout)),
                what: what.into(),
                after: timeout,
                hook: AbandonHook(None),
            }),
            settled_at_creation: false,
        }
    }

    /// Run `cleanup` if this handle loses to its deadline or is dropped unsettled.
    /// Has no effect on a handle created with [`Completion::ready`].
    pub fn on_abandon(mut self, cleanup: impl FnOnce() + Send + 'static) -> Self {
        if let State::Waiting(waiting) = &mut self.state {
            waiting.hook = AbandonHook(Some(Box::new(cleanup)));
        }
        self
    }

    /// Whether the handle was already settled when it was handed out.
    pub fn is_settled(&self) -> bool {
        self.settled_at_creation
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::Settled(_) => "settled",
            State::Waiting(_) => "waiting",
            State::Done => "done",
        };
        f.debug_struct("Completion").field("state", &state).finish()
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T, WaitError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            State::Settled(value) => match value.take() {
                Some(value) => {
                    this.state = State::Done;
                    Poll::Ready(Ok(value))
                }
                None => panic!("Completion polled after it settled"),
            },
            State::Waiting(waiting) => {
                if let Some(rx) = waiting.rx.as_mut() {
                    match Pin::new(rx).poll(cx) {
                        Poll::Ready(Ok(value)) => {
                            waiting.hook.disarm();
                            this.state = State::Done;
                            return Poll::Ready(Ok(value));
                        }
                        Poll::Ready(Err(_)) => {
                            debug!(target: "swtk-deadline", what = %waiting.what, "completion sender dropped; waiting for deadline");
                            waiting.rx = None;
                        }
                        Poll::Pending => {}
                    }
                }

                match waiting.sleep.as_mut().poll(cx) {
                    Poll::Ready(()) => {
                        waiting.hook.fire();
                        let err = WaitError::Timeout {
                            what: std::mem::take(&mut waiting.what),
                            after: waiting.after,
                        };
                        this.state = State::Done;
                        Poll::Ready(Err(err))
                    }
                    Poll::Pending => Poll::Pending,
                }
            }
            State::Done => panic!("Completion polled after it settled"),
        }
    }
}

/// Guard an arbitrary future with a deadline.
pub async fn with_deadline<F>(
    future: F,
    timeout: Duration,
    what: impl Into<String>,
) -> Result<F::Output, WaitError>
where
    F: Future,
{
    tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| WaitError::Timeout {
            what: what.into(),
            after: timeout,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn ready_handle_resolves_without_timer() {
        let handle = Completion::ready(7u32);
        assert!(handle.is_settled());
        assert_eq!(handle.await, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn pending_handle_resolves_when_sender_fires() {
        let (tx, rx) = oneshot::channel();
        let handle = Completion::pending(rx, Duration::from_secs(10), "value");
        assert!(!handle.is_settled());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send("done");
        });
        assert_eq!(handle.await, Ok("done"));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_runs_abandon_hook_once() {
        let (_tx, rx) = oneshot::channel::<u8>();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let handle = Completion::pending(rx, Duration::from_secs(10), "waiting for thing")
            .on_abandon(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        let err = handle.await.unwrap_err();
        assert_eq!(err.to_string(), "waiting for thing: timed out after 10000 ms");
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_sender_still_times_out() {
        let (tx, rx) = oneshot::channel::<u8>();
        drop(tx);
        let started = Instant::now();
        let err = Completion::pending(rx, Duration::from_secs(3), "orphan")
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::Timeout { .. }));
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn dropping_unsettled_handle_runs_hook() {
        let (_tx, rx) = oneshot::channel::<u8>();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let handle = Completion::pending(rx, Duration::from_secs(10), "dropped")
            .on_abandon(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        drop(handle);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn settled_handle_does_not_run_hook() {
        let (tx, rx) = oneshot::channel();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let handle = Completion::pending(rx, Duration::from_secs(10), "settles")
            .on_abandon(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        tx.send(1u8).unwrap();
        assert_eq!(handle.await, Ok(1));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn with_deadline_names_the_wait() {
        let err = with_deadline(std::future::pending::<()>(), Duration::from_millis(5), "frame")
            .await
            .unwrap_err();
        assert_eq!(err.what(), "frame");
    }
}
