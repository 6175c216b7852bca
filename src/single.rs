//! `Single<T>`: a publisher emitting at most one item then completing.
//!
//! Grounded on spec.md §4.9 and §9's redesign flag mapping the
//! publisher/subscriber protocol onto `std::future::Future`: a `Single<T>`
//! *is* a boxed future of `Result<Option<T>, Error>`, where `None` is the
//! "completed without an item" case spec.md §4.9 calls empty. Style (boxed
//! state machine behind a newtype) grounded on `common/lazy.rs`'s `Lazy`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use std::thread;
use std::time::{Duration, Instant};

use futures_util::StreamExt;

use crate::error::{Error, Result};
use crate::multi::Multi;

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<Option<T>>> + Send>>;

/// Emits at most one item then completes, or terminates with an error.
pub struct Single<T> {
    inner: BoxFuture<T>,
}

impl<T: Send + 'static> Single<T> {
    fn from_boxed(inner: BoxFuture<T>) -> Self {
        Single { inner }
    }

    /// Completes immediately with `value`.
    pub fn just(value: T) -> Self {
        Single::from_boxed(Box::pin(async move { Ok(Some(value)) }))
    }

    /// Completes immediately with no item.
    pub fn empty() -> Self {
        Single::from_boxed(Box::pin(async { Ok(None) }))
    }

    /// Terminates immediately with `err`.
    pub fn error(err: Error) -> Self {
        Single::from_boxed(Box::pin(async move { Err(err) }))
    }

    /// Never completes. Used in tests exercising cancellation.
    pub fn never() -> Self {
        Single::from_boxed(Box::pin(std::future::pending()))
    }

    /// Wraps an existing future, mapping `Ok(v)` to the one-item case.
    pub fn from_future<F>(fut: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Single::from_boxed(Box::pin(async move { fut.await.map(Some) }))
    }

    /// Like [`from_future`](Self::from_future), but the future decides for
    /// itself whether it completed with an item (`Some`) or empty (`None`)
    /// rather than always producing one. Needed by `unmarshall`, which must
    /// be able to return the empty case from spec.md §4.5 step 1 without
    /// fabricating a value.
    pub fn from_future_opt<F>(fut: F) -> Self
    where
        F: Future<Output = Result<Option<T>>> + Send + 'static,
    {
        Single::from_boxed(Box::pin(fut))
    }

    pub fn map<U, F>(self, f: F) -> Single<U>
    where
        F: FnOnce(T) -> U + Send + 'static,
        U: Send + 'static,
    {
        Single::from_boxed(Box::pin(async move {
            match self.await? {
                Some(t) => Ok(Some(f(t))),
                None => Ok(None),
            }
        }))
    }

    pub fn flat_map<U, F>(self, f: F) -> Single<U>
    where
        F: FnOnce(T) -> Single<U> + Send + 'static,
        U: Send + 'static,
    {
        Single::from_boxed(Box::pin(async move {
            match self.await? {
                Some(t) => f(t).await,
                None => Ok(None),
            }
        }))
    }

    pub fn flat_map_many<U, F>(self, f: F) -> Multi<U>
    where
        F: FnOnce(T) -> Multi<U> + Send + 'static,
        U: Send + 'static,
    {
        let continuation = async move {
            match self.await {
                Ok(Some(t)) => f(t),
                Ok(None) => Multi::empty(),
                Err(e) => Multi::error(e),
            }
        };
        Multi::from_stream(futures_util::stream::once(continuation).flatten())
    }

    /// Bridges to a plain future: an empty `Single` surfaces as
    /// [`Error::new_empty_content`] (spec.md has no "null T"; see
    /// SPEC_FULL.md §7).
    pub async fn to_future(self) -> Result<T> {
        match self.inner.await? {
            Some(t) => Ok(t),
            None => Err(Error::new_empty_content()),
        }
    }

    /// Blocks the current thread until the item (or error) arrives.
    /// Never call from inside an operator (spec.md §5).
    pub fn block(self) -> Result<T> {
        block_on(self.to_future())
    }

    /// As `block`, but fails with [`Error::new_block_timeout`] if `timeout`
    /// elapses first.
    pub fn block_timeout(self, timeout: Duration) -> Result<T> {
        block_on_timeout(self.to_future(), timeout)
    }
}

impl<T> Future for Single<T> {
    type Output = Result<Option<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.inner.as_mut().poll(cx)
    }
}

impl<T> std::fmt::Debug for Single<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Single { .. }")
    }
}

struct ThreadWaker(thread::Thread);

impl Wake for ThreadWaker {
    fn wake(self: Arc<Self>) {
        self.0.unpark();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.0.unpark();
    }
}

fn block_on<F: Future>(fut: F) -> F::Output {
    let mut fut = std::pin::pin!(fut);
    let waker = Waker::from(Arc::new(ThreadWaker(thread::current())));
    let mut cx = Context::from_waker(&waker);
    loop {
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(value) => return value,
            Poll::Pending => thread::park(),
        }
    }
}

fn block_on_timeout<T, F>(fut: F, timeout: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let deadline = Instant::now() + timeout;
    let mut fut = std::pin::pin!(fut);
    let waker = Waker::from(Arc::new(ThreadWaker(thread::current())));
    let mut cx = Context::from_waker(&waker);
    loop {
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(value) => return value,
            Poll::Pending => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(Error::new_block_timeout());
                }
                thread::park_timeout(deadline - now);
            }
        }
    }
}
