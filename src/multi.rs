//! `Multi<T>`: a publisher emitting zero or more items.
//!
//! Grounded on spec.md §4.9 and §9's redesign flag: `Multi<T>` *is* a boxed
//! `futures_core::Stream<Item = Result<T, Error>>`. Dropping a `Multi` is
//! cancellation; each `poll_next` is a unit of demand. No custom
//! `Subscriber`/`Subscription` trait is introduced, matching the idiomatic
//! mapping spec.md §9 calls for.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::StreamExt;

use crate::error::{Error, Result};
use crate::single::Single;

type BoxStream<T> = Pin<Box<dyn Stream<Item = Result<T>> + Send>>;

/// Emits zero or more items, then completes or errors.
pub struct Multi<T> {
    inner: BoxStream<T>,
}

impl<T: Send + 'static> Multi<T> {
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<T>> + Send + 'static,
    {
        Multi { inner: Box::pin(stream) }
    }

    pub fn empty() -> Self {
        Multi::from_stream(futures_util::stream::empty())
    }

    pub fn error(err: Error) -> Self {
        Multi::from_stream(futures_util::stream::once(async move { Err(err) }))
    }

    pub fn just<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Multi::from_stream(futures_util::stream::iter(items.into_iter().map(Ok)))
    }

    pub fn single_item(item: T) -> Self {
        Multi::just(std::iter::once(item))
    }

    pub fn map<U, F>(self, mut f: F) -> Multi<U>
    where
        F: FnMut(T) -> U + Send + 'static,
        U: Send + 'static,
    {
        Multi::from_stream(self.inner.map(move |item| item.map(&mut f)))
    }

    /// Transforms any error the stream terminates with, leaving items
    /// untouched. Used to apply spec.md §4.6/§4.5's "wrap as
    /// TransformationFailed unless already IllegalArgument" rule to an
    /// operator's output stream.
    pub fn map_err<F>(self, mut f: F) -> Multi<T>
    where
        F: FnMut(Error) -> Error + Send + 'static,
    {
        Multi::from_stream(self.inner.map(move |item| item.map_err(&mut f)))
    }

    /// Collects every item into a `Vec`. The first error short-circuits
    /// and is surfaced as the `Single`'s error.
    pub fn collect_to_list(self) -> Single<Vec<T>> {
        Single::from_future(async move {
            let mut items = Vec::new();
            let mut stream = self.inner;
            while let Some(next) = stream.next().await {
                items.push(next?);
            }
            Ok(items)
        })
    }

    /// General fold: `accumulator` is called once per item against a seed
    /// built by `supplier`.
    pub fn collect<S, A>(self, supplier: impl FnOnce() -> S + Send + 'static, mut accumulator: A) -> Single<S>
    where
        S: Send + 'static,
        A: FnMut(&mut S, T) + Send + 'static,
    {
        Single::from_future(async move {
            let mut acc = supplier();
            let mut stream = self.inner;
            while let Some(next) = stream.next().await {
                accumulator(&mut acc, next?);
            }
            Ok(acc)
        })
    }

    /// Wires a subscriber built from individual callbacks, driving the
    /// stream to completion. Intended for bridging to non-`Stream`
    /// consumers (spec.md §4.9's "consumer overloads").
    pub async fn subscribe_with<OnNext, OnError, OnComplete>(
        self,
        mut on_next: OnNext,
        on_error: OnError,
        on_complete: OnComplete,
    ) where
        OnNext: FnMut(T) + Send,
        OnError: FnOnce(Error) + Send,
        OnComplete: FnOnce() + Send,
    {
        let mut stream = self.inner;
        loop {
            match stream.next().await {
                Some(Ok(item)) => on_next(item),
                Some(Err(err)) => {
                    on_error(err);
                    return;
                }
                None => {
                    on_complete();
                    return;
                }
            }
        }
    }
}

impl<T> Stream for Multi<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        this.inner.as_mut().poll_next(cx)
    }
}

impl<T> std::fmt::Debug for Multi<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Multi { .. }")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn just_yields_items_in_order() {
        let items: Vec<_> = Multi::just(vec![1, 2, 3]).collect_to_list().to_future().await.unwrap();
        assert_eq!(items, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn error_short_circuits_collect() {
        let m = Multi::from_stream(futures_util::stream::iter(vec![
            Ok(1),
            Err(Error::new_no_accepted_content_type()),
            Ok(2),
        ]));
        let err = m.collect_to_list().to_future().await.unwrap_err();
        assert!(err.is_no_accepted_content_type());
    }

    #[tokio::test]
    async fn map_transforms_each_item() {
        let items: Vec<_> = Multi::just(vec![1, 2, 3])
            .map(|v| v * 2)
            .collect_to_list()
            .to_future()
            .await
            .unwrap();
        assert_eq!(items, vec![2, 4, 6]);
    }

    #[tokio::test]
    async fn empty_collects_to_empty_vec() {
        let items: Vec<i32> = Multi::empty().collect_to_list().to_future().await.unwrap();
        assert!(items.is_empty());
    }
}
