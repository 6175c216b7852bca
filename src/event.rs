//! Subscription lifecycle events, for tracing and deferred header-send.
//!
//! Grounded on spec.md §4.10 and §4.11 (SPEC_FULL). The stream-wrapper
//! style is grounded on `common/layers/otel.rs`, this corpus's own
//! tracing-layer-over-a-stream: `EventedStream` wraps a filtered chunk
//! stream the same way that layer wraps spans, without altering the
//! stream's item/error/complete contract.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use futures_core::Stream;
use pin_project_lite::pin_project;

use crate::error::Result;
use crate::type_descriptor::TypeDescriptor;

/// A subscription lifecycle point, carrying the in-flight entity type if
/// one is known at this point in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    BeforeOnSubscribe(Option<TypeDescriptor>),
    BeforeOnNext(Option<TypeDescriptor>),
    BeforeOnError(Option<TypeDescriptor>),
    BeforeOnComplete(Option<TypeDescriptor>),
    AfterOnError(Option<TypeDescriptor>),
    AfterOnComplete(Option<TypeDescriptor>),
}

/// The public hook for tracing and deferred header-send. A panic or error
/// raised from `on_event` is caught and logged, never propagated: the
/// terminal signal always reaches the downstream subscriber (spec.md
/// §4.10).
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: Event);
}

fn emit(listener: &Option<Arc<dyn EventListener>>, event: Event) {
    if let Some(listener) = listener {
        let listener = Arc::clone(listener);
        if catch_unwind(AssertUnwindSafe(|| listener.on_event(event))).is_err() {
            error!("event listener panicked handling {:?}", event);
        }
    }
}

pin_project! {
    /// Wraps a chunk stream so `EventListener` callbacks fire around
    /// subscription, each item, and the terminal signal.
    pub struct EventedStream<S> {
        #[pin]
        inner: S,
        listener: Option<Arc<dyn EventListener>>,
        entity_type: Option<TypeDescriptor>,
        subscribed: bool,
        terminated: bool,
    }
}

impl<S> EventedStream<S> {
    pub fn new(inner: S, listener: Option<Arc<dyn EventListener>>, entity_type: Option<TypeDescriptor>) -> Self {
        EventedStream {
            inner,
            listener,
            entity_type,
            subscribed: false,
            terminated: false,
        }
    }
}

impl<S, T> Stream for EventedStream<S>
where
    S: Stream<Item = Result<T>>,
{
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        if !*this.subscribed {
            *this.subscribed = true;
            emit(this.listener, Event::BeforeOnSubscribe(*this.entity_type));
        }

        if *this.terminated {
            return Poll::Ready(None);
        }

        match this.inner.as_mut().poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => {
                emit(this.listener, Event::BeforeOnComplete(*this.entity_type));
                *this.terminated = true;
                emit(this.listener, Event::AfterOnComplete(*this.entity_type));
                Poll::Ready(None)
            }
            Poll::Ready(Some(Ok(item))) => {
                emit(this.listener, Event::BeforeOnNext(*this.entity_type));
                Poll::Ready(Some(Ok(item)))
            }
            Poll::Ready(Some(Err(err))) => {
                emit(this.listener, Event::BeforeOnError(*this.entity_type));
                *this.terminated = true;
                emit(this.listener, Event::AfterOnError(*this.entity_type));
                Poll::Ready(Some(Err(err)))
            }
        }
    }
}

impl<S> fmt::Debug for EventedStream<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventedStream")
            .field("subscribed", &self.subscribed)
            .field("terminated", &self.terminated)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use futures_util::StreamExt;
    use std::sync::Mutex;

    struct RecordingListener {
        events: Mutex<Vec<Event>>,
    }

    impl EventListener for RecordingListener {
        fn on_event(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[tokio::test]
    async fn fires_subscribe_next_and_complete_in_order() {
        let recorder = Arc::new(RecordingListener { events: Mutex::new(Vec::new()) });
        let inner = futures_util::stream::iter(vec![Ok::<_, Error>(1), Ok(2)]);
        let mut stream = Box::pin(EventedStream::new(inner, Some(recorder.clone() as Arc<dyn EventListener>), None));

        while stream.next().await.is_some() {}

        let events = recorder.events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                Event::BeforeOnSubscribe(None),
                Event::BeforeOnNext(None),
                Event::BeforeOnNext(None),
                Event::BeforeOnComplete(None),
                Event::AfterOnComplete(None),
            ]
        );
    }

    #[tokio::test]
    async fn terminal_reaches_subscriber_even_if_listener_panics() {
        struct PanickingListener;
        impl EventListener for PanickingListener {
            fn on_event(&self, _event: Event) {
                panic!("boom");
            }
        }

        let inner = futures_util::stream::iter(vec![Err::<i32, _>(Error::new_already_consumed())]);
        let mut stream = Box::pin(EventedStream::new(
            inner,
            Some(Arc::new(PanickingListener) as Arc<dyn EventListener>),
            None,
        ));

        let item = stream.next().await;
        assert!(item.unwrap().unwrap_err().is_already_consumed());
    }
}
