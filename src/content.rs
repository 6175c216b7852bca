//! `ReadableContent` / `WriteableContent`: per-message facades pairing a
//! chunk publisher with a context.
//!
//! Grounded on spec.md §4.7, §4.8. The single-subscription guard is
//! grounded on the "a stream does nothing unless polled, and only once"
//! discipline this corpus documents on its own inbound body type: the raw
//! publisher lives behind a `Mutex<Option<_>>` that is `take()`n on first
//! use, surfacing [`Error::new_already_consumed`] on a second attempt.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::chunk::DataChunk;
use crate::context::{ReaderContext, WriterContext};
use crate::error::{Error, Result};
use crate::multi::Multi;
use crate::operators::{Filter, TypedReader, TypedStreamReader, TypedStreamWriter, TypedWriter};
use crate::single::Single;
use crate::type_descriptor::TypeDescriptor;

/// The inbound per-message facade: an inbound chunk publisher plus the
/// [`ReaderContext`] that will unmarshal it.
///
/// Single-subscriber: the raw publisher is consumed by the first call to
/// [`subscribe`](Self::subscribe), [`as_type`](Self::as_type), or
/// [`as_stream`](Self::as_stream); every later call fails with
/// [`Error::new_already_consumed`] (spec.md §4.7, §8 property 10).
pub struct ReadableContent {
    publisher: Mutex<Option<Multi<DataChunk>>>,
    context: Arc<ReaderContext>,
}

impl ReadableContent {
    pub fn new(publisher: Multi<DataChunk>, context: Arc<ReaderContext>) -> Self {
        ReadableContent {
            publisher: Mutex::new(Some(publisher)),
            context,
        }
    }

    pub fn context(&self) -> &Arc<ReaderContext> {
        &self.context
    }

    fn take_publisher(&self) -> Result<Multi<DataChunk>> {
        let mut guard = self.publisher.lock().expect("readable content lock poisoned");
        guard.take().ok_or_else(Error::new_already_consumed)
    }

    /// Applies the context's filter chain to the raw publisher and returns
    /// it for the caller to drive. Spec.md's callback-based `subscribe`
    /// maps onto handing back a `Stream`; use
    /// [`subscribe_with`](Self::subscribe_with) for the literal
    /// (on_next, on_error, on_complete) callback shape.
    pub fn subscribe(&self) -> Result<Multi<DataChunk>> {
        let publisher = self.take_publisher()?;
        Ok(self.context.apply_filters(publisher, None))
    }

    /// Drives the filtered publisher with individual callbacks. A second
    /// subscription reports `AlreadyConsumed` via `on_error` rather than
    /// panicking or returning a `Result`, matching spec.md §4.7's "any
    /// exception before subscription is reported via `subscriber.on-error`".
    pub async fn subscribe_with<OnNext, OnError, OnComplete>(&self, on_next: OnNext, on_error: OnError, on_complete: OnComplete)
    where
        OnNext: FnMut(DataChunk) + Send,
        OnError: FnOnce(Error) + Send,
        OnComplete: FnOnce() + Send,
    {
        match self.subscribe() {
            Ok(stream) => stream.subscribe_with(on_next, on_error, on_complete).await,
            Err(e) => on_error(e),
        }
    }

    /// Unmarshals the body to a single value of type `T` (spec.md §4.7
    /// `as<T>()`). `T = Vec<u8>` is served by the built-in byte-aggregating
    /// reader every [`ReaderContext`] registers at construction.
    pub async fn as_type<T: Send + 'static>(&self) -> Result<T> {
        let publisher = self.take_publisher()?;
        let target = TypeDescriptor::of::<T>();
        let boxed = Arc::clone(&self.context).unmarshall(publisher, target, None).to_future().await?;
        Ok(*boxed
            .downcast::<T>()
            .expect("reader selected by registry for a matching TypeDescriptor"))
    }

    /// Unmarshals the body to a stream of `T` values (spec.md §4.7
    /// `as-stream<T>()`).
    pub fn as_stream<T: Send + 'static>(&self) -> Result<Multi<T>> {
        let publisher = self.take_publisher()?;
        let target = TypeDescriptor::of::<T>();
        let boxed_stream = Arc::clone(&self.context).unmarshall_stream(publisher, target, None);
        Ok(boxed_stream.map(|boxed| {
            *boxed
                .downcast::<T>()
                .expect("stream reader selected by registry for a matching TypeDescriptor")
        }))
    }

    pub fn register_filter<F: Filter + 'static>(&self, filter: F) {
        self.context.register_filter(filter);
    }

    pub fn register_reader<T, R>(&self, reader: R)
    where
        T: Send + 'static,
        R: TypedReader<T> + 'static,
    {
        self.context.register_reader(reader);
    }

    pub fn register_stream_reader<T, R>(&self, reader: R)
    where
        T: Send + 'static,
        R: TypedStreamReader<T> + 'static,
    {
        self.context.register_stream_reader(reader);
    }
}

impl fmt::Debug for ReadableContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let consumed = self.publisher.lock().map(|g| g.is_none()).unwrap_or(true);
        f.debug_struct("ReadableContent").field("consumed", &consumed).finish()
    }
}

/// The three shapes a [`WriteableContent`] can wrap (spec.md §4.8).
enum WriteableBody {
    Entity {
        value: Box<dyn Any + Send>,
        target: TypeDescriptor,
    },
    EntityStream {
        stream: Multi<Box<dyn Any + Send>>,
        target: TypeDescriptor,
    },
    RawChunks(Multi<DataChunk>),
}

/// The outbound per-message facade: one of an entity, an entity stream, or
/// a raw chunk publisher, plus the [`WriterContext`] that will marshal it.
pub struct WriteableContent {
    body: WriteableBody,
    context: Arc<WriterContext>,
}

impl WriteableContent {
    pub fn from_entity<T: Send + 'static>(value: T, context: Arc<WriterContext>) -> Self {
        WriteableContent {
            body: WriteableBody::Entity {
                value: Box::new(value),
                target: TypeDescriptor::of::<T>(),
            },
            context,
        }
    }

    pub fn from_entity_stream<T: Send + 'static>(stream: Multi<T>, context: Arc<WriterContext>) -> Self {
        let target = TypeDescriptor::of::<T>();
        let erased = stream.map(|v| Box::new(v) as Box<dyn Any + Send>);
        WriteableContent {
            body: WriteableBody::EntityStream { stream: erased, target },
            context,
        }
    }

    pub fn from_raw(publisher: Multi<DataChunk>, context: Arc<WriterContext>) -> Self {
        WriteableContent {
            body: WriteableBody::RawChunks(publisher),
            context,
        }
    }

    pub fn context(&self) -> &Arc<WriterContext> {
        &self.context
    }

    /// Dispatches by body shape (spec.md §4.8): a raw publisher only runs
    /// the filter chain; an entity or entity stream is marshalled first.
    /// `fallback` supplies the registries consulted if this context's own
    /// (and its ancestors') selection misses.
    pub fn to_publisher(self, fallback: Option<Arc<WriterContext>>) -> Multi<DataChunk> {
        match self.body {
            WriteableBody::RawChunks(publisher) => self.context.apply_filters(publisher, None),
            WriteableBody::Entity { value, target } => {
                let single = Single::just(value);
                self.context.marshall(single, target, fallback)
            }
            WriteableBody::EntityStream { stream, target } => self.context.marshall_stream(stream, target, fallback),
        }
    }

    pub async fn subscribe_with<OnNext, OnError, OnComplete>(self, on_next: OnNext, on_error: OnError, on_complete: OnComplete)
    where
        OnNext: FnMut(DataChunk) + Send,
        OnError: FnOnce(Error) + Send,
        OnComplete: FnOnce() + Send,
    {
        self.to_publisher(None).subscribe_with(on_next, on_error, on_complete).await
    }

    pub fn register_filter<F: Filter + 'static>(&self, filter: F) {
        self.context.register_filter(filter);
    }

    pub fn register_writer<T, W>(&self, writer: W)
    where
        T: Send + 'static,
        W: TypedWriter<T> + 'static,
    {
        self.context.register_writer(writer);
    }

    pub fn register_stream_writer<T, W>(&self, writer: W)
    where
        T: Send + 'static,
        W: TypedStreamWriter<T> + 'static,
    {
        self.context.register_stream_writer(writer);
    }
}

impl fmt::Debug for WriteableContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = match &self.body {
            WriteableBody::Entity { .. } => "Entity",
            WriteableBody::EntityStream { .. } => "EntityStream",
            WriteableBody::RawChunks(_) => "RawChunks",
        };
        f.debug_struct("WriteableContent").field("body", &shape).finish()
    }
}

fn _assert_send_sync() {
    fn _assert_send<T: Send>() {}

    _assert_send::<ReadableContent>();
    _assert_send::<WriteableContent>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;
    use crate::headers::{ReaderHeaders, WriterHeaders};
    use crate::media_type::MediaType;
    use crate::operators::WriteAck;
    use bytes::Bytes;
    use futures_util::StreamExt;

    fn chunk_publisher(parts: &[&'static [u8]]) -> Multi<DataChunk> {
        Multi::just(parts.iter().map(|p| DataChunk::from_buffer(Buffer::from_bytes(Bytes::from_static(p)))).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn passthrough_with_no_filters_concatenates_bytes() {
        let ctx = Arc::new(ReaderContext::new(ReaderHeaders::default()));
        let content = ReadableContent::new(chunk_publisher(&[b"hello", b"world"]), ctx);
        let bytes: Vec<u8> = content.as_type().await.unwrap();
        assert_eq!(bytes, b"helloworld");
    }

    #[tokio::test]
    async fn second_as_type_call_fails_already_consumed() {
        let ctx = Arc::new(ReaderContext::new(ReaderHeaders::default()));
        let content = ReadableContent::new(chunk_publisher(&[b"x"]), ctx);
        let _first: Vec<u8> = content.as_type().await.unwrap();
        let err = content.as_type::<Vec<u8>>().await.unwrap_err();
        assert!(err.is_already_consumed());
    }

    #[tokio::test]
    async fn uppercase_filter_runs_before_reader_sees_bytes() {
        struct Uppercase;
        impl Filter for Uppercase {
            fn filter(&self, input: Multi<DataChunk>) -> Multi<DataChunk> {
                input.map(|chunk| {
                    let upper = chunk.buffer().to_bytes().iter().map(u8::to_ascii_uppercase).collect::<Vec<_>>();
                    chunk.release(1);
                    DataChunk::from_buffer(Buffer::from_bytes(Bytes::from(upper)))
                })
            }
        }

        let ctx = Arc::new(ReaderContext::new(ReaderHeaders::default()));
        let content = ReadableContent::new(chunk_publisher(&[b"{\"n\": 42}"]), ctx);
        content.register_filter(Uppercase);
        let bytes: Vec<u8> = content.as_type().await.unwrap();
        assert_eq!(bytes, b"{\"N\": 42}");
    }

    struct PlainTextWriter;
    impl TypedWriter<String> for PlainTextWriter {
        fn accept(&self, target: &TypeDescriptor, ctx: &WriterContext) -> Option<WriteAck> {
            if *target != TypeDescriptor::of::<String>() {
                return None;
            }
            let mt = MediaType::parse("text/plain").unwrap();
            ctx.find_accepted_exact(&mt)
                .ok()
                .map(|chosen| WriteAck::new(TypeDescriptor::of::<PlainTextWriter>()).with_content_type(chosen))
        }

        fn write(&self, content: Single<String>, _target: &TypeDescriptor, _ctx: &WriterContext, _ack: &WriteAck) -> Multi<DataChunk> {
            Multi::from_stream(futures_util::stream::once(async move {
                let value = content.to_future().await?;
                Ok(DataChunk::from_buffer(Buffer::from_bytes(Bytes::from(value.into_bytes()))))
            }))
        }
    }

    #[tokio::test]
    async fn writeable_entity_selects_writer_by_accept() {
        let ctx = Arc::new(WriterContext::new(
            WriterHeaders::default(),
            vec![MediaType::parse("text/plain; q=0.8").unwrap(), MediaType::parse("application/json; q=0.1").unwrap()],
        ));
        ctx.register_writer::<String, _>(PlainTextWriter);
        let content = WriteableContent::from_entity("hi".to_owned(), Arc::clone(&ctx));
        let chunks: Vec<_> = content.to_publisher(None).collect().await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(ctx.content_type().unwrap().unwrap().to_string(), "text/plain");
    }

    #[tokio::test]
    async fn raw_chunks_skip_marshalling() {
        let ctx = Arc::new(WriterContext::new(WriterHeaders::default(), Vec::new()));
        let content = WriteableContent::from_raw(chunk_publisher(&[b"raw"]), ctx);
        let mut stream = Box::pin(content.to_publisher(None));
        let chunk = stream.next().await.unwrap().unwrap();
        assert_eq!(&chunk.buffer().to_bytes()[..], b"raw");
    }
}
