//! Operator capability traits: `Filter`, `Reader`/`Writer` and their stream
//! variants, plus the erasure adapters that let a registry hold
//! heterogeneous typed operators behind one object-safe trait.
//!
//! Grounded on spec.md §3 ("Operator entry") and §9's redesign flag
//! (`TypeDescriptor`-keyed `accept` rather than reflection). The
//! erasure-adapter pattern generalizes this corpus's own boxed-trait-object
//! plumbing — `client/dispatch.rs` and `service/util.rs` box `dyn
//! Service`/`dyn Future` behind object-safe wrappers for the same reason:
//! heterogeneous generic callers behind one registry.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::chunk::DataChunk;
use crate::context::{ReaderContext, WriterContext};
use crate::media_type::MediaType;
use crate::multi::Multi;
use crate::single::Single;
use crate::type_descriptor::TypeDescriptor;

/// A byte-stream transformer folded into the filter chain in registration
/// order (spec.md §4.4). A filter that does not apply here returns `input`
/// unchanged rather than dropping it — the source's "null result is
/// ignored" contract (spec.md §4.4: "a contract, not a bug") translated to
/// owned Rust streams, where there is no way to hand an unconsumed input
/// back to the caller except by returning it.
pub trait Filter: Send + Sync {
    fn filter(&self, input: Multi<DataChunk>) -> Multi<DataChunk>;
}

/// The writer's acknowledgment: the content type and length it chose, and
/// which writer produced it. Unifies the source corpus's `Ack`/`Promise`
/// revisions (see DESIGN.md Open Questions).
#[derive(Debug, Clone)]
pub struct WriteAck {
    pub content_type: Option<MediaType>,
    pub content_length: Option<u64>,
    pub writer_ref: TypeDescriptor,
}

impl WriteAck {
    pub fn new(writer_ref: TypeDescriptor) -> Self {
        WriteAck {
            content_type: None,
            content_length: None,
            writer_ref,
        }
    }

    pub fn with_content_type(mut self, mt: MediaType) -> Self {
        self.content_type = Some(mt);
        self
    }

    pub fn with_content_length(mut self, len: u64) -> Self {
        self.content_length = Some(len);
        self
    }
}

/// The user-facing trait implementors write: converts a filtered chunk
/// stream into a single typed value.
pub trait TypedReader<T>: Send + Sync {
    fn accept(&self, target: &TypeDescriptor, ctx: &ReaderContext) -> bool;
    fn read(&self, publisher: Multi<DataChunk>, target: &TypeDescriptor, ctx: &ReaderContext) -> Single<T>;
}

/// The object-safe, type-erased form a [`crate::registry::OperatorRegistry`]
/// actually stores.
pub trait Reader: Send + Sync {
    fn accept(&self, target: &TypeDescriptor, ctx: &ReaderContext) -> bool;
    fn read(
        &self,
        publisher: Multi<DataChunk>,
        target: &TypeDescriptor,
        ctx: &ReaderContext,
    ) -> Single<Box<dyn Any + Send>>;
}

struct ReaderAdapter<T, R> {
    inner: R,
    _marker: PhantomData<fn() -> T>,
}

impl<T, R> Reader for ReaderAdapter<T, R>
where
    T: Send + 'static,
    R: TypedReader<T>,
{
    fn accept(&self, target: &TypeDescriptor, ctx: &ReaderContext) -> bool {
        self.inner.accept(target, ctx)
    }

    fn read(
        &self,
        publisher: Multi<DataChunk>,
        target: &TypeDescriptor,
        ctx: &ReaderContext,
    ) -> Single<Box<dyn Any + Send>> {
        self.inner
            .read(publisher, target, ctx)
            .map(|value| Box::new(value) as Box<dyn Any + Send>)
    }
}

/// Erases a `TypedReader<T>` into an `Arc<dyn Reader>` for registration.
pub fn erase_reader<T, R>(reader: R) -> Arc<dyn Reader>
where
    T: Send + 'static,
    R: TypedReader<T> + 'static,
{
    Arc::new(ReaderAdapter {
        inner: reader,
        _marker: PhantomData,
    })
}

pub trait TypedStreamReader<T>: Send + Sync {
    fn accept(&self, target: &TypeDescriptor, ctx: &ReaderContext) -> bool;
    fn read(&self, publisher: Multi<DataChunk>, target: &TypeDescriptor, ctx: &ReaderContext) -> Multi<T>;
}

pub trait StreamReader: Send + Sync {
    fn accept(&self, target: &TypeDescriptor, ctx: &ReaderContext) -> bool;
    fn read(
        &self,
        publisher: Multi<DataChunk>,
        target: &TypeDescriptor,
        ctx: &ReaderContext,
    ) -> Multi<Box<dyn Any + Send>>;
}

struct StreamReaderAdapter<T, R> {
    inner: R,
    _marker: PhantomData<fn() -> T>,
}

impl<T, R> StreamReader for StreamReaderAdapter<T, R>
where
    T: Send + 'static,
    R: TypedStreamReader<T>,
{
    fn accept(&self, target: &TypeDescriptor, ctx: &ReaderContext) -> bool {
        self.inner.accept(target, ctx)
    }

    fn read(
        &self,
        publisher: Multi<DataChunk>,
        target: &TypeDescriptor,
        ctx: &ReaderContext,
    ) -> Multi<Box<dyn Any + Send>> {
        self.inner
            .read(publisher, target, ctx)
            .map(|value| Box::new(value) as Box<dyn Any + Send>)
    }
}

pub fn erase_stream_reader<T, R>(reader: R) -> Arc<dyn StreamReader>
where
    T: Send + 'static,
    R: TypedStreamReader<T> + 'static,
{
    Arc::new(StreamReaderAdapter {
        inner: reader,
        _marker: PhantomData,
    })
}

/// The user-facing trait implementors write: converts a single typed value
/// into a chunk stream, having already opted in via `accept()`.
pub trait TypedWriter<T>: Send + Sync {
    fn accept(&self, target: &TypeDescriptor, ctx: &WriterContext) -> Option<WriteAck>;
    fn write(&self, content: Single<T>, target: &TypeDescriptor, ctx: &WriterContext, ack: &WriteAck) -> Multi<DataChunk>;
}

pub trait Writer: Send + Sync {
    fn accept(&self, target: &TypeDescriptor, ctx: &WriterContext) -> Option<WriteAck>;
    fn write(
        &self,
        content: Single<Box<dyn Any + Send>>,
        target: &TypeDescriptor,
        ctx: &WriterContext,
        ack: &WriteAck,
    ) -> Multi<DataChunk>;
}

struct WriterAdapter<T, W> {
    inner: W,
    _marker: PhantomData<fn(T)>,
}

impl<T, W> Writer for WriterAdapter<T, W>
where
    T: Send + 'static,
    W: TypedWriter<T>,
{
    fn accept(&self, target: &TypeDescriptor, ctx: &WriterContext) -> Option<WriteAck> {
        self.inner.accept(target, ctx)
    }

    fn write(
        &self,
        content: Single<Box<dyn Any + Send>>,
        target: &TypeDescriptor,
        ctx: &WriterContext,
        ack: &WriteAck,
    ) -> Multi<DataChunk> {
        let typed = content.map(|boxed| {
            *boxed
                .downcast::<T>()
                .expect("writer selected by registry for a matching TypeDescriptor")
        });
        self.inner.write(typed, target, ctx, ack)
    }
}

pub fn erase_writer<T, W>(writer: W) -> Arc<dyn Writer>
where
    T: Send + 'static,
    W: TypedWriter<T> + 'static,
{
    Arc::new(WriterAdapter {
        inner: writer,
        _marker: PhantomData,
    })
}

pub trait TypedStreamWriter<T>: Send + Sync {
    fn accept(&self, target: &TypeDescriptor, ctx: &WriterContext) -> Option<WriteAck>;
    fn write(&self, content: Multi<T>, target: &TypeDescriptor, ctx: &WriterContext, ack: &WriteAck) -> Multi<DataChunk>;
}

pub trait StreamWriter: Send + Sync {
    fn accept(&self, target: &TypeDescriptor, ctx: &WriterContext) -> Option<WriteAck>;
    fn write(
        &self,
        content: Multi<Box<dyn Any + Send>>,
        target: &TypeDescriptor,
        ctx: &WriterContext,
        ack: &WriteAck,
    ) -> Multi<DataChunk>;
}

struct StreamWriterAdapter<T, W> {
    inner: W,
    _marker: PhantomData<fn(T)>,
}

impl<T, W> StreamWriter for StreamWriterAdapter<T, W>
where
    T: Send + 'static,
    W: TypedStreamWriter<T>,
{
    fn accept(&self, target: &TypeDescriptor, ctx: &WriterContext) -> Option<WriteAck> {
        self.inner.accept(target, ctx)
    }

    fn write(
        &self,
        content: Multi<Box<dyn Any + Send>>,
        target: &TypeDescriptor,
        ctx: &WriterContext,
        ack: &WriteAck,
    ) -> Multi<DataChunk> {
        let typed = content.map(|boxed| {
            *boxed
                .downcast::<T>()
                .expect("stream writer selected by registry for a matching TypeDescriptor")
        });
        self.inner.write(typed, target, ctx, ack)
    }
}

pub fn erase_stream_writer<T, W>(writer: W) -> Arc<dyn StreamWriter>
where
    T: Send + 'static,
    W: TypedStreamWriter<T> + 'static,
{
    Arc::new(StreamWriterAdapter {
        inner: writer,
        _marker: PhantomData,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ReaderContext;

    struct UppercaseStringReader;

    impl TypedReader<String> for UppercaseStringReader {
        fn accept(&self, target: &TypeDescriptor, _ctx: &ReaderContext) -> bool {
            *target == TypeDescriptor::of::<String>()
        }

        fn read(&self, publisher: Multi<DataChunk>, _target: &TypeDescriptor, _ctx: &ReaderContext) -> Single<String> {
            use futures_util::StreamExt;
            Single::from_future(async move {
                let mut bytes = Vec::new();
                let mut stream = Box::pin(publisher);
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk?;
                    bytes.extend_from_slice(&chunk.buffer().to_bytes());
                }
                Ok(String::from_utf8(bytes).unwrap().to_uppercase())
            })
        }
    }

    #[tokio::test]
    async fn erased_reader_roundtrips_through_any() {
        let ctx = ReaderContext::new(Default::default());
        let erased = erase_reader::<String, _>(UppercaseStringReader);
        let target = TypeDescriptor::of::<String>();
        assert!(erased.accept(&target, &ctx));

        let chunks = Multi::just(vec![DataChunk::from_buffer(crate::buffer::Buffer::from_bytes(
            bytes::Bytes::from_static(b"hi"),
        ))]);
        let boxed = erased.read(chunks, &target, &ctx).to_future().await.unwrap();
        let value = *boxed.downcast::<String>().unwrap();
        assert_eq!(value, "HI");
    }
}
