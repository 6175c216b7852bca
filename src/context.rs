//! `ReaderContext` / `WriterContext`: the headers-and-registries envelope
//! passed to every operator.
//!
//! Grounded on spec.md §4.5, §4.6. Headers wrap `http::HeaderMap` via
//! [`crate::headers`]; registries are [`OperatorRegistry`] instances keyed
//! by [`TypeDescriptor`], mirroring how this corpus's own context objects
//! let a child inherit its parent's filters/operators by reference. Charset
//! and Content-Type caching uses `std::sync::OnceLock`, the single-
//! assignment discipline spec.md §5 calls for ("compute once... publish via
//! a volatile flag").

use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use futures_util::StreamExt;

use crate::chunk::DataChunk;
use crate::error::{Error, OperatorKind, Result};
use crate::event::EventListener;
use crate::headers::{ReaderHeaders, WriterHeaders};
use crate::media_type::MediaType;
use crate::multi::Multi;
use crate::operators::{
    erase_reader, erase_stream_reader, erase_stream_writer, erase_writer, Filter, Reader, StreamReader,
    StreamWriter, TypedReader, TypedStreamReader, TypedStreamWriter, TypedWriter, Writer,
};
use crate::registry::OperatorRegistry;
use crate::single::Single;
use crate::type_descriptor::TypeDescriptor;

#[derive(Clone)]
enum ContentTypeOutcome {
    Resolved(Option<MediaType>),
    Invalid(String),
}

#[derive(Clone)]
enum CharsetOutcome {
    Known(&'static encoding_rs::Encoding),
    Invalid(String),
}

/// Reads the `charset` parameter off a resolved `Content-Type`, defaulting
/// to UTF-8, per spec.md §4.5 ("Charset resolution").
fn resolve_charset(content_type: &std::result::Result<Option<MediaType>, Error>) -> CharsetOutcome {
    let name = match content_type {
        Ok(Some(mt)) => mt.charset().map(str::to_owned),
        Ok(None) | Err(_) => None,
    };
    match name {
        Some(n) => match encoding_rs::Encoding::for_label(n.as_bytes()) {
            Some(enc) => CharsetOutcome::Known(enc),
            None => CharsetOutcome::Invalid(n),
        },
        None => CharsetOutcome::Known(encoding_rs::UTF_8),
    }
}

/// Reads the whole body into one `Vec<u8>`. Registered automatically at the
/// root of every [`ReaderContext`] so `ReadableContent::as::<Vec<u8>>()` has
/// a working default without the caller registering anything (spec.md §4.7:
/// "short-circuit to a built-in `ByteArrayOutputStream`-backed reader").
struct ByteVecReader;

impl TypedReader<Vec<u8>> for ByteVecReader {
    fn accept(&self, target: &TypeDescriptor, _ctx: &ReaderContext) -> bool {
        *target == TypeDescriptor::of::<Vec<u8>>()
    }

    fn read(&self, publisher: Multi<DataChunk>, _target: &TypeDescriptor, _ctx: &ReaderContext) -> Single<Vec<u8>> {
        Single::from_future(async move {
            let mut out = Vec::new();
            let mut stream = Box::pin(publisher);
            while let Some(next) = stream.next().await {
                let chunk = next?;
                out.extend_from_slice(&chunk.buffer().to_bytes());
                chunk.release(1);
            }
            Ok(out)
        })
    }
}

/// The headers-and-registries envelope every inbound operator runs inside.
///
/// A child inherits its parent's filters and operators by reference: the
/// child's own [`OperatorRegistry`] instances are constructed with the
/// parent's corresponding registry as their `parent` link, so first-match
/// selection walks child-then-parent automatically (spec.md §4.3).
pub struct ReaderContext {
    headers: ReaderHeaders,
    readers: Arc<OperatorRegistry<Arc<dyn Reader>>>,
    stream_readers: Arc<OperatorRegistry<Arc<dyn StreamReader>>>,
    filters: Arc<OperatorRegistry<Arc<dyn Filter>>>,
    parent: Option<Arc<ReaderContext>>,
    listener: Option<Arc<dyn EventListener>>,
    content_type: OnceLock<ContentTypeOutcome>,
    charset: OnceLock<CharsetOutcome>,
}

impl ReaderContext {
    /// A root context with no parent. Registers the built-in `Vec<u8>`
    /// reader (spec.md §4.7).
    pub fn new(headers: ReaderHeaders) -> Self {
        let ctx = ReaderContext {
            headers,
            readers: Arc::new(OperatorRegistry::new()),
            stream_readers: Arc::new(OperatorRegistry::new()),
            filters: Arc::new(OperatorRegistry::new()),
            parent: None,
            listener: None,
            content_type: OnceLock::new(),
            charset: OnceLock::new(),
        };
        ctx.register_reader::<Vec<u8>, _>(ByteVecReader);
        ctx
    }

    /// A child context inheriting `parent`'s filters and operators by
    /// reference (spec.md §3: "the child's parent is immutable after
    /// construction").
    pub fn with_parent(headers: ReaderHeaders, parent: Arc<ReaderContext>) -> Self {
        ReaderContext {
            headers,
            readers: Arc::new(OperatorRegistry::with_parent(Arc::clone(&parent.readers))),
            stream_readers: Arc::new(OperatorRegistry::with_parent(Arc::clone(&parent.stream_readers))),
            filters: Arc::new(OperatorRegistry::with_parent(Arc::clone(&parent.filters))),
            parent: Some(parent),
            listener: None,
            content_type: OnceLock::new(),
            charset: OnceLock::new(),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn headers(&self) -> &ReaderHeaders {
        &self.headers
    }

    pub fn parent(&self) -> Option<&Arc<ReaderContext>> {
        self.parent.as_ref()
    }

    /// The parsed `Content-Type`, resolved once and cached (spec.md §4.5).
    pub fn content_type(&self) -> Result<Option<&MediaType>> {
        let outcome = self
            .content_type
            .get_or_init(|| match self.headers.content_type() {
                Ok(mt) => ContentTypeOutcome::Resolved(mt),
                Err(e) => ContentTypeOutcome::Invalid(e.to_string()),
            });
        match outcome {
            ContentTypeOutcome::Resolved(mt) => Ok(mt.as_ref()),
            ContentTypeOutcome::Invalid(msg) => Err(Error::new_illegal_argument(msg.clone())),
        }
    }

    /// `Content-Type`'s `charset` parameter, or UTF-8 by default. Fails
    /// with [`Error::new_charset_invalid`] if the named charset is
    /// malformed or unsupported (spec.md §4.5, §7).
    pub fn charset(&self) -> Result<&'static encoding_rs::Encoding> {
        let content_type = self.content_type().map(|opt| opt.cloned());
        let outcome = self.charset.get_or_init(|| resolve_charset(&content_type));
        match outcome {
            CharsetOutcome::Known(enc) => Ok(*enc),
            CharsetOutcome::Invalid(name) => Err(Error::new_charset_invalid(name.clone())),
        }
    }

    pub fn register_filter<F: Filter + 'static>(&self, filter: F) {
        let qualifier = TypeDescriptor::of::<F>();
        self.filters.register_last(qualifier, Arc::new(filter) as Arc<dyn Filter>);
    }

    pub fn register_reader<T, R>(&self, reader: R)
    where
        T: Send + 'static,
        R: TypedReader<T> + 'static,
    {
        let qualifier = TypeDescriptor::of::<R>();
        self.readers.register_first(qualifier, erase_reader::<T, R>(reader));
    }

    pub fn register_stream_reader<T, R>(&self, reader: R)
    where
        T: Send + 'static,
        R: TypedStreamReader<T> + 'static,
    {
        let qualifier = TypeDescriptor::of::<R>();
        self.stream_readers
            .register_first(qualifier, erase_stream_reader::<T, R>(reader));
    }

    /// First reader whose `accept(target, self)` returns true, searching
    /// this context then its ancestors then `fallback` (spec.md §4.5).
    pub fn select_reader(&self, target: &TypeDescriptor, fallback: Option<&ReaderContext>) -> Option<Arc<dyn Reader>> {
        self.readers
            .select(|_, op| op.accept(target, self), fallback.map(|f| f.readers.as_ref()))
    }

    pub fn select_stream_reader(
        &self,
        target: &TypeDescriptor,
        fallback: Option<&ReaderContext>,
    ) -> Option<Arc<dyn StreamReader>> {
        self.stream_readers
            .select(|_, op| op.accept(target, self), fallback.map(|f| f.stream_readers.as_ref()))
    }

    /// Folds this context's filters over `publisher`, then the parent's
    /// (spec.md §4.4: child filters closest to the source, parent
    /// outermost), then wraps the result in an event-emitting stream.
    pub fn apply_filters(&self, publisher: Multi<DataChunk>, entity_type: Option<TypeDescriptor>) -> Multi<DataChunk> {
        let filtered = self.fold_filter_lineage(publisher);
        Multi::from_stream(crate::event::EventedStream::new(filtered, self.listener.clone(), entity_type))
    }

    fn fold_filter_lineage(&self, publisher: Multi<DataChunk>) -> Multi<DataChunk> {
        let mut last = publisher;
        for filter in self.filters.snapshot() {
            last = filter.filter(last);
        }
        match &self.parent {
            Some(parent) => parent.fold_filter_lineage(last),
            None => last,
        }
    }

    /// The core unmarshalling method (spec.md §4.5): an empty `publisher`
    /// short-circuits to an empty `Single` without selecting a reader; a
    /// missing reader surfaces as `NoOperator`; any other failure is
    /// wrapped as `TransformationFailed` unless it is already an
    /// `IllegalArgument`.
    pub fn unmarshall(
        self: Arc<Self>,
        publisher: Multi<DataChunk>,
        target: TypeDescriptor,
        fallback: Option<Arc<ReaderContext>>,
    ) -> Single<Box<dyn Any + Send>> {
        let ctx = self;
        Single::from_future_opt(async move {
            let mut stream = Box::pin(publisher);
            let first = match stream.next().await {
                None => return Ok(None),
                Some(Err(e)) => return Err(e),
                Some(Ok(chunk)) => chunk,
            };
            let rest = Multi::from_stream(stream);
            let full = Multi::from_stream(futures_util::stream::once(async move { Ok::<_, Error>(first) }).chain(rest));

            let reader = match ctx.select_reader(&target, fallback.as_deref()) {
                Some(r) => r,
                None => return Err(Error::new_no_operator(OperatorKind::Reader, target)),
            };
            let filtered = ctx.apply_filters(full, Some(target));
            match reader.read(filtered, &target, &ctx).await {
                Ok(inner) => Ok(inner),
                Err(e) => Err(Error::wrap_or_propagate(e)),
            }
        })
    }

    /// As [`unmarshall`](Self::unmarshall), but routes through the
    /// stream-reader registry and returns every item the reader produces.
    pub fn unmarshall_stream(
        self: Arc<Self>,
        publisher: Multi<DataChunk>,
        target: TypeDescriptor,
        fallback: Option<Arc<ReaderContext>>,
    ) -> Multi<Box<dyn Any + Send>> {
        let reader = match self.select_stream_reader(&target, fallback.as_deref()) {
            Some(r) => r,
            None => return Multi::error(Error::new_no_operator(OperatorKind::StreamReader, target)),
        };
        let filtered = self.apply_filters(publisher, Some(target));
        reader.read(filtered, &target, &self).map_err(Error::wrap_or_propagate)
    }

    /// For callers that want a specific registered reader by its
    /// registration qualifier, bypassing `accept()` (spec.md §4.5
    /// "reader-by-class selection").
    pub fn unmarshall_with_reader_class(
        self: Arc<Self>,
        publisher: Multi<DataChunk>,
        qualifier: TypeDescriptor,
        target: TypeDescriptor,
        fallback: Option<Arc<ReaderContext>>,
    ) -> Single<Box<dyn Any + Send>> {
        let ctx = self;
        Single::from_future_opt(async move {
            let reader = match ctx.readers.get(&qualifier, fallback.as_ref().map(|f| f.readers.as_ref())) {
                Some(r) => r,
                None => return Err(Error::new_no_operator(OperatorKind::Reader, target)),
            };
            let filtered = ctx.apply_filters(publisher, Some(target));
            match reader.read(filtered, &target, &ctx).await {
                Ok(inner) => Ok(inner),
                Err(e) => Err(Error::wrap_or_propagate(e)),
            }
        })
    }
}

impl fmt::Debug for ReaderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderContext")
            .field("headers", &self.headers)
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

/// The headers-and-registries envelope every outbound operator runs inside.
pub struct WriterContext {
    headers: RwLock<WriterHeaders>,
    accepted_types: Vec<MediaType>,
    writers: Arc<OperatorRegistry<Arc<dyn Writer>>>,
    stream_writers: Arc<OperatorRegistry<Arc<dyn StreamWriter>>>,
    filters: Arc<OperatorRegistry<Arc<dyn Filter>>>,
    parent: Option<Arc<WriterContext>>,
    listener: Option<Arc<dyn EventListener>>,
}

impl WriterContext {
    pub fn new(headers: WriterHeaders, accepted_types: Vec<MediaType>) -> Self {
        WriterContext {
            headers: RwLock::new(headers),
            accepted_types,
            writers: Arc::new(OperatorRegistry::new()),
            stream_writers: Arc::new(OperatorRegistry::new()),
            filters: Arc::new(OperatorRegistry::new()),
            parent: None,
            listener: None,
        }
    }

    pub fn with_parent(headers: WriterHeaders, accepted_types: Vec<MediaType>, parent: Arc<WriterContext>) -> Self {
        WriterContext {
            headers: RwLock::new(headers),
            accepted_types,
            writers: Arc::new(OperatorRegistry::with_parent(Arc::clone(&parent.writers))),
            stream_writers: Arc::new(OperatorRegistry::with_parent(Arc::clone(&parent.stream_writers))),
            filters: Arc::new(OperatorRegistry::with_parent(Arc::clone(&parent.filters))),
            parent: Some(parent),
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn parent(&self) -> Option<&Arc<WriterContext>> {
        self.parent.as_ref()
    }

    pub fn accepted_types(&self) -> &[MediaType] {
        &self.accepted_types
    }

    pub fn headers_snapshot(&self) -> WriterHeaders {
        self.headers.read().expect("headers lock poisoned").clone()
    }

    pub fn content_type(&self) -> Result<Option<MediaType>> {
        self.headers.read().expect("headers lock poisoned").content_type()
    }

    /// Sets `Content-Type` only if not already present (spec.md §4.6
    /// `content-type(mt)`).
    pub fn set_content_type_if_absent(&self, mt: &MediaType) {
        self.headers.write().expect("headers lock poisoned").set_content_type_if_absent(mt);
    }

    /// Sets `Content-Length` only if not already present (spec.md §4.6
    /// `content-length(n)`).
    pub fn set_content_length_if_absent(&self, n: u64) {
        self.headers
            .write()
            .expect("headers lock poisoned")
            .set_content_length_if_absent(n);
    }

    /// Negotiates a response media type against `Accept` (spec.md §4.6).
    /// Never returns a wildcard: a matched wildcard `Accept` entry falls
    /// back to `default`.
    pub fn find_accepted<F>(&self, predicate: F, default: MediaType) -> Result<MediaType>
    where
        F: Fn(&MediaType) -> bool,
    {
        let existing = self.content_type()?;
        if let Some(ct) = &existing {
            if predicate(ct) {
                return Ok(ct.clone());
            }
        }
        for mt in &self.accepted_types {
            if predicate(mt) {
                return Ok(if mt.is_wildcard() { default } else { mt.clone() });
            }
        }
        if existing.is_none() && self.accepted_types.is_empty() {
            Ok(default)
        } else {
            Err(Error::new_no_accepted_content_type())
        }
    }

    /// The exact-match specialization of [`find_accepted`](Self::find_accepted).
    pub fn find_accepted_exact(&self, mt: &MediaType) -> Result<MediaType> {
        let target = mt.clone();
        self.find_accepted(move |candidate| candidate.test(&target), mt.clone())
    }

    pub fn register_filter<F: Filter + 'static>(&self, filter: F) {
        let qualifier = TypeDescriptor::of::<F>();
        self.filters.register_last(qualifier, Arc::new(filter) as Arc<dyn Filter>);
    }

    pub fn register_writer<T, W>(&self, writer: W)
    where
        T: Send + 'static,
        W: TypedWriter<T> + 'static,
    {
        let qualifier = TypeDescriptor::of::<W>();
        self.writers.register_first(qualifier, erase_writer::<T, W>(writer));
    }

    pub fn register_stream_writer<T, W>(&self, writer: W)
    where
        T: Send + 'static,
        W: TypedStreamWriter<T> + 'static,
    {
        let qualifier = TypeDescriptor::of::<W>();
        self.stream_writers
            .register_first(qualifier, erase_stream_writer::<T, W>(writer));
    }

    pub fn select_writer(
        &self,
        target: &TypeDescriptor,
        fallback: Option<&WriterContext>,
    ) -> Option<(Arc<dyn Writer>, crate::operators::WriteAck)> {
        self.writers
            .select_map(|_, op| op.accept(target, self), fallback.map(|f| f.writers.as_ref()))
    }

    pub fn select_stream_writer(
        &self,
        target: &TypeDescriptor,
        fallback: Option<&WriterContext>,
    ) -> Option<(Arc<dyn StreamWriter>, crate::operators::WriteAck)> {
        self.stream_writers
            .select_map(|_, op| op.accept(target, self), fallback.map(|f| f.stream_writers.as_ref()))
    }

    pub fn apply_filters(&self, publisher: Multi<DataChunk>, entity_type: Option<TypeDescriptor>) -> Multi<DataChunk> {
        let filtered = self.fold_filter_lineage(publisher);
        Multi::from_stream(crate::event::EventedStream::new(filtered, self.listener.clone(), entity_type))
    }

    fn fold_filter_lineage(&self, publisher: Multi<DataChunk>) -> Multi<DataChunk> {
        let mut last = publisher;
        for filter in self.filters.snapshot() {
            last = filter.filter(last);
        }
        match &self.parent {
            Some(parent) => parent.fold_filter_lineage(last),
            None => last,
        }
    }

    /// The core marshalling method (spec.md §4.6): an empty `content`
    /// short-circuits to the filtered-but-empty stream; a missing writer
    /// surfaces as `NoWriter`; the winning ack's content type/length are
    /// applied via `put-if-absent` before the writer runs.
    pub fn marshall(
        self: Arc<Self>,
        content: Single<Box<dyn Any + Send>>,
        target: TypeDescriptor,
        fallback: Option<Arc<WriterContext>>,
    ) -> Multi<DataChunk> {
        let ctx = self;
        let produced = async move {
            match content.await {
                Ok(None) => ctx.apply_filters(Multi::empty(), Some(target)),
                Ok(Some(value)) => match ctx.select_writer(&target, fallback.as_deref()) {
                    Some((writer, ack)) => {
                        if let Some(ct) = &ack.content_type {
                            ctx.set_content_type_if_absent(ct);
                        }
                        if let Some(len) = ack.content_length {
                            ctx.set_content_length_if_absent(len);
                        }
                        let single = Single::just(value);
                        let written = writer.write(single, &target, &ctx, &ack).map_err(Error::wrap_or_propagate);
                        ctx.apply_filters(written, Some(target))
                    }
                    None => Multi::error(Error::new_no_operator(OperatorKind::Writer, target)),
                },
                Err(e) => Multi::error(e),
            }
        };
        Multi::from_stream(futures_util::stream::once(produced).flatten())
    }

    /// As [`marshall`](Self::marshall), but routes through the
    /// stream-writer registry for an entity stream rather than a single
    /// entity.
    pub fn marshall_stream(
        self: Arc<Self>,
        content: Multi<Box<dyn Any + Send>>,
        target: TypeDescriptor,
        fallback: Option<Arc<WriterContext>>,
    ) -> Multi<DataChunk> {
        match self.select_stream_writer(&target, fallback.as_deref()) {
            Some((writer, ack)) => {
                if let Some(ct) = &ack.content_type {
                    self.set_content_type_if_absent(ct);
                }
                if let Some(len) = ack.content_length {
                    self.set_content_length_if_absent(len);
                }
                let written = writer.write(content, &target, &self, &ack).map_err(Error::wrap_or_propagate);
                self.apply_filters(written, Some(target))
            }
            None => Multi::error(Error::new_no_operator(OperatorKind::StreamWriter, target)),
        }
    }
}

impl fmt::Debug for WriterContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterContext")
            .field("accepted_types", &self.accepted_types)
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

fn _assert_send_sync() {
    fn _assert_send<T: Send>() {}
    fn _assert_sync<T: Sync>() {}

    _assert_send::<ReaderContext>();
    _assert_sync::<ReaderContext>();
    _assert_send::<WriterContext>();
    _assert_sync::<WriterContext>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;
    use crate::operators::WriteAck;
    use bytes::Bytes;

    fn chunks(data: &'static [u8]) -> Multi<DataChunk> {
        Multi::just(vec![DataChunk::from_buffer(Buffer::from_bytes(Bytes::from_static(data)))])
    }

    #[test]
    fn charset_defaults_to_utf8() {
        let ctx = ReaderContext::new(ReaderHeaders::default());
        assert_eq!(ctx.charset().unwrap().name(), "UTF-8");
    }

    #[test]
    fn charset_reads_content_type_param() {
        let mut map = http::HeaderMap::new();
        map.insert(http::header::CONTENT_TYPE, "text/plain; charset=iso-8859-1".parse().unwrap());
        let ctx = ReaderContext::new(ReaderHeaders::new(map));
        assert_eq!(ctx.charset().unwrap().name(), "windows-1252");
    }

    #[test]
    fn invalid_charset_name_fails() {
        let mut map = http::HeaderMap::new();
        map.insert(http::header::CONTENT_TYPE, "text/plain; charset=not-a-real-charset".parse().unwrap());
        let ctx = ReaderContext::new(ReaderHeaders::new(map));
        let err = ctx.charset().unwrap_err();
        assert!(err.is_charset_invalid());
    }

    #[tokio::test]
    async fn built_in_byte_vec_reader_concatenates_chunks() {
        let ctx = Arc::new(ReaderContext::new(ReaderHeaders::default()));
        let publisher = Multi::just(vec![
            DataChunk::from_buffer(Buffer::from_bytes(Bytes::from_static(b"hello"))),
            DataChunk::from_buffer(Buffer::from_bytes(Bytes::from_static(b"world"))),
        ]);
        let target = TypeDescriptor::of::<Vec<u8>>();
        let bytes = ctx.unmarshall(publisher, target, None).to_future().await.unwrap();
        let bytes = *bytes.downcast::<Vec<u8>>().unwrap();
        assert_eq!(bytes, b"helloworld");
    }

    #[tokio::test]
    async fn empty_publisher_unmarshalls_to_empty_single() {
        let ctx = Arc::new(ReaderContext::new(ReaderHeaders::default()));
        let target = TypeDescriptor::of::<Vec<u8>>();
        let result = ctx.unmarshall(Multi::empty(), target, None).to_future().await;
        assert!(result.unwrap_err().is_empty_content());
    }

    #[tokio::test]
    async fn unmarshall_with_no_reader_is_no_operator() {
        let ctx = Arc::new(ReaderContext::new(ReaderHeaders::default()));
        let target = TypeDescriptor::of::<String>();
        let result = ctx.unmarshall(chunks(b"hi"), target, None).to_future().await;
        assert!(result.unwrap_err().is_no_operator());
    }

    #[tokio::test]
    async fn child_reader_shadows_parent_reader() {
        struct Echo(&'static str);
        impl TypedReader<String> for Echo {
            fn accept(&self, target: &TypeDescriptor, _ctx: &ReaderContext) -> bool {
                *target == TypeDescriptor::of::<String>()
            }
            fn read(&self, _publisher: Multi<DataChunk>, _target: &TypeDescriptor, _ctx: &ReaderContext) -> Single<String> {
                Single::just(self.0.to_owned())
            }
        }

        let parent = Arc::new(ReaderContext::new(ReaderHeaders::default()));
        parent.register_reader::<String, _>(Echo("from-parent"));
        let child = Arc::new(ReaderContext::with_parent(ReaderHeaders::default(), Arc::clone(&parent)));

        let target = TypeDescriptor::of::<String>();
        let result = child.unmarshall(chunks(b"x"), target, None).to_future().await.unwrap();
        assert_eq!(*result.downcast::<String>().unwrap(), "from-parent");
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
    async fn marshall_selects_writer_and_sets_content_type() {
        let mut accept = http::HeaderMap::new();
        accept.insert(http::header::ACCEPT, "text/plain".parse().unwrap());
        let ctx = Arc::new(WriterContext::new(
            WriterHeaders::default(),
            vec![MediaType::parse("text/plain").unwrap()],
        ));
        ctx.register_writer::<String, _>(PlainTextWriter);

        let target = TypeDescriptor::of::<String>();
        let content: Single<Box<dyn Any + Send>> = Single::just(Box::new("hi".to_owned()) as Box<dyn Any + Send>);
        let chunks: Vec<_> = {
            Box::pin(Arc::clone(&ctx).marshall(content, target, None))
                .collect::<Vec<_>>()
                .await
        };
        assert_eq!(chunks.len(), 1);
        assert_eq!(ctx.content_type().unwrap().unwrap().to_string(), "text/plain");
    }

    #[tokio::test]
    async fn marshall_with_no_writer_is_no_operator() {
        let ctx = Arc::new(WriterContext::new(WriterHeaders::default(), Vec::new()));
        let target = TypeDescriptor::of::<String>();
        let content: Single<Box<dyn Any + Send>> = Single::just(Box::new("hi".to_owned()) as Box<dyn Any + Send>);
        let mut stream = Box::pin(Arc::clone(&ctx).marshall(content, target, None));
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(err.is_no_operator());
    }

    #[test]
    fn find_accepted_wildcard_returns_default() {
        let ctx = WriterContext::new(WriterHeaders::default(), vec![MediaType::parse("application/*").unwrap()]);
        let default = MediaType::parse("application/octet-stream").unwrap();
        let is_json = |mt: &MediaType| mt.test(&MediaType::parse("application/json").unwrap());
        let chosen = ctx.find_accepted(is_json, default.clone()).unwrap();
        assert_eq!(chosen.to_string(), default.to_string());
    }

    #[test]
    fn find_accepted_no_match_fails() {
        let ctx = WriterContext::new(WriterHeaders::default(), vec![MediaType::parse("text/plain").unwrap()]);
        let default = MediaType::parse("application/octet-stream").unwrap();
        let is_json = |mt: &MediaType| mt.test(&MediaType::parse("application/json").unwrap());
        let err = ctx.find_accepted(is_json, default).unwrap_err();
        assert!(err.is_no_accepted_content_type());
    }
}
