#![deny(missing_debug_implementations)]
#![cfg_attr(test, deny(rust_2018_idioms))]

//! # mediaflow
//!
//! `mediaflow` is the message-body media pipeline that sits between an HTTP
//! transport and application handlers: it turns a stream of opaque byte
//! chunks into typed values on the inbound path, and typed values into a
//! stream of byte chunks on the outbound path.
//!
//! It does not speak HTTP/1 or HTTP/2, does not open sockets, and does not
//! parse header grammar. Those are the job of a transport crate sitting on
//! either side of this one. What lives here:
//!
//! - A refcounted [`Buffer`]/[`CompositeBuffer`] and [`DataChunk`] data
//!   model for body bytes.
//! - [`Single`] and [`Multi`], small reactive primitives the rest of the
//!   crate is built on.
//! - An [`OperatorRegistry`] with parent/fallback composition and
//!   first-match selection.
//! - [`ReaderContext`]/[`WriterContext`], the headers-and-registries
//!   envelope every operator runs inside.
//! - [`ReadableContent`]/[`WriteableContent`], the per-message facades
//!   handlers actually touch.
//!
//! See each module's docs for the contract it implements.

#[macro_use]
mod trace;

pub mod buffer;
pub mod chunk;
pub mod content;
pub mod context;
pub mod error;
pub mod event;
pub mod headers;
pub mod media_type;
pub mod multi;
pub mod operators;
pub mod registry;
pub mod single;
pub mod type_descriptor;

pub use buffer::{Buffer, CompositeBuffer};
pub use chunk::DataChunk;
pub use content::{ReadableContent, WriteableContent};
pub use context::{ReaderContext, WriterContext};
pub use error::{Error, Result};
pub use event::{Event, EventListener};
pub use media_type::MediaType;
pub use multi::Multi;
pub use operators::{
    Filter, Reader, StreamReader, StreamWriter, TypedReader, TypedStreamReader, TypedStreamWriter,
    TypedWriter, WriteAck, Writer,
};
pub use registry::OperatorRegistry;
pub use single::Single;
pub use type_descriptor::TypeDescriptor;

fn _assert_send_sync() {
    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    assert_send::<DataChunk>();
    assert_sync::<DataChunk>();
    assert_send::<Buffer>();
    assert_send::<Single<()>>();
    assert_send::<Multi<()>>();
}
