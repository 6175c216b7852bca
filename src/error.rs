//! Error and Result module.

use std::error::Error as StdError;
use std::fmt;

use crate::type_descriptor::TypeDescriptor;

/// Result type used throughout the pipeline.
pub type Result<T> = std::result::Result<T, Error>;

type Cause = Box<dyn StdError + Send + Sync>;

/// Opaque error type for the media pipeline.
///
/// Mirrors the shape used throughout this corpus: a private `Kind` behind
/// a boxed `Error`, `is_*()` predicates for branching without matching the
/// (non-exhaustive) enum directly, and an optional wrapped cause.
pub struct Error {
    inner: Box<ErrorImpl>,
}

struct ErrorImpl {
    kind: Kind,
    cause: Option<Cause>,
}

/// Which operator kind a selection failed to find. See [`Error::is_no_operator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    Reader,
    StreamReader,
    Writer,
    StreamWriter,
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperatorKind::Reader => "reader",
            OperatorKind::StreamReader => "stream reader",
            OperatorKind::Writer => "writer",
            OperatorKind::StreamWriter => "stream writer",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub(crate) enum Kind {
    /// No reader/writer/stream-reader/stream-writer accepted the requested type.
    NoOperator {
        kind: OperatorKind,
        target: TypeDescriptor,
    },
    /// An operator or filter raised an exception; the cause is attached
    /// separately on `ErrorImpl`.
    TransformationFailed,
    /// The derived charset name was malformed or unsupported.
    CharsetInvalid { name: String },
    /// The writer context could not reconcile `Accept` with any writer.
    NoAcceptedContentType,
    /// A second subscription (or second `as`/`as_stream`) on a single-shot
    /// `ReadableContent`.
    AlreadyConsumed,
    /// `Single::block(duration)` exceeded its deadline.
    BlockTimeout,
    /// A `Single<T>` completed with no item before being bridged to a
    /// plain future. Forced by Rust having no "null T" (see DESIGN.md).
    EmptyContent,
    /// A caller-provided value was invalid (propagates verbatim, never
    /// wrapped in `TransformationFailed`, per spec.md §7).
    IllegalArgument { message: String },
}

impl Error {
    pub(crate) fn new(kind: Kind) -> Error {
        Error {
            inner: Box::new(ErrorImpl { kind, cause: None }),
        }
    }

    pub(crate) fn with<C: Into<Cause>>(mut self, cause: C) -> Error {
        self.inner.cause = Some(cause.into());
        self
    }

    pub(crate) fn kind(&self) -> &Kind {
        &self.inner.kind
    }

    pub fn new_no_operator(kind: OperatorKind, target: TypeDescriptor) -> Error {
        Error::new(Kind::NoOperator { kind, target })
    }

    pub fn new_transformation_failed<C: Into<Cause>>(cause: C) -> Error {
        Error::new(Kind::TransformationFailed).with(cause)
    }

    pub fn new_charset_invalid(name: impl Into<String>) -> Error {
        Error::new(Kind::CharsetInvalid { name: name.into() })
    }

    pub fn new_no_accepted_content_type() -> Error {
        Error::new(Kind::NoAcceptedContentType)
    }

    pub fn new_already_consumed() -> Error {
        Error::new(Kind::AlreadyConsumed)
    }

    pub fn new_block_timeout() -> Error {
        Error::new(Kind::BlockTimeout)
    }

    pub fn new_empty_content() -> Error {
        Error::new(Kind::EmptyContent)
    }

    pub fn new_illegal_argument(message: impl Into<String>) -> Error {
        Error::new(Kind::IllegalArgument {
            message: message.into(),
        })
    }

    /// Wraps `cause` as `TransformationFailed`, unless `cause` is itself an
    /// `IllegalArgument` error, in which case it propagates unchanged
    /// (spec.md §7: "skipped when the cause is already an `IllegalArgument`").
    pub fn wrap_or_propagate(cause: Error) -> Error {
        if cause.is_illegal_argument() {
            cause
        } else {
            Error::new_transformation_failed(cause)
        }
    }

    pub fn is_no_operator(&self) -> bool {
        matches!(self.inner.kind, Kind::NoOperator { .. })
    }

    pub fn is_transformation_failed(&self) -> bool {
        matches!(self.inner.kind, Kind::TransformationFailed)
    }

    pub fn is_charset_invalid(&self) -> bool {
        matches!(self.inner.kind, Kind::CharsetInvalid { .. })
    }

    pub fn is_no_accepted_content_type(&self) -> bool {
        matches!(self.inner.kind, Kind::NoAcceptedContentType)
    }

    pub fn is_already_consumed(&self) -> bool {
        matches!(self.inner.kind, Kind::AlreadyConsumed)
    }

    pub fn is_block_timeout(&self) -> bool {
        matches!(self.inner.kind, Kind::BlockTimeout)
    }

    pub fn is_empty_content(&self) -> bool {
        matches!(self.inner.kind, Kind::EmptyContent)
    }

    pub fn is_illegal_argument(&self) -> bool {
        matches!(self.inner.kind, Kind::IllegalArgument { .. })
    }

    /// The error's standalone message, without the cause's message.
    pub fn message(&self) -> impl fmt::Display + '_ {
        self.description()
    }

    fn description(&self) -> String {
        match &self.inner.kind {
            Kind::NoOperator { kind, target } => format!("no {} registered for `{}`", kind, target),
            Kind::TransformationFailed => "operator or filter failed".to_owned(),
            Kind::CharsetInvalid { name } => format!("invalid or unsupported charset `{}`", name),
            Kind::NoAcceptedContentType => {
                "could not reconcile Accept header with any registered writer".to_owned()
            }
            Kind::AlreadyConsumed => "content was already subscribed to or unmarshalled".to_owned(),
            Kind::BlockTimeout => "Single::block exceeded its deadline".to_owned(),
            Kind::EmptyContent => "Single completed without an item".to_owned(),
            Kind::IllegalArgument { message } => format!("illegal argument: {}", message),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_tuple("mediaflow::Error");
        f.field(&self.inner.kind);
        if let Some(ref cause) = self.inner.cause {
            f.field(cause);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref cause) = self.inner.cause {
            write!(f, "{}: {}", self.description(), cause)
        } else {
            f.write_str(&self.description())
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .cause
            .as_ref()
            .map(|cause| &**cause as &(dyn StdError + 'static))
    }
}
