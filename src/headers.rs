//! The headers abstraction passed to reader and writer contexts.
//!
//! Rather than reimplement an ordered, case-insensitive multimap (spec.md
//! §3's "ContentInfo / Header abstraction"), this wraps `http::HeaderMap`,
//! which already is one, behind read-only and mutable newtypes matching
//! the contract each context needs.

use std::fmt;

use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use http::HeaderMap;

use crate::error::{Error, Result};
use crate::media_type::MediaType;

/// Read-only headers, as seen by a [`crate::context::ReaderContext`].
#[derive(Clone, Default)]
pub struct ReaderHeaders {
    inner: HeaderMap,
}

impl ReaderHeaders {
    pub fn new(inner: HeaderMap) -> Self {
        ReaderHeaders { inner }
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.inner.get(name)
    }

    pub fn get_all(&self, name: &str) -> impl Iterator<Item = &HeaderValue> {
        self.inner.get_all(name).iter()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    /// Parses the `Content-Type` header, if present.
    pub fn content_type(&self) -> Result<Option<MediaType>> {
        match self.inner.get(CONTENT_TYPE) {
            Some(value) => {
                let s = value
                    .to_str()
                    .map_err(|e| Error::new_illegal_argument(format!("non-UTF8 Content-Type: {}", e)))?;
                MediaType::parse(s).map(Some)
            }
            None => Ok(None),
        }
    }

    pub fn as_map(&self) -> &HeaderMap {
        &self.inner
    }
}

impl fmt::Debug for ReaderHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReaderHeaders").field(&self.inner).finish()
    }
}

/// Append-only headers, as seen by a [`crate::context::WriterContext`].
///
/// Spec.md §6: "writer contexts treat headers as append-only until the
/// body begins streaming (after which mutation is undefined)".
#[derive(Clone, Default)]
pub struct WriterHeaders {
    inner: HeaderMap,
}

impl WriterHeaders {
    pub fn new(inner: HeaderMap) -> Self {
        WriterHeaders { inner }
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.inner.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    pub fn insert(&mut self, name: HeaderName, value: HeaderValue) {
        self.inner.insert(name, value);
    }

    /// Sets a header only if it is not already present.
    pub fn put_if_absent(&mut self, name: HeaderName, value: HeaderValue) {
        if !self.inner.contains_key(&name) {
            self.inner.insert(name, value);
        }
    }

    pub fn content_type(&self) -> Result<Option<MediaType>> {
        match self.inner.get(CONTENT_TYPE) {
            Some(value) => {
                let s = value
                    .to_str()
                    .map_err(|e| Error::new_illegal_argument(format!("non-UTF8 Content-Type: {}", e)))?;
                MediaType::parse(s).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Sets `Content-Type` only if absent (spec.md §4.6 `content-type(mt)`).
    pub fn set_content_type_if_absent(&mut self, mt: &MediaType) {
        if let Ok(value) = HeaderValue::from_str(&mt.to_string()) {
            self.put_if_absent(CONTENT_TYPE, value);
        }
    }

    /// Sets `Content-Length` only if absent (spec.md §4.6 `content-length(n)`).
    pub fn set_content_length_if_absent(&mut self, n: u64) {
        if let Ok(value) = HeaderValue::from_str(&n.to_string()) {
            self.put_if_absent(CONTENT_LENGTH, value);
        }
    }

    pub fn as_map(&self) -> &HeaderMap {
        &self.inner
    }

    pub fn into_map(self) -> HeaderMap {
        self.inner
    }
}

impl fmt::Debug for WriterHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WriterHeaders").field(&self.inner).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_if_absent_does_not_overwrite() {
        let mut h = WriterHeaders::default();
        h.set_content_type_if_absent(&MediaType::parse("text/plain").unwrap());
        h.set_content_type_if_absent(&MediaType::parse("application/json").unwrap());
        assert_eq!(h.get("content-type").unwrap(), "text/plain");
    }

    #[test]
    fn content_length_roundtrip() {
        let mut h = WriterHeaders::default();
        h.set_content_length_if_absent(42);
        assert_eq!(h.get("content-length").unwrap(), "42");
    }
}
