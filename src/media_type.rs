//! Parsed media types and wildcard structural matching.

use std::fmt;
use std::str::FromStr;

use mime::Mime;

use crate::error::{Error, Result};

/// A parsed `(type, subtype, parameters)` triple, with an optional charset
/// parameter, and a `test()` predicate honoring `*` wildcards.
///
/// Grammar parsing itself is out of scope for this crate (spec.md §1); we
/// delegate to the `mime` crate rather than hand-roll a parser.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MediaType {
    mime: Mime,
}

impl MediaType {
    /// The `*/*` media type, matched against any concrete type.
    pub fn wildcard() -> Self {
        MediaType { mime: mime::STAR_STAR }
    }

    /// `application/octet-stream`, the corpus's universal default.
    pub fn octet_stream() -> Self {
        MediaType {
            mime: mime::APPLICATION_OCTET_STREAM,
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Mime::from_str(s)
            .map(|mime| MediaType { mime })
            .map_err(|e| Error::new_transformation_failed(e))
    }

    pub fn type_(&self) -> &str {
        self.mime.type_().as_str()
    }

    pub fn subtype(&self) -> &str {
        self.mime.subtype().as_str()
    }

    /// `true` if either the type or subtype is a `*` wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.mime.type_() == mime::STAR || self.mime.subtype() == mime::STAR
    }

    /// The `charset` parameter, if present.
    pub fn charset(&self) -> Option<&str> {
        self.mime.get_param(mime::CHARSET).map(|n| n.as_str())
    }

    /// Structural match honoring `*` in type or subtype on either side.
    pub fn test(&self, other: &MediaType) -> bool {
        let type_matches =
            self.mime.type_() == mime::STAR || other.mime.type_() == mime::STAR || self.mime.type_() == other.mime.type_();
        let subtype_matches = self.mime.subtype() == mime::STAR
            || other.mime.subtype() == mime::STAR
            || self.mime.subtype() == other.mime.subtype();
        type_matches && subtype_matches
    }

    pub fn as_mime(&self) -> &Mime {
        &self.mime
    }
}

impl From<Mime> for MediaType {
    fn from(mime: Mime) -> Self {
        MediaType { mime }
    }
}

impl FromStr for MediaType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        MediaType::parse(s)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.mime, f)
    }
}

impl fmt::Debug for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MediaType").field(&self.mime.as_ref()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        let json = MediaType::parse("application/json").unwrap();
        assert!(json.test(&MediaType::parse("application/json").unwrap()));
        assert!(!json.test(&MediaType::parse("text/plain").unwrap()));
    }

    #[test]
    fn subtype_wildcard_matches() {
        let any_app = MediaType::parse("application/*").unwrap();
        let json = MediaType::parse("application/json").unwrap();
        assert!(any_app.test(&json));
        assert!(json.test(&any_app));
        assert!(any_app.is_wildcard());
        assert!(!json.is_wildcard());
    }

    #[test]
    fn full_wildcard_matches_anything() {
        let star = MediaType::wildcard();
        assert!(star.test(&MediaType::parse("text/plain").unwrap()));
    }

    #[test]
    fn charset_param_is_read() {
        let mt = MediaType::parse("text/plain; charset=utf-8").unwrap();
        assert_eq!(mt.charset(), Some("utf-8"));
        assert_eq!(MediaType::parse("text/plain").unwrap().charset(), None);
    }
}
