use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, HeaderMap, HeaderName, HeaderValue};

use crate::error::InvalidHeader;

use super::method::HttpMethod;

/// An outgoing request as it travels through the hook chain.
///
/// The body is a buffered [`Bytes`] value, so hooks and retry attempts can
/// read it as often as they like.
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Per-request timeout overriding the transport default.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    /// Set a header, replacing any previous value under the same name.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), InvalidHeader> {
        insert_header(&mut self.headers, name, value)
    }

    pub fn replace_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
        self.headers.remove(CONTENT_LENGTH);
    }

    /// Headers flattened to their first value, as exposed to scripts.
    pub fn header_map(&self) -> BTreeMap<String, String> {
        flatten_headers(&self.headers)
    }
}

pub(crate) fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

pub(crate) fn insert_header(
    headers: &mut HeaderMap,
    name: &str,
    value: &str,
) -> Result<(), InvalidHeader> {
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| InvalidHeader {
        name: name.to_string(),
        reason: err.to_string(),
    })?;
    let header_value = HeaderValue::from_str(value).map_err(|err| InvalidHeader {
        name: name.to_string(),
        reason: err.to_string(),
    })?;
    headers.insert(header_name, header_value);
    Ok(())
}

pub(crate) fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut flat = BTreeMap::new();
    for name in headers.keys() {
        if let Some(value) = header_value(headers, name.as_str()) {
            flat.insert(name.to_string(), value.to_string());
        }
    }
    flat
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_header_replaces_previous_value() {
        let mut request = HttpRequest::new(HttpMethod::Get, "http://localhost");
        request.set_header("X-Token", "a").unwrap();
        request.set_header("x-token", "b").unwrap();
        assert_eq!(request.header("X-Token"), Some("b"));
        assert_eq!(request.headers.len(), 1);
    }

    #[test]
    fn set_header_rejects_invalid_name() {
        let mut request = HttpRequest::new(HttpMethod::Get, "http://localhost");
        let err = request.set_header("bad header", "x").unwrap_err();
        assert_eq!(err.name, "bad header");
    }

    #[test]
    fn replace_body_drops_content_length() {
        let mut request = HttpRequest::new(HttpMethod::Post, "http://localhost").with_body("{}");
        request.set_header("Content-Length", "2").unwrap();
        request.replace_body("{\"a\":1}");
        assert!(request.header("Content-Length").is_none());
        assert_eq!(&request.body[..], b"{\"a\":1}");
    }
}
