use std::collections::BTreeMap;

use bytes::Bytes;
use http::StatusCode;
use http::header::{CONTENT_LENGTH, HeaderMap};

use crate::error::InvalidHeader;

use super::request::{flatten_headers, header_value, insert_header};

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), InvalidHeader> {
        insert_header(&mut self.headers, name, value)
    }

    /// Replace the body; a stale `Content-Length` is dropped with it.
    pub fn replace_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
        self.headers.remove(CONTENT_LENGTH);
    }

    pub fn header_map(&self) -> BTreeMap<String, String> {
        flatten_headers(&self.headers)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// The body re-indented as pretty JSON.
    pub fn json(&self) -> Result<String, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_slice(&self.body)?;
        serde_json::to_string_pretty(&value)
    }
}
