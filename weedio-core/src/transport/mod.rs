//! Raw HTTP plumbing used by the directory client and the sessions.
//!
//! Everything above this layer talks to `dyn Transport`, so the wire can be
//! swapped for an in-memory cluster in tests.

pub mod http;

use crate::{Result, WeedError};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde::de::DeserializeOwned;
use std::sync::Arc;

pub use http::HttpTransport;

pub type BodyStream = BoxStream<'static, Result<Bytes>>;

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).trim().to_string()
    }
}

pub struct DownloadResponse {
    pub status: u16,
    pub content_disposition: Option<String>,
    pub body: BodyStream,
}

/// The single file field of a multipart upload.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub gzipped: bool,
    pub content: Bytes,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_form(&self, url: &str, form: Vec<(String, String)>) -> Result<HttpResponse>;

    async fn post_multipart(&self, url: &str, part: FilePart) -> Result<HttpResponse>;

    async fn get(&self, url: &str) -> Result<DownloadResponse>;

    async fn delete(&self, url: &str) -> Result<HttpResponse>;
}

pub type DynTransport = Arc<dyn Transport>;

/// A JSON reply that reports failure through an `error` field.
pub trait RemoteReply {
    fn error_message(&self) -> &str;
}

/// Decode a JSON reply and turn a populated `error` field or a non-2xx
/// status into an error.
pub fn decode_reply<T>(url: &str, response: &HttpResponse) -> Result<T>
where
    T: DeserializeOwned + RemoteReply,
{
    let reply: T = match serde_json::from_slice(&response.body) {
        Ok(reply) => reply,
        Err(error) if response.is_success() => return Err(error.into()),
        Err(_) => return Err(status_error(url, response)),
    };

    if !reply.error_message().is_empty() {
        return Err(WeedError::Remote {
            url: url.to_string(),
            message: reply.error_message().to_string(),
        });
    }

    if !response.is_success() {
        return Err(status_error(url, response));
    }

    Ok(reply)
}

pub fn status_error(url: &str, response: &HttpResponse) -> WeedError {
    WeedError::Status {
        url: url.to_string(),
        status: response.status,
        body: response.body_text(),
    }
}

/// Extract the file name from a `Content-Disposition` header value.
pub fn parse_content_disposition(value: &str) -> Option<String> {
    let index = value.find("filename=")?;
    let name = value[index + "filename=".len()..]
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .trim_matches('"');

    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
