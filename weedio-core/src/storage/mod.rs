//! Volume server calls: upload, download, delete.
//!
//! Unlike directory calls these are never retried; a failure goes straight
//! back to the caller.

pub mod manifest;

use crate::transport::{
    FilePart, HttpResponse, RemoteReply, Transport, decode_reply, parse_content_disposition,
    status_error,
};
use crate::transport::BodyStream;
use crate::{Result, WeedError};
use serde::{Deserialize, Serialize};

pub use manifest::{ChunkInfo, ChunkManifest};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadResult {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl RemoteReply for UploadResult {
    fn error_message(&self) -> &str {
        &self.error
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResult {
    #[serde(default)]
    pub fid: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub status: u16,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

pub struct Download {
    pub url: String,
    pub file_name: Option<String>,
    pub body: BodyStream,
}

/// Multipart upload of one object, chunk or manifest.
pub async fn upload(transport: &dyn Transport, url: &str, part: FilePart) -> Result<UploadResult> {
    let response = transport.post_multipart(url, part).await?;
    decode_reply(url, &response)
}

pub async fn download(transport: &dyn Transport, url: &str) -> Result<Download> {
    let response = transport.get(url).await?;
    if response.status != 200 {
        return Err(WeedError::Status {
            url: url.to_string(),
            status: response.status,
            body: String::new(),
        });
    }

    Ok(Download {
        url: url.to_string(),
        file_name: response
            .content_disposition
            .as_deref()
            .and_then(parse_content_disposition),
        body: response.body,
    })
}

/// Delete one object. A missing object counts as deleted.
pub async fn delete_object(transport: &dyn Transport, url: &str) -> Result<()> {
    let response = transport.delete(url).await?;
    match response.status {
        200 | 202 | 404 => Ok(()),
        _ => Err(delete_error(url, &response)),
    }
}

/// Delete every fid in `fids` from one volume server in a single request.
pub async fn delete_batch(
    transport: &dyn Transport,
    server: &str,
    fids: &[String],
) -> Result<Vec<DeleteResult>> {
    let url = format!("{}/delete", crate::fid::sanitize_url(server));
    let form = fids
        .iter()
        .map(|fid| ("fid".to_string(), fid.clone()))
        .collect();

    let response = transport.post_form(&url, form).await?;
    match serde_json::from_slice::<Vec<DeleteResult>>(&response.body) {
        Ok(results) => Ok(results),
        Err(_) if !response.is_success() => Err(status_error(&url, &response)),
        Err(error) => Err(WeedError::Remote {
            url,
            message: format!(
                "{} {}",
                error,
                String::from_utf8_lossy(&response.body).trim()
            ),
        }),
    }
}

fn delete_error(url: &str, response: &HttpResponse) -> WeedError {
    #[derive(Deserialize)]
    struct ErrorReply {
        error: String,
    }

    match serde_json::from_slice::<ErrorReply>(&response.body) {
        Ok(reply) if !reply.error.is_empty() => WeedError::Remote {
            url: url.to_string(),
            message: reply.error,
        },
        _ => status_error(url, response),
    }
}
