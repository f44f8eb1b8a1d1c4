use super::Session;
use crate::directory::DirectoryClient;
use crate::fid::file_url;
use crate::storage::{self, Download};
use crate::transport::BodyStream;
use crate::{Result, WeedError};
use async_trait::async_trait;
use bytes::{Buf, Bytes};
use futures_util::StreamExt;
use std::sync::Arc;

/// Streaming read of one stored object, opened against the first replica
/// that answers.
pub struct ReadSession {
    fid: String,
    file_name: String,
    url: String,
    body: Option<BodyStream>,
    pending: Bytes,
}

impl ReadSession {
    pub async fn open(directory: Arc<DirectoryClient>, fid: &str) -> Result<Self> {
        let locations = directory.lookup_file_id(fid).await?;

        let mut last_error = WeedError::NotFound(format!("file not found for {}", fid));
        for location in &locations {
            let url = file_url(location.public_addr(), fid);
            match storage::download(directory.transport().as_ref(), &url).await {
                Ok(download) => return Ok(Self::from_download(fid, download)),
                Err(error) => {
                    tracing::warn!("failed to open {} via {}: {}", fid, url, error);
                    last_error = error;
                }
            }
        }
        Err(last_error)
    }

    fn from_download(fid: &str, download: Download) -> Self {
        let file_name = download
            .file_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| fid.to_string());
        tracing::debug!("opened {} as {} via {}", fid, file_name, download.url);

        Self {
            fid: fid.to_string(),
            file_name,
            url: download.url,
            body: Some(download.body),
            pending: Bytes::new(),
        }
    }

    pub fn fid(&self) -> &str {
        &self.fid
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Read into `buf`, returning the number of bytes copied. `Ok(0)` is EOF.
    ///
    /// An empty piece from the body stream also reads as EOF.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.pending.is_empty() {
            let Some(body) = self.body.as_mut() else {
                return Ok(0);
            };
            match body.next().await {
                Some(Ok(piece)) => self.pending = piece,
                Some(Err(error)) => {
                    self.body = None;
                    return Err(error);
                }
                None => {
                    self.body = None;
                    return Ok(0);
                }
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }

    /// Read until EOF, appending to `out`.
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let mut total = 0;
        let mut buf = [0u8; 8192];
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&buf[..n]);
            total += n;
        }
    }

    pub async fn read_all(mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.read_to_end(&mut out).await?;
        self.close().await?;
        Ok(out)
    }

    /// Release the response body. Never fails.
    pub async fn close(mut self) -> Result<()> {
        self.body = None;
        self.pending = Bytes::new();
        Ok(())
    }
}

#[async_trait]
impl Session for ReadSession {
    fn fid(&self) -> &str {
        &self.fid
    }

    fn file_name(&self) -> &str {
        &self.file_name
    }

    async fn close(self) -> Result<()> {
        ReadSession::close(self).await
    }
}
