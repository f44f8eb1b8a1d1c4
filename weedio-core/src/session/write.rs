use super::Session;
use crate::directory::{DirectoryClient, VolumeAssignRequest};
use crate::fid::{chunk_file_name, file_url};
use crate::storage::{self, ChunkInfo, ChunkManifest};
use crate::transport::FilePart;
use crate::ttl::{Ttl, parse_optional_ttl, sanitize_ttl};
use crate::{ClientConfig, Result, WeedError};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::Url;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

const CHUNK_MIME_TYPE: &str = "application/octet-stream";
const MANIFEST_MIME_TYPE: &str = "application/json";

/// Parameters for a new write session. Unset fields fall back to the
/// client configuration.
#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    pub name: String,
    pub replication: Option<String>,
    pub collection: Option<String>,
    pub data_center: Option<String>,
    pub rack: Option<String>,
    pub chunk_size: Option<u64>,
    /// `Some("")` disables the TTL.
    pub ttl: Option<String>,
    pub mime_type: Option<String>,
}

impl CreateRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Placement {
    replication: Option<String>,
    collection: Option<String>,
    data_center: Option<String>,
    rack: Option<String>,
}

impl Placement {
    fn assign_request(&self, ttl: Option<&Ttl>) -> VolumeAssignRequest {
        VolumeAssignRequest {
            count: 1,
            replication: self.replication.clone(),
            collection: self.collection.clone(),
            ttl: ttl.map(Ttl::to_string),
            data_center: self.data_center.clone(),
            rack: self.rack.clone(),
            data_node: None,
        }
    }
}

enum WriteState {
    /// Accepting bytes. `chunks` is non-empty once the session has split.
    Writable {
        buffer: BytesMut,
        chunks: Vec<ChunkInfo>,
    },
    /// A chunk upload failed; only cleanup remains.
    Poisoned { chunks: Vec<ChunkInfo> },
}

/// Streams bytes into the store, splitting into chunks past `chunk_size`.
///
/// Nothing is committed until [`WriteSession::close`], which either uploads
/// the object in one shot or writes the remaining tail and a manifest.
pub struct WriteSession {
    fid: String,
    file_name: String,
    real_name: String,
    mime_type: Option<String>,
    gzipped: bool,
    file_url: String,
    ttl: Option<Ttl>,
    chunk_size: u64,
    size: u64,
    placement: Placement,
    state: WriteState,
    directory: Arc<DirectoryClient>,
}

impl WriteSession {
    /// Assign the session's own fid. Fails without a session when assign fails.
    pub async fn create(
        directory: Arc<DirectoryClient>,
        config: &ClientConfig,
        request: CreateRequest,
    ) -> Result<Self> {
        let ttl = match request.ttl.as_deref() {
            Some(ttl) => parse_optional_ttl(ttl)?,
            None => config.ttl()?,
        };

        let placement = Placement {
            replication: request.replication.or_else(|| Some(config.replication.clone())),
            collection: request.collection.or_else(|| config.collection.clone()),
            data_center: request.data_center.or_else(|| config.data_center.clone()),
            rack: request.rack.or_else(|| config.rack.clone()),
        };

        let assigned = directory
            .assign(&placement.assign_request(ttl.as_ref()))
            .await?;

        let (file_name, real_name, gzipped) = derive_names(&request.name, &assigned.fid);

        let session = Self {
            file_url: file_url(&assigned.public_url, &assigned.fid),
            fid: assigned.fid,
            file_name,
            real_name,
            mime_type: request.mime_type.filter(|m| !m.is_empty()),
            gzipped,
            ttl,
            chunk_size: config.effective_chunk_size(request.chunk_size),
            size: 0,
            placement,
            state: WriteState::Writable {
                buffer: BytesMut::new(),
                chunks: Vec::new(),
            },
            directory,
        };

        tracing::debug!("created write session {}", session);
        Ok(session)
    }

    pub fn fid(&self) -> &str {
        &self.fid
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn real_name(&self) -> &str {
        &self.real_name
    }

    pub fn file_url(&self) -> &str {
        &self.file_url
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn is_gzipped(&self) -> bool {
        self.gzipped
    }

    pub fn ttl(&self) -> Option<&Ttl> {
        self.ttl.as_ref()
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Bytes committed as chunks so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_split(&self) -> bool {
        !self.chunks().is_empty()
    }

    pub fn is_poisoned(&self) -> bool {
        matches!(self.state, WriteState::Poisoned { .. })
    }

    pub fn chunks(&self) -> &[ChunkInfo] {
        match &self.state {
            WriteState::Writable { chunks, .. } | WriteState::Poisoned { chunks } => chunks,
        }
    }

    /// Append `data`, uploading full chunks as soon as the buffer overflows.
    ///
    /// A failed chunk upload poisons the session; the caller must still
    /// `close` it so committed chunks get removed.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }

        let state = std::mem::replace(
            &mut self.state,
            WriteState::Poisoned { chunks: Vec::new() },
        );
        let (mut buffer, mut chunks) = match state {
            WriteState::Writable { buffer, chunks } => (buffer, chunks),
            WriteState::Poisoned { chunks } => {
                self.state = WriteState::Poisoned { chunks };
                return Err(WeedError::SessionPoisoned(self.fid.clone()));
            }
        };

        let chunk_size = self.chunk_size as usize;
        let mut offset = 0;
        if chunk_size > 0 && buffer.len() + data.len() > chunk_size {
            let slices = (buffer.len() + data.len()) / chunk_size;
            for _ in 0..slices {
                let take = chunk_size - buffer.len();
                buffer.extend_from_slice(&data[offset..offset + take]);
                offset += take;

                let slice = buffer.split().freeze();
                match self.upload_chunk(chunks.len(), slice).await {
                    Ok(chunk) => {
                        self.size += chunk.size;
                        chunks.push(chunk);
                    }
                    Err(error) => {
                        self.state = WriteState::Poisoned { chunks };
                        return Err(error);
                    }
                }
            }
        }

        buffer.extend_from_slice(&data[offset..]);
        self.state = WriteState::Writable { buffer, chunks };
        Ok(data.len())
    }

    /// Commit or abort. This is the only place anything becomes visible.
    pub async fn close(mut self) -> Result<()> {
        let state = std::mem::replace(
            &mut self.state,
            WriteState::Poisoned { chunks: Vec::new() },
        );

        match state {
            WriteState::Poisoned { chunks } => {
                // the write that poisoned the session already reported the failure
                if let Err(error) = self.delete_chunks(&chunks).await {
                    tracing::warn!("cleanup of {} incomplete: {}", self.fid, error);
                }
                Ok(())
            }
            WriteState::Writable { buffer, chunks } if chunks.is_empty() => {
                self.upload_whole(buffer.freeze()).await
            }
            WriteState::Writable { buffer, mut chunks } => {
                if !buffer.is_empty() {
                    match self.upload_chunk(chunks.len(), buffer.freeze()).await {
                        Ok(chunk) => {
                            self.size += chunk.size;
                            chunks.push(chunk);
                        }
                        Err(error) => return Err(self.discard(&chunks, error).await),
                    }
                }

                let manifest =
                    ChunkManifest::new(&self.real_name, self.mime_type.clone().unwrap_or_default(), chunks);
                if let Err(error) = self.upload_manifest(&manifest).await {
                    return Err(self.discard(&manifest.chunks, error).await);
                }

                tracing::info!(
                    "uploaded {} to {} in {} chunks, {} bytes",
                    self.real_name,
                    self.file_url,
                    manifest.chunks.len(),
                    manifest.size
                );
                Ok(())
            }
        }
    }

    /// Give up on the object without committing anything.
    ///
    /// Buffered bytes are dropped and committed chunks deleted. Reports
    /// `ChunkCleanup` when some chunks could not be removed.
    pub async fn abort(mut self) -> Result<()> {
        let state = std::mem::replace(
            &mut self.state,
            WriteState::Poisoned { chunks: Vec::new() },
        );
        let chunks = match state {
            WriteState::Writable { chunks, .. } | WriteState::Poisoned { chunks } => chunks,
        };

        tracing::info!("aborting {} with {} committed chunks", self.fid, chunks.len());
        self.delete_chunks(&chunks).await
    }

    async fn upload_whole(&self, content: Bytes) -> Result<()> {
        let url = sanitize_ttl(&self.file_url, self.ttl.as_ref());
        let size = content.len();
        let part = FilePart {
            file_name: self.file_name.clone(),
            mime_type: self.mime_type.clone(),
            gzipped: self.gzipped,
            content,
        };

        match storage::upload(self.directory.transport().as_ref(), &url, part).await {
            Ok(_) => {
                tracing::info!("uploaded {} to {}, {} bytes", self.real_name, self.file_url, size);
                Ok(())
            }
            Err(error) => {
                tracing::warn!("failed to upload {} to {}: {}", self.real_name, self.file_url, error);
                Err(error)
            }
        }
    }

    /// Upload chunk number `index` (0-based) under a freshly assigned fid.
    async fn upload_chunk(&self, index: usize, content: Bytes) -> Result<ChunkInfo> {
        let assigned = self
            .directory
            .assign(&self.placement.assign_request(self.ttl.as_ref()))
            .await?;

        let adjusted = self.ttl.as_ref().map(Ttl::adjusted);
        let url = sanitize_ttl(
            &file_url(&assigned.public_url, &assigned.fid),
            adjusted.as_ref(),
        );
        let name = chunk_file_name(&self.fid, index + 1);
        let length = content.len() as u64;

        tracing::debug!("uploading chunk {} to {}", name, url);
        let part = FilePart {
            file_name: name,
            mime_type: Some(CHUNK_MIME_TYPE.to_string()),
            gzipped: false,
            content,
        };
        let uploaded = storage::upload(self.directory.transport().as_ref(), &url, part).await?;

        Ok(ChunkInfo {
            fid: assigned.fid,
            offset: index as u64 * self.chunk_size,
            size: uploaded.size.unwrap_or(length),
        })
    }

    async fn upload_manifest(&self, manifest: &ChunkManifest) -> Result<()> {
        let mut url = Url::parse(&self.file_url)
            .map_err(|e| WeedError::Transport(format!("{}: {}", self.file_url, e)))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("cm", "true");
            if let Some(ttl) = &self.ttl {
                query.append_pair("ttl", &ttl.to_string());
            }
        }

        let part = FilePart {
            file_name: manifest.name.clone(),
            mime_type: Some(MANIFEST_MIME_TYPE.to_string()),
            gzipped: false,
            content: Bytes::from(manifest.to_json()?),
        };
        storage::upload(self.directory.transport().as_ref(), url.as_str(), part).await?;

        tracing::debug!("uploaded chunk manifest {} to {}", manifest.name, self.file_url);
        Ok(())
    }

    /// Remove committed chunks, then hand back the error that caused the abort.
    async fn discard(&self, chunks: &[ChunkInfo], error: WeedError) -> WeedError {
        tracing::warn!("failed to upload {} to {}: {}", self.real_name, self.file_url, error);
        if let Err(cleanup) = self.delete_chunks(chunks).await {
            tracing::warn!("cleanup of {} incomplete: {}", self.fid, cleanup);
        }
        error
    }

    async fn delete_chunks(&self, chunks: &[ChunkInfo]) -> Result<()> {
        let mut failed = 0;
        for chunk in chunks {
            if let Err(error) = self.directory.delete_file(&chunk.fid).await {
                failed += 1;
                tracing::warn!("failed to remove chunk {} of {}: {}", chunk.fid, self.fid, error);
            }
        }

        if failed > 0 {
            return Err(WeedError::ChunkCleanup {
                failed,
                total: chunks.len(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Session for WriteSession {
    fn fid(&self) -> &str {
        &self.fid
    }

    fn file_name(&self) -> &str {
        &self.file_name
    }

    async fn close(self) -> Result<()> {
        WriteSession::close(self).await
    }
}

impl fmt::Display for WriteSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Fid:{}, FileName:{}, IsGzipped:{}, MimeType:{}, FileUrl:{}, TTL:{}",
            self.fid,
            self.real_name,
            self.gzipped,
            self.mime_type.as_deref().unwrap_or_default(),
            self.file_url,
            self.ttl.map(|t| t.to_string()).unwrap_or_default()
        )
    }
}

/// `(file_name, real_name, gzipped)` for a logical name.
///
/// The store strips `.gz` from names such as `a.txt.gz`; those are renamed to
/// `<fid>.gz` so the suffix survives.
fn derive_names(name: &str, fid: &str) -> (String, String, bool) {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    if base.is_empty() {
        return (fid.to_string(), fid.to_string(), false);
    }

    let ext = extension(base).to_ascii_lowercase();
    if ext != ".gz" {
        return (base.to_string(), base.to_string(), false);
    }

    let stem = &base[..base.len() - ext.len()];
    let inner = extension(stem).to_ascii_lowercase();
    let renamed = matches!(
        inner.as_str(),
        ".pdf" | ".txt" | ".html" | ".htm" | ".css" | ".js" | ".json"
    );

    let file_name = if renamed {
        format!("{}.gz", fid)
    } else {
        base.to_string()
    };
    (file_name, base.to_string(), true)
}

fn extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(index) => &name[index..],
        None => "",
    }
}
