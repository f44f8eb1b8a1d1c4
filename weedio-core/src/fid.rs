use crate::{Result, WeedError};

/// A parsed `<volumeId>,<cookie>` file identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileId<'a> {
    pub volume_id: &'a str,
    pub cookie: &'a str,
}

impl<'a> FileId<'a> {
    pub fn parse(fid: &'a str) -> Result<Self> {
        match fid.find(',') {
            Some(index) if index > 0 && index + 1 < fid.len() => Ok(FileId {
                volume_id: &fid[..index],
                cookie: &fid[index + 1..],
            }),
            _ => Err(WeedError::InvalidFileId(format!(
                "wrong fid format: {}",
                fid
            ))),
        }
    }
}

/// Name under which the `index`-th (1-based) chunk of `session_fid` is uploaded.
pub fn chunk_file_name(session_fid: &str, index: usize) -> String {
    format!("{}-{}", session_fid, index)
}

/// Prefix `addr` with `http://` unless it already names a scheme.
pub fn sanitize_url(addr: &str) -> String {
    if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", addr.trim_end_matches('/'))
    }
}

/// Storage URL of `fid` on the server at `addr`.
pub fn file_url(addr: &str, fid: &str) -> String {
    format!("{}/{}", sanitize_url(addr), fid)
}
