//! Weedio Core - client library for needle-based object stores
//!
//! Objects are addressed by opaque file ids handed out by a directory tier
//! and served by volume servers:
//! - chunked write sessions with a manifest, cleaned up on failure
//! - directory client with seed failover and a TTL location cache
//! - batch delete fanned out per volume server

pub mod client;
pub mod config;
pub mod directory;
pub mod error;
pub mod fid;
pub mod operations;
pub mod session;
pub mod storage;
pub mod transport;
pub mod ttl;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{WeedClient, WeedClientBuilder};
pub use config::{ClientConfig, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
pub use directory::{
    AssignResult, Clock, DirectoryClient, Location, LocationCache, LookupResult, SystemClock,
    VolumeAssignRequest,
};
pub use error::{Result, WeedError};
pub use fid::FileId;
pub use operations::{DeleteFilesOperation, DeleteFilesOperationRequest, DeleteFilesOperationResult};
pub use session::{CreateRequest, ReadSession, Session, WriteSession};
pub use storage::{ChunkInfo, ChunkManifest, DeleteResult};
pub use transport::{DynTransport, HttpTransport, Transport};
pub use ttl::{Ttl, TtlUnit};
