//! Read and write sessions over a single stored object.

pub mod read;
pub mod write;

use crate::Result;
use async_trait::async_trait;

pub use read::ReadSession;
pub use write::{CreateRequest, WriteSession};

/// Anything that must be closed exactly once. `close` consumes the session.
#[async_trait]
pub trait Session: Send + Sized {
    fn fid(&self) -> &str;

    fn file_name(&self) -> &str;

    async fn close(self) -> Result<()>;
}
