use crate::directory::{Clock, DirectoryClient, Location, LocationCache, SystemClock};
use crate::operations::{DeleteFilesOperation, DeleteFilesOperationRequest, DeleteFilesOperationResult};
use crate::session::{CreateRequest, ReadSession, WriteSession};
use crate::transport::{DynTransport, HttpTransport};
use crate::{ClientConfig, Result, WeedError};
use std::sync::Arc;

/// Entry point: owns the config, the directory client and the shared
/// location cache. Cheap to clone.
#[derive(Clone)]
pub struct WeedClient {
    config: Arc<ClientConfig>,
    directory: Arc<DirectoryClient>,
}

impl WeedClient {
    pub fn builder() -> WeedClientBuilder {
        WeedClientBuilder::new()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn directory(&self) -> &Arc<DirectoryClient> {
        &self.directory
    }

    /// Open a write session. Assign happens here, so a failure means no session.
    pub async fn create(&self, request: CreateRequest) -> Result<WriteSession> {
        WriteSession::create(self.directory.clone(), &self.config, request).await
    }

    pub async fn open(&self, fid: &str) -> Result<ReadSession> {
        ReadSession::open(self.directory.clone(), fid).await
    }

    pub async fn lookup_file_id(&self, fid: &str) -> Result<Vec<Location>> {
        self.directory.lookup_file_id(fid).await
    }

    pub async fn delete_file(&self, fid: &str) -> Result<()> {
        self.directory.delete_file(fid).await
    }

    /// `Ok(false)` when the volume holding `fid` has no locations.
    pub async fn remove(&self, fid: &str) -> Result<bool> {
        match self.delete_file(fid).await {
            Ok(()) => Ok(true),
            Err(WeedError::NotFound(message)) => {
                tracing::debug!("nothing to remove: {}", message);
                Ok(false)
            }
            Err(error) => Err(error),
        }
    }

    pub async fn delete_files(&self, fids: Vec<String>) -> Result<DeleteFilesOperationResult> {
        DeleteFilesOperation::new(self.directory.clone())
            .run(DeleteFilesOperationRequest { fids })
            .await
    }
}

#[derive(Clone, Default)]
pub struct WeedClientBuilder {
    config: Option<ClientConfig>,
    seeds: Option<String>,
    transport: Option<DynTransport>,
    clock: Option<Arc<dyn Clock>>,
}

impl WeedClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Overrides `seeds` from the config.
    pub fn seeds(mut self, seeds: impl Into<String>) -> Self {
        self.seeds = Some(seeds.into());
        self
    }

    pub fn transport(mut self, transport: DynTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    fn resolve_config(&self) -> Result<ClientConfig> {
        let mut config = self.config.clone().unwrap_or_default();
        if let Some(seeds) = &self.seeds {
            config.seeds = seeds.trim().to_string();
        }
        config.validate()?;
        Ok(config)
    }

    fn resolve_transport(&self, config: &ClientConfig) -> Result<DynTransport> {
        match &self.transport {
            Some(transport) => Ok(transport.clone()),
            None => Ok(Arc::new(HttpTransport::from_config(config)?)),
        }
    }

    pub fn build(&self) -> Result<WeedClient> {
        let config = self.resolve_config()?;
        let transport = self.resolve_transport(&config)?;
        let clock = self
            .clock
            .clone()
            .unwrap_or_else(|| Arc::new(SystemClock));

        let directory = DirectoryClient::new(
            config.seed_list(),
            transport,
            Arc::new(LocationCache::new(clock)),
            config.location_cache_ttl(),
        );

        tracing::debug!("weed client ready with seeds {}", config.seeds);
        Ok(WeedClient {
            config: Arc::new(config),
            directory: Arc::new(directory),
        })
    }
}
