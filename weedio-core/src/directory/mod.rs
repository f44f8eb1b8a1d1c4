//! Directory tier client: assign, lookup and single-object delete.

pub mod cache;
pub mod types;

use crate::fid::{FileId, file_url, sanitize_url};
use crate::storage::delete_object;
use crate::transport::{DynTransport, decode_reply, status_error};
use crate::{Result, WeedError};
use serde::Deserialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use cache::{Clock, LocationCache, SystemClock};
pub use types::{AssignResult, Location, LookupResult, VolumeAssignRequest};

/// Run `call` against each seed in order until one succeeds.
///
/// Returns the last error when every seed fails.
pub async fn retry_seeds<T, F, Fut>(seeds: &[String], mut call: F) -> Result<T>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = WeedError::NoSeeds;
    for seed in seeds {
        match call(seed.clone()).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                tracing::warn!("directory seed {} failed: {}", seed, error);
                last_error = error;
            }
        }
    }
    Err(last_error)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VolumeLookupReply {
    Failed { error: String },
    Volumes(HashMap<String, LookupResult>),
}

#[derive(Clone)]
pub struct DirectoryClient {
    seeds: Vec<String>,
    transport: DynTransport,
    cache: Arc<LocationCache>,
    cache_ttl: Duration,
}

impl DirectoryClient {
    pub fn new(
        seeds: Vec<String>,
        transport: DynTransport,
        cache: Arc<LocationCache>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            seeds,
            transport,
            cache,
            cache_ttl,
        }
    }

    pub fn seeds(&self) -> &[String] {
        &self.seeds
    }

    pub fn cache(&self) -> &Arc<LocationCache> {
        &self.cache
    }

    pub fn transport(&self) -> &DynTransport {
        &self.transport
    }

    pub async fn assign(&self, request: &VolumeAssignRequest) -> Result<AssignResult> {
        let form = request.to_form();
        retry_seeds(&self.seeds, |seed| {
            let form = form.clone();
            async move {
                let url = format!("{}/dir/assign", sanitize_url(&seed));
                let response = self.transport.post_form(&url, form).await?;
                let result: AssignResult = decode_reply(&url, &response)?;
                if result.count == 0 || result.fid.is_empty() {
                    return Err(WeedError::Remote {
                        url,
                        message: "no file id assigned".to_string(),
                    });
                }

                tracing::debug!("assigned {} at {} by {}", result.fid, result.public_url, seed);
                Ok(result)
            }
        })
        .await
    }

    /// Locations of `volume_id`, served from the cache while unexpired.
    pub async fn lookup(&self, volume_id: &str) -> Result<LookupResult> {
        if let Some(locations) = self.cache.get(volume_id) {
            tracing::debug!("volume {} served from location cache", volume_id);
            return Ok(LookupResult {
                volume_id: volume_id.to_string(),
                locations,
                error: String::new(),
            });
        }

        let result = retry_seeds(&self.seeds, |seed| async move {
            let url = format!("{}/dir/lookup", sanitize_url(&seed));
            let form = vec![("volumeId".to_string(), volume_id.to_string())];
            let response = self.transport.post_form(&url, form).await?;
            decode_reply::<LookupResult>(&url, &response)
        })
        .await?;

        self.cache
            .put(volume_id, result.locations.clone(), self.cache_ttl);
        Ok(result)
    }

    pub async fn lookup_file_id(&self, fid: &str) -> Result<Vec<Location>> {
        let file_id = FileId::parse(fid)?;
        let lookup = self.lookup(file_id.volume_id).await?;
        if lookup.locations.is_empty() {
            return Err(WeedError::NotFound(format!("file not found for {}", fid)));
        }
        Ok(lookup.locations)
    }

    /// Batch lookup. Fails as a whole when any volume fails, after caching
    /// the volumes that did resolve.
    pub async fn lookup_volume_ids(
        &self,
        volume_ids: &[String],
    ) -> Result<HashMap<String, LookupResult>> {
        let results = self.resolve_volume_ids(volume_ids).await?;

        let mut errors = Vec::new();
        for volume_id in unique(volume_ids) {
            if let Some(result) = results.get(volume_id) {
                if !result.error.is_empty() {
                    errors.push(format!("[{}]: {}", volume_id, result.error));
                }
            }
        }

        if !errors.is_empty() {
            return Err(WeedError::BatchLookup(errors.join("\n")));
        }

        Ok(results)
    }

    /// Batch lookup keeping per-volume failures in the returned map.
    ///
    /// Cached volumes are answered locally, the rest go out in one request.
    /// Only a failure of that request itself is an `Err`.
    pub async fn resolve_volume_ids(
        &self,
        volume_ids: &[String],
    ) -> Result<HashMap<String, LookupResult>> {
        let mut results = HashMap::new();
        let mut unknown = Vec::new();

        for volume_id in unique(volume_ids) {
            match self.cache.get(volume_id) {
                Some(locations) => {
                    results.insert(
                        volume_id.to_string(),
                        LookupResult {
                            volume_id: volume_id.to_string(),
                            locations,
                            error: String::new(),
                        },
                    );
                }
                None => unknown.push(volume_id.to_string()),
            }
        }

        if unknown.is_empty() {
            return Ok(results);
        }

        let form: Vec<(String, String)> = unknown
            .iter()
            .map(|volume_id| ("volumeId".to_string(), volume_id.clone()))
            .collect();

        let mut fetched = retry_seeds(&self.seeds, |seed| {
            let form = form.clone();
            async move {
                let url = format!("{}/vol/lookup", sanitize_url(&seed));
                let response = self.transport.post_form(&url, form).await?;
                match serde_json::from_slice::<VolumeLookupReply>(&response.body) {
                    Ok(VolumeLookupReply::Failed { error }) => {
                        Err(WeedError::Remote { url, message: error })
                    }
                    Ok(VolumeLookupReply::Volumes(volumes)) => Ok(volumes),
                    Err(_) if !response.is_success() => Err(status_error(&url, &response)),
                    Err(error) => Err(error.into()),
                }
            }
        })
        .await?;

        for volume_id in unknown {
            let mut result = fetched.remove(&volume_id).unwrap_or_else(|| LookupResult {
                error: "volume id not found".to_string(),
                ..Default::default()
            });
            result.volume_id = volume_id.clone();

            if result.error.is_empty() {
                self.cache
                    .put(&volume_id, result.locations.clone(), self.cache_ttl);
            }
            results.insert(volume_id, result);
        }

        Ok(results)
    }

    /// Delete `fid`, stopping at the first replica that confirms.
    ///
    /// The store forwards deletes to the other replicas on its side.
    pub async fn delete_file(&self, fid: &str) -> Result<()> {
        let locations = self.lookup_file_id(fid).await?;

        let mut errors = Vec::new();
        for location in &locations {
            let url = file_url(location.public_addr(), fid);
            match delete_object(self.transport.as_ref(), &url).await {
                Ok(()) => {
                    tracing::debug!("deleted {} via {}", fid, url);
                    return Ok(());
                }
                Err(error) => {
                    tracing::warn!("failed to delete {} via {}: {}", fid, url, error);
                    errors.push(error.to_string());
                }
            }
        }

        Err(WeedError::Remote {
            url: fid.to_string(),
            message: errors.join("\n"),
        })
    }
}

fn unique(values: &[String]) -> Vec<&str> {
    let mut seen = std::collections::HashSet::new();
    values
        .iter()
        .map(String::as_str)
        .filter(|value| seen.insert(*value))
        .collect()
}
