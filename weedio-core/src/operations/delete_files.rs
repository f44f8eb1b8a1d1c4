use crate::Result;
use crate::directory::DirectoryClient;
use crate::fid::FileId;
use crate::storage::{DeleteResult, delete_batch};
use futures_util::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

const BAD_REQUEST: u16 = 400;

#[derive(Clone)]
pub struct DeleteFilesOperation {
    directory: Arc<DirectoryClient>,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteFilesOperationRequest {
    pub fids: Vec<String>,
}

/// Per-fid outcomes plus failures that have no single fid to attach to.
///
/// Unresolvable volumes and failed server calls only show up in `errors`.
#[derive(Debug, Clone, Default)]
pub struct DeleteFilesOperationResult {
    pub results: Vec<DeleteResult>,
    pub errors: Vec<String>,
}

impl DeleteFilesOperationResult {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
            && self
                .results
                .iter()
                .all(|r| r.error.is_empty() && r.status < BAD_REQUEST)
    }
}

impl DeleteFilesOperation {
    pub fn new(directory: Arc<DirectoryClient>) -> Self {
        Self { directory }
    }

    /// Delete `fids` with one concurrent request per volume server.
    ///
    /// Never fails as a whole; every problem lands in the result.
    pub async fn run(&self, request: DeleteFilesOperationRequest) -> Result<DeleteFilesOperationResult> {
        let DeleteFilesOperationRequest { fids } = request;
        let mut outcome = DeleteFilesOperationResult::default();

        let mut volume_ids = Vec::new();
        let mut fids_by_volume: HashMap<String, Vec<String>> = HashMap::new();
        for fid in fids {
            let parsed = FileId::parse(&fid).map(|file_id| file_id.volume_id.to_string());
            let volume_id = match parsed {
                Ok(volume_id) => volume_id,
                Err(error) => {
                    outcome.results.push(DeleteResult {
                        fid,
                        size: 0,
                        status: BAD_REQUEST,
                        error: error.to_string(),
                    });
                    continue;
                }
            };

            fids_by_volume
                .entry(volume_id.clone())
                .or_insert_with(|| {
                    volume_ids.push(volume_id);
                    Vec::new()
                })
                .push(fid);
        }

        if volume_ids.is_empty() {
            return Ok(outcome);
        }

        let lookups = match self.directory.resolve_volume_ids(&volume_ids).await {
            Ok(lookups) => lookups,
            Err(error) => {
                tracing::warn!("batch delete lookup of {} volumes failed: {}", volume_ids.len(), error);
                outcome.errors.push(error.to_string());
                return Ok(outcome);
            }
        };

        let mut fids_by_server: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for volume_id in &volume_ids {
            let Some(lookup) = lookups.get(volume_id) else {
                outcome.errors.push(format!("[{}]: volume id not found", volume_id));
                continue;
            };
            if !lookup.error.is_empty() {
                outcome.errors.push(format!("[{}]: {}", volume_id, lookup.error));
                continue;
            }

            let volume_fids = &fids_by_volume[volume_id];
            for location in &lookup.locations {
                fids_by_server
                    .entry(location.url.clone())
                    .or_default()
                    .extend(volume_fids.iter().cloned());
            }
        }

        let transport = self.directory.transport();
        let deletes = fids_by_server.iter().map(|(server, fids)| async move {
            let result = delete_batch(transport.as_ref(), server, fids).await;
            (server, fids.len(), result)
        });

        for (server, count, result) in join_all(deletes).await {
            match result {
                Ok(results) => {
                    tracing::debug!("deleted {} fids on {}", count, server);
                    outcome.results.extend(results);
                }
                Err(error) => {
                    tracing::warn!("batch delete of {} fids on {} failed: {}", count, server, error);
                    outcome.errors.push(error.to_string());
                }
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::LocationCache;
    use crate::test_support::{FakeCluster, ManualClock};
    use std::time::Duration;

    fn operation(cluster: &Arc<FakeCluster>) -> DeleteFilesOperation {
        DeleteFilesOperation::new(Arc::new(DirectoryClient::new(
            vec!["master1:9333".to_string()],
            cluster.clone(),
            Arc::new(LocationCache::new(Arc::new(ManualClock::new()))),
            Duration::from_secs(600),
        )))
    }

    fn request(fids: &[String]) -> DeleteFilesOperationRequest {
        DeleteFilesOperationRequest {
            fids: fids.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_one_call_per_server() {
        let cluster = Arc::new(FakeCluster::new());
        let fids = vec![
            cluster.store_object("1", b"a"),
            cluster.store_object("1", b"b"),
            cluster.store_object("2", b"c"),
            cluster.store_object("3", b"d"),
            cluster.store_object("3", b"e"),
        ];
        // volume 3 moves next to volume 1
        cluster.set_volume("3", &["vol1:8080"]);

        let outcome = operation(&cluster).run(request(&fids)).await.unwrap();

        assert!(outcome.is_clean());
        assert_eq!(outcome.results.len(), fids.len());
        assert_eq!(cluster.count_path("/delete"), 2);
        assert_eq!(cluster.calls_to("vol1:8080", "/delete"), 1);
        assert_eq!(cluster.count_path("/vol/lookup"), 1);
        assert_eq!(cluster.object_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_ids_do_not_block_batch() {
        let cluster = Arc::new(FakeCluster::new());
        let good = cluster.store_object("2", b"x");
        let fids = vec!["garbage".to_string(), good.clone(), ",123".to_string()];

        let outcome = operation(&cluster).run(request(&fids)).await.unwrap();

        assert_eq!(outcome.results.len(), 3);
        let bad: Vec<&str> = outcome
            .results
            .iter()
            .filter(|r| r.status == BAD_REQUEST)
            .map(|r| r.fid.as_str())
            .collect();
        assert_eq!(bad, vec!["garbage", ",123"]);
        assert!(outcome.errors.is_empty());
        assert!(!outcome.is_clean());
        assert!(!cluster.contains(&good));
    }

    #[tokio::test]
    async fn test_unknown_volume_goes_to_errors() {
        let cluster = Arc::new(FakeCluster::new());
        let good = cluster.store_object("1", b"x");
        let fids = vec![good, "42,0001".to_string()];

        let outcome = operation(&cluster).run(request(&fids)).await.unwrap();

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].starts_with("[42]"));
    }

    #[tokio::test]
    async fn test_server_failure_is_aggregated() {
        let cluster = Arc::new(FakeCluster::new());
        let fids = vec![cluster.store_object("1", b"x"), cluster.store_object("2", b"y")];
        cluster.take_host_down("vol2:8080");

        let outcome = operation(&cluster).run(request(&fids)).await.unwrap();

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].fid, fids[0]);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(cluster.count_path("/delete"), 2);
    }

    #[tokio::test]
    async fn test_lookup_failure_fails_nothing_else() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.take_seed_down("master1:9333");
        let fids = vec!["1,0001".to_string(), "oops".to_string()];

        let outcome = operation(&cluster).run(request(&fids)).await.unwrap();

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(cluster.count_path("/delete"), 0);
    }
}
