//! In-memory directory + volume servers behind `Transport`, with fault
//! injection and a call log.

use crate::directory::Clock;
use crate::storage::ChunkManifest;
use crate::transport::{DownloadResponse, FilePart, HttpResponse, Transport};
use crate::{Result, WeedError};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::Url;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }
}

#[derive(Debug, Clone)]
pub struct Call {
    pub method: &'static str,
    pub host: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
    pub file_name: Option<String>,
    pub gzipped: bool,
}

impl Call {
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_manifest_upload(&self) -> bool {
        self.method == "UPLOAD" && self.query_value("cm") == Some("true")
    }
}

struct StoredObject {
    name: String,
    content: Bytes,
    manifest: bool,
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    volumes: BTreeMap<String, Vec<String>>,
    objects: HashMap<String, StoredObject>,
    next_key: u64,
    down_hosts: HashSet<String>,
    assign_error: Option<String>,
    failing_upload_fids: HashSet<String>,
    uploads_allowed: Option<usize>,
    plain_uploads: usize,
    fail_manifest: bool,
    reject_delete_hosts: HashSet<String>,
    piece_size: usize,
    empty_piece_after_first: bool,
}

pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    /// Volumes "1", "2" and "3" on `vol1:8080`, `vol2:8080`, `vol3:8080`.
    pub fn new() -> Self {
        Self::with_replicas(1)
    }

    /// Volume `v` replicated on `replicas` consecutive servers starting at `vol{v}`.
    pub fn with_replicas(replicas: usize) -> Self {
        let mut volumes = BTreeMap::new();
        for volume in 1..=3usize {
            let servers = (0..replicas)
                .map(|r| format!("vol{}:8080", ((volume - 1 + r) % 3) + 1))
                .collect();
            volumes.insert(volume.to_string(), servers);
        }

        Self {
            state: Mutex::new(State {
                volumes,
                next_key: 1,
                piece_size: 7,
                ..Default::default()
            }),
        }
    }

    pub fn set_volume(&self, volume_id: &str, servers: &[&str]) {
        self.state.lock().unwrap().volumes.insert(
            volume_id.to_string(),
            servers.iter().map(|s| s.to_string()).collect(),
        );
    }

    pub fn take_seed_down(&self, host: &str) {
        self.take_host_down(host);
    }

    pub fn take_host_down(&self, host: &str) {
        self.state.lock().unwrap().down_hosts.insert(host.to_string());
    }

    pub fn fail_assign(&self, message: &str) {
        self.state.lock().unwrap().assign_error = Some(message.to_string());
    }

    pub fn fail_uploads_to(&self, fid: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_upload_fids
            .insert(fid.to_string());
    }

    /// Let `count` more non-manifest uploads succeed, then fail the rest
    /// with a transport error.
    pub fn fail_uploads_after(&self, count: usize) {
        let mut state = self.state.lock().unwrap();
        state.uploads_allowed = Some(state.plain_uploads + count);
    }

    pub fn fail_manifest_uploads(&self) {
        self.state.lock().unwrap().fail_manifest = true;
    }

    pub fn reject_deletes_on(&self, host: &str) {
        self.state
            .lock()
            .unwrap()
            .reject_delete_hosts
            .insert(host.to_string());
    }

    /// Emit an empty body piece right after the first one on downloads.
    pub fn emit_empty_piece(&self) {
        self.state.lock().unwrap().empty_piece_after_first = true;
    }

    /// Store `data` directly on `volume_id`, bypassing assign.
    pub fn store_object(&self, volume_id: &str, data: &[u8]) -> String {
        let mut state = self.state.lock().unwrap();
        let fid = format!("{},{:08x}", volume_id, state.next_key);
        state.next_key += 1;
        state.objects.insert(
            fid.clone(),
            StoredObject {
                name: fid.clone(),
                content: Bytes::copy_from_slice(data),
                manifest: false,
            },
        );
        fid
    }

    pub fn contains(&self, fid: &str) -> bool {
        self.state.lock().unwrap().objects.contains_key(fid)
    }

    pub fn object_count(&self) -> usize {
        self.state.lock().unwrap().objects.len()
    }

    pub fn manifest(&self, fid: &str) -> Option<ChunkManifest> {
        let state = self.state.lock().unwrap();
        let object = state.objects.get(fid)?;
        if !object.manifest {
            return None;
        }
        ChunkManifest::from_json(&object.content).ok()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    pub fn count_path(&self, path: &str) -> usize {
        self.calls().iter().filter(|c| c.path == path).count()
    }

    pub fn count_method(&self, method: &str) -> usize {
        self.calls().iter().filter(|c| c.method == method).count()
    }

    pub fn calls_to(&self, host: &str, path: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.host == host && c.path == path)
            .count()
    }

    pub fn uploads(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == "UPLOAD")
            .collect()
    }

    pub fn manifest_uploads(&self) -> usize {
        self.uploads().iter().filter(|c| c.is_manifest_upload()).count()
    }

    pub fn last_form(&self, path: &str) -> Vec<String> {
        self.calls()
            .iter()
            .rev()
            .find(|c| c.path == path)
            .map(|c| c.form.iter().map(|(_, v)| v.clone()).collect())
            .unwrap_or_default()
    }

    fn record(&self, method: &'static str, url: &str, form: Vec<(String, String)>, part: Option<&FilePart>) -> Result<Call> {
        let parsed = Url::parse(url).map_err(|e| WeedError::Transport(e.to_string()))?;
        let host = match parsed.port() {
            Some(port) => format!("{}:{}", parsed.host_str().unwrap_or_default(), port),
            None => parsed.host_str().unwrap_or_default().to_string(),
        };

        let call = Call {
            method,
            host: host.clone(),
            path: parsed.path().to_string(),
            query: parsed
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
            form,
            file_name: part.map(|p| p.file_name.clone()),
            gzipped: part.map(|p| p.gzipped).unwrap_or(false),
        };

        let mut state = self.state.lock().unwrap();
        state.calls.push(call.clone());
        if state.down_hosts.contains(&host) {
            return Err(WeedError::Transport(format!("connection refused: {}", host)));
        }
        Ok(call)
    }

    fn locations_json(servers: &[String]) -> serde_json::Value {
        servers
            .iter()
            .map(|s| json!({ "url": s, "publicUrl": s }))
            .collect()
    }

    fn lookup_json(state: &State, volume_id: &str) -> serde_json::Value {
        match state.volumes.get(volume_id) {
            Some(servers) => json!({
                "volumeId": volume_id,
                "locations": Self::locations_json(servers),
            }),
            None => json!({
                "volumeId": volume_id,
                "error": format!("volume id {} not found", volume_id),
            }),
        }
    }

    fn assemble(state: &State, object: &StoredObject) -> Option<Bytes> {
        if !object.manifest {
            return Some(object.content.clone());
        }
        let manifest = ChunkManifest::from_json(&object.content).ok()?;
        let mut data = Vec::with_capacity(manifest.size as usize);
        for chunk in &manifest.chunks {
            data.extend_from_slice(&state.objects.get(&chunk.fid)?.content);
        }
        Some(Bytes::from(data))
    }
}

fn reply(status: u16, body: serde_json::Value) -> HttpResponse {
    HttpResponse {
        status,
        body: Bytes::from(body.to_string()),
    }
}

fn form_values<'a>(form: &'a [(String, String)], key: &str) -> Vec<&'a str> {
    form.iter()
        .filter(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .collect()
}

#[async_trait]
impl Transport for FakeCluster {
    async fn post_form(&self, url: &str, form: Vec<(String, String)>) -> Result<HttpResponse> {
        let call = self.record("POST", url, form.clone(), None)?;
        let mut state = self.state.lock().unwrap();

        match call.path.as_str() {
            "/dir/assign" => {
                if let Some(message) = state.assign_error.clone() {
                    return Ok(reply(200, json!({ "error": message })));
                }
                let volume_ids: Vec<String> = state.volumes.keys().cloned().collect();
                let volume_id = &volume_ids[(state.next_key as usize) % volume_ids.len()];
                let fid = format!("{},{:08x}", volume_id, state.next_key);
                state.next_key += 1;
                let server = state.volumes[volume_id][0].clone();
                Ok(reply(
                    200,
                    json!({ "fid": fid, "url": server, "publicUrl": server, "count": 1 }),
                ))
            }
            "/dir/lookup" => {
                let volume_id = form_values(&form, "volumeId").first().copied().unwrap_or_default();
                let body = Self::lookup_json(&state, volume_id);
                let status = if body.get("error").is_some() { 404 } else { 200 };
                Ok(reply(status, body))
            }
            "/vol/lookup" => {
                let mut body = serde_json::Map::new();
                for volume_id in form_values(&form, "volumeId") {
                    body.insert(volume_id.to_string(), Self::lookup_json(&state, volume_id));
                }
                Ok(reply(200, serde_json::Value::Object(body)))
            }
            "/delete" => {
                let results: Vec<serde_json::Value> = form_values(&form, "fid")
                    .into_iter()
                    .map(|fid| match state.objects.remove(fid) {
                        Some(object) => json!({
                            "fid": fid,
                            "size": object.content.len(),
                            "status": 202,
                        }),
                        None => json!({ "fid": fid, "status": 404, "error": "not found" }),
                    })
                    .collect();
                Ok(reply(200, serde_json::Value::Array(results)))
            }
            other => Ok(reply(404, json!({ "error": format!("no route {}", other) }))),
        }
    }

    async fn post_multipart(&self, url: &str, part: FilePart) -> Result<HttpResponse> {
        let call = self.record("UPLOAD", url, Vec::new(), Some(&part))?;
        let fid = call.path.trim_start_matches('/').to_string();
        let manifest = call.is_manifest_upload();
        let mut state = self.state.lock().unwrap();

        if state.failing_upload_fids.contains(&fid) || (manifest && state.fail_manifest) {
            return Ok(reply(500, json!({ "error": format!("failed to write {}", fid) })));
        }

        if !manifest {
            if let Some(allowed) = state.uploads_allowed {
                if state.plain_uploads >= allowed {
                    return Err(WeedError::Transport(format!("connection reset: {}", call.host)));
                }
            }
            state.plain_uploads += 1;
        }

        let size = part.content.len();
        state.objects.insert(
            fid,
            StoredObject {
                name: part.file_name.clone(),
                content: part.content,
                manifest,
            },
        );

        Ok(reply(201, json!({ "name": part.file_name, "size": size })))
    }

    async fn get(&self, url: &str) -> Result<DownloadResponse> {
        let call = self.record("GET", url, Vec::new(), None)?;
        let fid = call.path.trim_start_matches('/');
        let state = self.state.lock().unwrap();

        let Some(object) = state.objects.get(fid) else {
            return Ok(DownloadResponse {
                status: 404,
                content_disposition: None,
                body: futures_util::stream::empty().boxed(),
            });
        };

        let content = Self::assemble(&state, object)
            .ok_or_else(|| WeedError::Transport(format!("broken manifest {}", fid)))?;

        let mut pieces: Vec<Result<Bytes>> = content
            .chunks(state.piece_size.max(1))
            .map(|piece| Ok(Bytes::copy_from_slice(piece)))
            .collect();
        if state.empty_piece_after_first && !pieces.is_empty() {
            pieces.insert(1, Ok(Bytes::new()));
        }

        Ok(DownloadResponse {
            status: 200,
            content_disposition: Some(format!("inline; filename=\"{}\"", object.name)),
            body: futures_util::stream::iter(pieces).boxed(),
        })
    }

    async fn delete(&self, url: &str) -> Result<HttpResponse> {
        let call = self.record("DELETE", url, Vec::new(), None)?;
        let mut state = self.state.lock().unwrap();

        if state.reject_delete_hosts.contains(&call.host) {
            return Ok(reply(500, json!({ "error": "read only volume" })));
        }

        let fid = call.path.trim_start_matches('/');
        match state.objects.remove(fid) {
            Some(object) => Ok(reply(202, json!({ "size": object.content.len() }))),
            None => Ok(reply(404, json!({}))),
        }
    }
}
