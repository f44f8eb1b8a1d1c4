use crate::transport::RemoteReply;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default)]
pub struct VolumeAssignRequest {
    pub count: u64,
    pub replication: Option<String>,
    pub collection: Option<String>,
    pub ttl: Option<String>,
    pub data_center: Option<String>,
    pub rack: Option<String>,
    pub data_node: Option<String>,
}

impl VolumeAssignRequest {
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut form = vec![("count".to_string(), self.count.max(1).to_string())];

        let optional = [
            ("replication", &self.replication),
            ("collection", &self.collection),
            ("ttl", &self.ttl),
            ("dataCenter", &self.data_center),
            ("rack", &self.rack),
            ("dataNode", &self.data_node),
        ];
        for (key, value) in optional {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                form.push((key.to_string(), value.to_string()));
            }
        }

        form
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignResult {
    #[serde(default)]
    pub fid: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub public_url: String,
    #[serde(default)]
    pub count: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl RemoteReply for AssignResult {
    fn error_message(&self) -> &str {
        &self.error
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub public_url: String,
}

impl Location {
    /// Address used for client traffic; falls back to the private url.
    pub fn public_addr(&self) -> &str {
        if self.public_url.is_empty() {
            &self.url
        } else {
            &self.public_url
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResult {
    #[serde(default)]
    pub volume_id: String,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl RemoteReply for LookupResult {
    fn error_message(&self) -> &str {
        &self.error
    }
}
