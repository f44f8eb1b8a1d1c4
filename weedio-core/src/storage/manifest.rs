use crate::Result;
use serde::{Deserialize, Serialize};

/// One stored slice of a chunked object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    pub fid: String,
    pub offset: u64,
    pub size: u64,
}

/// Stitches a chunk set back into one logical object.
///
/// Uploaded as the logical object's body with `cm=true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkManifest {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mime: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chunks: Vec<ChunkInfo>,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

impl ChunkManifest {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, mut chunks: Vec<ChunkInfo>) -> Self {
        chunks.sort_by_key(|chunk| chunk.offset);
        let size = chunks.iter().map(|chunk| chunk.size).sum();
        Self {
            name: name.into(),
            mime: mime.into(),
            size,
            chunks,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        let mut manifest: ChunkManifest = serde_json::from_slice(data)?;
        manifest.chunks.sort_by_key(|chunk| chunk.offset);
        Ok(manifest)
    }

    /// True when chunks start at zero and follow each other without gaps.
    pub fn is_contiguous(&self) -> bool {
        let mut expected = 0;
        for chunk in &self.chunks {
            if chunk.offset != expected {
                return false;
            }
            expected += chunk.size;
        }
        expected == self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(fid: &str, offset: u64, size: u64) -> ChunkInfo {
        ChunkInfo {
            fid: fid.to_string(),
            offset,
            size,
        }
    }

    #[test]
    fn test_manifest_orders_chunks_and_sums_size() {
        let manifest = ChunkManifest::new(
            "big.bin",
            "",
            vec![chunk("1,03", 200, 50), chunk("1,01", 0, 100), chunk("1,02", 100, 100)],
        );

        let offsets: Vec<u64> = manifest.chunks.iter().map(|c| c.offset).collect();
        assert_eq!(offsets, vec![0, 100, 200]);
        assert_eq!(manifest.size, 250);
        assert!(manifest.is_contiguous());
    }

    #[test]
    fn test_manifest_json_shape() {
        let manifest = ChunkManifest::new("big.bin", "", vec![chunk("1,01", 0, 10)]);
        let json: serde_json::Value = serde_json::from_slice(&manifest.to_json().unwrap()).unwrap();

        assert_eq!(json["name"], "big.bin");
        assert_eq!(json["size"], 10);
        assert!(json.get("mime").is_none());
        assert_eq!(json["chunks"][0]["fid"], "1,01");
        assert_eq!(json["chunks"][0]["offset"], 0);

        let decoded = ChunkManifest::from_json(&manifest.to_json().unwrap()).unwrap();
        assert_eq!(decoded, manifest);
    }

    #[test]
    fn test_gap_is_not_contiguous() {
        let manifest = ChunkManifest::new("x", "", vec![chunk("1,01", 0, 10), chunk("1,02", 20, 10)]);
        assert!(!manifest.is_contiguous());
    }
}
