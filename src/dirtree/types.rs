//! Directory manifest document.
//!
//! A directory is "just a file" at the storage layer: this JSON document is
//! the body of a regular File, so nesting falls out of file upload for free.

use serde::{Deserialize, Serialize};

use super::error::{DirError, DirResult};

const DIR_TYPE: &str = "dir";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EntryKind {
    #[serde(rename = "fileptr")]
    File,
    #[serde(rename = "dirptr")]
    Dir,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirEntry {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub name: String,
    pub size: i64,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirManifest {
    #[serde(rename = "type")]
    pub kind: String,
    pub files: Vec<DirEntry>,
}

impl DirManifest {
    pub fn new(files: Vec<DirEntry>) -> Self {
        Self {
            kind: DIR_TYPE.to_string(),
            files,
        }
    }

    pub fn encode(&self) -> DirResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(data: &[u8]) -> DirResult<Self> {
        let manifest: DirManifest = serde_json::from_slice(data)
            .map_err(|e| DirError::InvalidManifest(e.to_string()))?;
        if manifest.kind != DIR_TYPE {
            return Err(DirError::InvalidManifest(format!(
                "unexpected document type {:?}",
                manifest.kind
            )));
        }
        Ok(manifest)
    }

    pub fn entry(&self, name: &str) -> Option<&DirEntry> {
        self.files.iter().find(|e| e.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_field_names() {
        let manifest = DirManifest::new(vec![
            DirEntry {
                kind: EntryKind::File,
                name: "a.txt".to_string(),
                size: 42,
                id: "X".to_string(),
            },
            DirEntry {
                kind: EntryKind::Dir,
                name: "sub".to_string(),
                size: 0,
                id: "Y".to_string(),
            },
        ]);

        let json: serde_json::Value =
            serde_json::from_slice(&manifest.encode().unwrap()).unwrap();
        assert_eq!(json["type"], "dir");
        assert_eq!(json["files"][0]["type"], "fileptr");
        assert_eq!(json["files"][0]["name"], "a.txt");
        assert_eq!(json["files"][1]["type"], "dirptr");
        assert_eq!(json["files"][1]["id"], "Y");
    }

    #[test]
    fn test_decode_round_trip() {
        let manifest = DirManifest::new(vec![DirEntry {
            kind: EntryKind::File,
            name: "f".to_string(),
            size: 1,
            id: "abc".to_string(),
        }]);
        let decoded = DirManifest::decode(&manifest.encode().unwrap()).unwrap();
        assert_eq!(decoded, manifest);
    }

    #[test]
    fn test_decode_rejects_non_dir() {
        assert!(matches!(
            DirManifest::decode(br#"{"type":"file","files":[]}"#),
            Err(DirError::InvalidManifest(_))
        ));
        assert!(matches!(
            DirManifest::decode(b"raw file body"),
            Err(DirError::InvalidManifest(_))
        ));
    }
}
