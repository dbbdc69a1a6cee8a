//! Ledger object documents
//!
//! Every object is persisted as a JSON document tagged with its type. Reads
//! go through typed decoding so a document of the wrong shape surfaces as
//! `LedgerFsError::Decode` at the boundary instead of deep in a pipeline.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use ledgerfs_core::error::{LedgerFsError, Result};
use ledgerfs_core::{ContentHash, FileManifest, ObjectHandle};
use serde::{Deserialize, Serialize};

/// Envelope stored under each object handle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub owner: String,
    /// Bumped on every mutation
    pub version: u64,
    pub object: LedgerObject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "fields", rename_all = "snake_case")]
pub enum LedgerObject {
    File(FileManifest),
    Declaration(DeclarationRecord),
    Chunk(ChunkRecord),
    Credit(CreditRecord),
}

impl LedgerObject {
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerObject::File(_) => "file",
            LedgerObject::Declaration(_) => "declaration",
            LedgerObject::Chunk(_) => "chunk",
            LedgerObject::Credit(_) => "credit",
        }
    }
}

/// Outstanding right to create one chunk of a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclarationRecord {
    pub file: ObjectHandle,
    pub index: u32,
    pub identifier: ContentHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub file: ObjectHandle,
    pub index: u32,
    pub identifier: ContentHash,
    pub content_hash: ContentHash,
    #[serde(with = "base64_bytes")]
    pub data: Bytes,
    pub registered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditRecord {
    pub balance: u64,
}

impl StoredObject {
    pub fn new(owner: impl Into<String>, object: LedgerObject) -> Self {
        Self {
            owner: owner.into(),
            version: 1,
            object,
        }
    }

    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn decode(handle: &ObjectHandle, raw: &[u8]) -> Result<Self> {
        serde_json::from_slice(raw)
            .map_err(|e| LedgerFsError::Decode(format!("object {}: {}", handle, e)))
    }

    /// Replace the payload and bump the version
    pub fn update(&mut self, object: LedgerObject) {
        self.object = object;
        self.version += 1;
    }

    pub fn into_file(self, handle: &ObjectHandle) -> Result<FileManifest> {
        match self.object {
            LedgerObject::File(manifest) => {
                manifest.check_entries()?;
                Ok(manifest)
            }
            other => Err(wrong_kind(handle, "file", &other)),
        }
    }

    pub fn into_declaration(self, handle: &ObjectHandle) -> Result<DeclarationRecord> {
        match self.object {
            LedgerObject::Declaration(record) => Ok(record),
            other => Err(wrong_kind(handle, "declaration", &other)),
        }
    }

    pub fn into_chunk(self, handle: &ObjectHandle) -> Result<ChunkRecord> {
        match self.object {
            LedgerObject::Chunk(record) => Ok(record),
            other => Err(wrong_kind(handle, "chunk", &other)),
        }
    }

    pub fn into_credit(self, handle: &ObjectHandle) -> Result<CreditRecord> {
        match self.object {
            LedgerObject::Credit(record) => Ok(record),
            other => Err(wrong_kind(handle, "credit", &other)),
        }
    }
}

fn wrong_kind(handle: &ObjectHandle, expected: &str, actual: &LedgerObject) -> LedgerFsError {
    LedgerFsError::Decode(format!(
        "object {} is a {}, expected {}",
        handle,
        actual.kind(),
        expected
    ))
}

mod base64_bytes {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        data: &Bytes,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_object() -> StoredObject {
        let data = Bytes::from_static(b"\x00\x01binary\xff");
        let content_hash = ContentHash::compute(&data);
        StoredObject::new(
            "alice",
            LedgerObject::Chunk(ChunkRecord {
                file: ObjectHandle::random(),
                index: 0,
                identifier: ledgerfs_core::chunk_identifier(&content_hash, 0),
                content_hash,
                data,
                registered: false,
            }),
        )
    }

    #[test]
    fn test_document_shape() {
        let handle = ObjectHandle::random();
        let object = StoredObject::new("alice", LedgerObject::Credit(CreditRecord { balance: 7 }));
        let raw = object.encode().unwrap();

        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(value["object"]["type"], "credit");
        assert_eq!(value["object"]["fields"]["balance"], 7);

        let decoded = StoredObject::decode(&handle, &raw).unwrap();
        assert_eq!(decoded.into_credit(&handle).unwrap().balance, 7);
    }

    #[test]
    fn test_chunk_data_base64() {
        let handle = ObjectHandle::random();
        let object = chunk_object();
        let raw = object.encode().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert!(value["object"]["fields"]["data"].is_string());

        let decoded = StoredObject::decode(&handle, &raw).unwrap();
        assert_eq!(decoded, object);
    }

    #[test]
    fn test_wrong_kind_is_decode_error() {
        let handle = ObjectHandle::random();
        let result = chunk_object().into_credit(&handle);
        assert!(matches!(result, Err(LedgerFsError::Decode(msg)) if msg.contains("is a chunk")));
    }

    #[test]
    fn test_malformed_document() {
        let handle = ObjectHandle::random();
        let raw = concat!(
            r#"{"owner":"alice","version":1,"#,
            r#""object":{"type":"credit","fields":{"balance":"lots"}}}"#
        )
        .as_bytes();
        assert!(matches!(
            StoredObject::decode(&handle, raw),
            Err(LedgerFsError::Decode(_))
        ));
    }

    #[test]
    fn test_update_bumps_version() {
        let mut object =
            StoredObject::new("alice", LedgerObject::Credit(CreditRecord { balance: 1 }));
        object.update(LedgerObject::Credit(CreditRecord { balance: 0 }));
        assert_eq!(object.version, 2);
    }
}
