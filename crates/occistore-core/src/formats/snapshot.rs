//! # Snapshot Format
//!
//! Binary export/import of every stored entity.
//!
//! Format: Header (5 bytes) + postcard-serialized entity list.
//! - 4 bytes: Magic ("OCCI")
//! - 1 byte: Version
//!
//! Size and header are checked before the payload is decoded. File I/O
//! lives in the app layer.

use crate::graph::EntityGraph;
use crate::{Entity, StoreError, primitives};
use serde::{Deserialize, Serialize};

/// Maximum accepted snapshot size.
pub const MAX_SNAPSHOT_PAYLOAD_SIZE: usize = 500 * 1024 * 1024; // 500 MB

const HEADER_LEN: usize = 5;

// =============================================================================
// FILE HEADER
// =============================================================================

/// The header that precedes snapshot data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl Default for SnapshotHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotHeader {
    /// Header for the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(StoreError::DeserializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(StoreError::DeserializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        let Some(header) = bytes.get(..HEADER_LEN) else {
            return Err(StoreError::DeserializationError(
                "Header too short".to_string(),
            ));
        };
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&header[0..4]);
        Ok(Self {
            magic,
            version: header[4],
        })
    }
}

#[derive(Serialize, Deserialize)]
struct SnapshotPayload {
    entities: Vec<Entity>,
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize every entity in the graph (header + payload).
pub fn snapshot_to_bytes(graph: &EntityGraph) -> Result<Vec<u8>, StoreError> {
    let payload = SnapshotPayload {
        entities: graph.entities()?,
    };
    let body = postcard::to_stdvec(&payload)
        .map_err(|e| StoreError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_LEN + body.len());
    result.extend_from_slice(&SnapshotHeader::new().to_bytes());
    result.extend_from_slice(&body);
    Ok(result)
}

/// Decode a snapshot into its entities.
pub fn snapshot_from_bytes(bytes: &[u8]) -> Result<Vec<Entity>, StoreError> {
    if bytes.len() > MAX_SNAPSHOT_PAYLOAD_SIZE {
        return Err(StoreError::DeserializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_SNAPSHOT_PAYLOAD_SIZE
        )));
    }

    let header = SnapshotHeader::from_bytes(bytes)?;
    header.validate()?;

    let payload: SnapshotPayload = postcard::from_bytes(&bytes[HEADER_LEN..]).map_err(|e| {
        StoreError::DeserializationError(format!("Failed to decode snapshot: {}", e))
    })?;
    Ok(payload.entities)
}

/// Decode a snapshot and load it into `graph`. Returns the entity count.
pub fn import_snapshot(graph: &mut EntityGraph, bytes: &[u8]) -> Result<usize, StoreError> {
    let entities = snapshot_from_bytes(bytes)?;
    let count = graph.restore(entities)?;
    tracing::info!(entities = count, "snapshot imported");
    Ok(count)
}

// =============================================================================
// TESTS
// =============================================================================
