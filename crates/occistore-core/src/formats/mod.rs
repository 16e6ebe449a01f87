//! # Formats
//!
//! Byte-level encodings of store content. File I/O is in the app layer.

pub mod snapshot;

pub use snapshot::{
    MAX_SNAPSHOT_PAYLOAD_SIZE, SnapshotHeader, import_snapshot, snapshot_from_bytes,
    snapshot_to_bytes,
};
