//! # Version Tracker
//!
//! Serial numbers and ETags for entities.
//!
//! Every entity starts at `Serial::INITIAL` and moves forward by one on each
//! mutating operation. The ETag is a digest of the entity's serialized
//! state, rendered as a string of decimal digits: each character of the hex
//! digest is replaced by its numeric character code.

use crate::primitives::ETAG_FALLBACK;
use crate::{Entity, Serial, StoreError};

/// Stateless serial and ETag bookkeeping.
pub struct VersionTracker;

impl VersionTracker {
    /// Advance the entity's serial and return the new value.
    pub fn bump(entity: &mut Entity) -> Serial {
        entity.serial = entity.serial.increment();
        entity.serial
    }

    /// Compute the ETag, degrading to `ETAG_FALLBACK` when no digest is available.
    #[must_use]
    pub fn compute_etag(entity: &Entity) -> String {
        match Self::try_etag(entity) {
            Ok(etag) => etag,
            Err(e) => {
                tracing::warn!(entity = %entity.id, "using fallback etag: {}", e);
                ETAG_FALLBACK.to_string()
            }
        }
    }

    /// Compute the ETag, surfacing `DigestUnavailable` instead of falling back.
    pub fn try_etag(entity: &Entity) -> Result<String, StoreError> {
        let bytes =
            postcard::to_stdvec(entity).map_err(|e| StoreError::DigestUnavailable(e.to_string()))?;
        let digest = hex_digest(&bytes)?;
        Ok(render_decimal(&digest))
    }
}

#[cfg(feature = "crypto-hash")]
fn hex_digest(bytes: &[u8]) -> Result<String, StoreError> {
    Ok(blake3::hash(bytes).to_hex().to_string())
}

#[cfg(not(feature = "crypto-hash"))]
fn hex_digest(_bytes: &[u8]) -> Result<String, StoreError> {
    Err(StoreError::DigestUnavailable(
        "built without the crypto-hash feature".to_string(),
    ))
}

/// Concatenate the character code of every digest character.
fn render_decimal(digest: &str) -> String {
    digest.chars().map(|c| u32::from(c).to_string()).collect()
}

// =============================================================================
// TESTS
// =============================================================================
