//! # Store Primitives
//!
//! Hardcoded runtime constants for the occistore core.

/// ETag value reported when no digest can be computed.
pub const ETAG_FALLBACK: &str = "1";

/// Prefix of generated cursor identifiers.
pub const CURSOR_PREFIX: &str = "collection";

/// Magic bytes for the snapshot format header.
///
/// - File Header = Magic Bytes ("OCCI") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"OCCI";

/// Current snapshot format version.
///
/// Increment this when making breaking changes to the serialization format.
pub const FORMAT_VERSION: u8 = 1;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length of an entity or category identifier.
pub const MAX_ID_LENGTH: usize = 1024;

/// Maximum number of attributes accepted in a single call.
pub const MAX_ATTRIBUTES: usize = 4096;

/// Maximum number of entity ids in one mixin association.
pub const MAX_MIXIN_TARGETS: usize = 10000;
