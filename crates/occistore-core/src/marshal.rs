//! # Attribute Marshaller
//!
//! Converts between tagged wire values and the canonical string form the
//! store keeps for every attribute.
//!
//! Decoding dispatches on the declared type of each value. Entries that
//! cannot be decoded are dropped individually; the rest of the map still
//! decodes. Encoding re-tags every string as a string-typed wire value, so
//! a round trip through the store widens numeric and boolean attributes to
//! strings.

use crate::StoreError;
use std::collections::BTreeMap;

/// D-Bus type signatures of the recognized wire types.
pub mod signature {
    pub const BOOLEAN: &str = "b";
    pub const INT16: &str = "n";
    pub const UINT16: &str = "q";
    pub const INT32: &str = "i";
    pub const UINT32: &str = "u";
    pub const INT64: &str = "x";
    pub const UINT64: &str = "t";
    pub const DOUBLE: &str = "d";
    pub const STRING: &str = "s";
    pub const BYTES: &str = "ay";
    pub const UNIX_FD: &str = "h";
}

/// A tagged attribute value as it arrives from the protocol layer.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Boolean(bool),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    String(String),
    /// Byte array. Assumed to hold UTF-8 text.
    Bytes(Vec<u8>),
    /// File-descriptor handle, carried as an unsigned 32-bit index.
    UnixFd(u32),
    /// A type tag the marshaller does not recognize.
    Unsupported(String),
    /// No value was supplied for the key.
    Null,
}

impl WireValue {
    /// The type signature of this value.
    #[must_use]
    pub fn signature(&self) -> &str {
        match self {
            Self::Boolean(_) => signature::BOOLEAN,
            Self::Int16(_) => signature::INT16,
            Self::UInt16(_) => signature::UINT16,
            Self::Int32(_) => signature::INT32,
            Self::UInt32(_) => signature::UINT32,
            Self::Int64(_) => signature::INT64,
            Self::UInt64(_) => signature::UINT64,
            Self::Double(_) => signature::DOUBLE,
            Self::String(_) => signature::STRING,
            Self::Bytes(_) => signature::BYTES,
            Self::UnixFd(_) => signature::UNIX_FD,
            Self::Unsupported(sig) => sig,
            Self::Null => "",
        }
    }

    #[must_use]
    pub fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }
}

/// Attribute name -> tagged wire value.
pub type WireAttributes = BTreeMap<String, WireValue>;

/// Outcome of decoding a wire attribute map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    /// Successfully decoded attributes.
    pub attributes: BTreeMap<String, String>,
    /// One error per dropped entry.
    pub rejected: Vec<StoreError>,
}

/// Stateless converter between wire values and canonical strings.
pub struct Marshaller;

impl Marshaller {
    /// Decode a wire attribute map.
    ///
    /// A `None` map decodes to an empty mapping. Unsupported or null values
    /// are dropped and reported in `Decoded::rejected`.
    pub fn decode(wire: Option<&WireAttributes>) -> Decoded {
        let mut decoded = Decoded::default();
        let Some(wire) = wire else {
            return decoded;
        };

        for (key, value) in wire {
            match Self::decode_value(key, value) {
                Ok(text) => {
                    decoded.attributes.insert(key.clone(), text);
                }
                Err(e) => {
                    tracing::warn!(key = %key, "dropping attribute: {}", e);
                    decoded.rejected.push(e);
                }
            }
        }
        decoded
    }

    /// Decode a single wire value to its canonical string.
    pub fn decode_value(key: &str, value: &WireValue) -> Result<String, StoreError> {
        let text = match value {
            WireValue::Boolean(b) => b.to_string(),
            WireValue::Int16(v) => v.to_string(),
            WireValue::UInt16(v) => v.to_string(),
            WireValue::Int32(v) => v.to_string(),
            WireValue::UInt32(v) | WireValue::UnixFd(v) => v.to_string(),
            WireValue::Int64(v) => v.to_string(),
            WireValue::UInt64(v) => v.to_string(),
            WireValue::Double(v) => canonical_double(*v),
            WireValue::String(s) => s.clone(),
            WireValue::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            WireValue::Unsupported(_) | WireValue::Null => {
                return Err(StoreError::UnsupportedAttributeType {
                    key: key.to_string(),
                    signature: value.signature().to_string(),
                });
            }
        };
        Ok(text)
    }

    /// Encode canonical attributes as string-typed wire values.
    pub fn encode(attributes: &BTreeMap<String, String>) -> WireAttributes {
        attributes
            .iter()
            .map(|(k, v)| (k.clone(), WireValue::String(v.clone())))
            .collect()
    }
}

/// Canonical decimal form of a double: integral values keep a trailing `.0`.
fn canonical_double(value: f64) -> String {
    format!("{:?}", value)
}

// =============================================================================
// TESTS
// =============================================================================
