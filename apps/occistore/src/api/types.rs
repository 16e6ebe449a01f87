//! # API Request/Response Types
//!
//! JSON structures for the protocol adapter, and the conversion between
//! JSON tagged values and the core's `WireValue`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use occistore_core::{
    CategoryId, CollectionItem, EntityDescriptor, EntityId, GraphStats, LoadedEntity, StoreError,
    WireAttributes, WireValue,
    marshal::signature,
    primitives::{MAX_ATTRIBUTES, MAX_ID_LENGTH, MAX_MIXIN_TARGETS},
};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::BTreeMap;

// =============================================================================
// TAGGED VALUES
// =============================================================================

/// A typed attribute value on the wire: `{"type": "<signature>", "value": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedValue {
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default)]
    pub value: Json,
}

/// Attribute name -> tagged value.
pub type TaggedAttributes = BTreeMap<String, TaggedValue>;

impl TaggedValue {
    pub fn new(type_tag: impl Into<String>, value: Json) -> Self {
        Self {
            type_tag: type_tag.into(),
            value,
        }
    }

    /// String-typed value.
    pub fn string(text: impl Into<String>) -> Self {
        Self::new(signature::STRING, Json::String(text.into()))
    }

    /// Convert to the core representation.
    ///
    /// `null` becomes `WireValue::Null`; an unknown tag, or a value that does
    /// not fit its declared type, becomes `WireValue::Unsupported`.
    pub fn to_wire(&self) -> WireValue {
        if self.value.is_null() {
            return WireValue::Null;
        }
        let Some(sig) = canonical_signature(&self.type_tag) else {
            return WireValue::Unsupported(self.type_tag.clone());
        };

        let value = &self.value;
        let converted = match sig {
            signature::BOOLEAN => value.as_bool().map(WireValue::Boolean),
            signature::INT16 => value
                .as_i64()
                .and_then(|v| i16::try_from(v).ok())
                .map(WireValue::Int16),
            signature::UINT16 => value
                .as_u64()
                .and_then(|v| u16::try_from(v).ok())
                .map(WireValue::UInt16),
            signature::INT32 => value
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(WireValue::Int32),
            signature::UINT32 => value
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .map(WireValue::UInt32),
            signature::INT64 => value.as_i64().map(WireValue::Int64),
            signature::UINT64 => value.as_u64().map(WireValue::UInt64),
            signature::DOUBLE => value.as_f64().map(WireValue::Double),
            signature::STRING => value.as_str().map(|s| WireValue::String(s.to_string())),
            signature::BYTES => value
                .as_str()
                .and_then(|s| STANDARD.decode(s).ok())
                .map(WireValue::Bytes),
            signature::UNIX_FD => value
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .map(WireValue::UnixFd),
            _ => None,
        };
        converted.unwrap_or_else(|| WireValue::Unsupported(self.type_tag.clone()))
    }

    /// Convert from the core representation.
    pub fn from_wire(value: &WireValue) -> Self {
        let json = match value {
            WireValue::Boolean(b) => Json::Bool(*b),
            WireValue::Int16(v) => Json::from(*v),
            WireValue::UInt16(v) => Json::from(*v),
            WireValue::Int32(v) => Json::from(*v),
            WireValue::UInt32(v) | WireValue::UnixFd(v) => Json::from(*v),
            WireValue::Int64(v) => Json::from(*v),
            WireValue::UInt64(v) => Json::from(*v),
            WireValue::Double(v) => serde_json::Number::from_f64(*v).map_or(Json::Null, Json::Number),
            WireValue::String(s) => Json::String(s.clone()),
            WireValue::Bytes(bytes) => Json::String(STANDARD.encode(bytes)),
            WireValue::Unsupported(_) | WireValue::Null => Json::Null,
        };
        Self::new(value.signature(), json)
    }
}

/// Map a signature or its long-name alias to the signature constant.
fn canonical_signature(tag: &str) -> Option<&'static str> {
    let sig = match tag {
        "b" | "boolean" => signature::BOOLEAN,
        "n" | "int16" => signature::INT16,
        "q" | "uint16" => signature::UINT16,
        "i" | "int32" => signature::INT32,
        "u" | "uint32" => signature::UINT32,
        "x" | "int64" => signature::INT64,
        "t" | "uint64" => signature::UINT64,
        "d" | "double" => signature::DOUBLE,
        "s" | "string" => signature::STRING,
        "ay" | "bytes" => signature::BYTES,
        "h" | "fd" => signature::UNIX_FD,
        _ => return None,
    };
    Some(sig)
}

pub fn to_wire_attributes(attributes: &TaggedAttributes) -> WireAttributes {
    attributes
        .iter()
        .map(|(k, v)| (k.clone(), v.to_wire()))
        .collect()
}

pub fn from_wire_attributes(attributes: &WireAttributes) -> TaggedAttributes {
    attributes
        .iter()
        .map(|(k, v)| (k.clone(), TaggedValue::from_wire(v)))
        .collect()
}

// =============================================================================
// INPUT VALIDATION
// =============================================================================

/// Reject empty or oversized identifiers.
pub fn validate_id(field: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{} must not be empty", field));
    }
    if value.len() > MAX_ID_LENGTH {
        return Err(format!(
            "{} length {} exceeds maximum {} bytes",
            field,
            value.len(),
            MAX_ID_LENGTH
        ));
    }
    Ok(())
}

fn validate_attributes(attributes: Option<&TaggedAttributes>) -> Result<(), String> {
    match attributes {
        Some(attrs) if attrs.len() > MAX_ATTRIBUTES => Err(format!(
            "{} attributes exceed maximum {}",
            attrs.len(),
            MAX_ATTRIBUTES
        )),
        _ => Ok(()),
    }
}

fn validate_mixins(mixins: &[String]) -> Result<(), String> {
    mixins.iter().try_for_each(|m| validate_id("mixin", m))
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Store status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub backend: String,
    pub entities: usize,
    pub resources: usize,
    pub links: usize,
    pub categories: usize,
    pub open_cursors: usize,
}

impl StatusResponse {
    pub fn new(backend: &str, stats: GraphStats, open_cursors: usize) -> Self {
        Self {
            backend: backend.to_string(),
            entities: stats.entities,
            resources: stats.resources,
            links: stats.links,
            categories: stats.categories,
            open_cursors,
        }
    }
}

// =============================================================================
// SAVE RESOURCE / SAVE LINK
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveResourceRequest {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub mixins: Vec<String>,
    #[serde(default)]
    pub attributes: Option<TaggedAttributes>,
    #[serde(default)]
    pub owner: String,
}

impl SaveResourceRequest {
    pub fn validate(&self) -> Result<(), String> {
        validate_id("id", &self.id)?;
        validate_id("kind", &self.kind)?;
        validate_mixins(&self.mixins)?;
        validate_attributes(self.attributes.as_ref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveLinkRequest {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub mixins: Vec<String>,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub attributes: Option<TaggedAttributes>,
    #[serde(default)]
    pub owner: String,
}

impl SaveLinkRequest {
    pub fn validate(&self) -> Result<(), String> {
        validate_id("id", &self.id)?;
        validate_id("kind", &self.kind)?;
        validate_id("source", &self.source)?;
        validate_id("target", &self.target)?;
        validate_mixins(&self.mixins)?;
        validate_attributes(self.attributes.as_ref())
    }
}

pub fn category_ids(ids: &[String]) -> Vec<CategoryId> {
    ids.iter().map(|m| CategoryId::new(m.as_str())).collect()
}

/// Response carrying the id of a stored entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveResponse {
    pub success: bool,
    pub id: Option<String>,
    pub error: Option<String>,
}

impl SaveResponse {
    pub fn success(id: EntityId) -> Self {
        Self {
            success: true,
            id: Some(id.0),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            id: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// UPDATE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub id: String,
    #[serde(default)]
    pub attributes: TaggedAttributes,
}

impl UpdateRequest {
    pub fn validate(&self) -> Result<(), String> {
        validate_id("id", &self.id)?;
        validate_attributes(Some(&self.attributes))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub success: bool,
    #[serde(default)]
    pub attributes: TaggedAttributes,
    pub error: Option<String>,
}

impl UpdateResponse {
    pub fn success(attributes: &WireAttributes) -> Self {
        Self {
            success: true,
            attributes: from_wire_attributes(attributes),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            attributes: TaggedAttributes::new(),
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// MIXINS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixinRequest {
    pub mixin: String,
    #[serde(default)]
    pub entity_ids: Vec<String>,
}

impl MixinRequest {
    pub fn validate(&self) -> Result<(), String> {
        validate_id("mixin", &self.mixin)?;
        if self.entity_ids.len() > MAX_MIXIN_TARGETS {
            return Err(format!(
                "{} entity ids exceed maximum {}",
                self.entity_ids.len(),
                MAX_MIXIN_TARGETS
            ));
        }
        self.entity_ids
            .iter()
            .try_for_each(|id| validate_id("entity id", id))
    }

    pub fn targets(&self) -> Vec<EntityId> {
        self.entity_ids
            .iter()
            .map(|id| EntityId::new(id.as_str()))
            .collect()
    }
}

/// Response for operations that return nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    pub success: bool,
    pub error: Option<String>,
}

impl AckResponse {
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// FIND / LOAD / DELETE
// =============================================================================

/// Request naming a single entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdRequest {
    pub id: String,
}

/// One `find` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorJson {
    pub node_type: u8,
    pub id: String,
    pub owner: String,
    pub serial: u64,
    /// Decimal digit string; too wide for a JSON integer.
    pub etag: String,
}

impl From<EntityDescriptor> for DescriptorJson {
    fn from(d: EntityDescriptor) -> Self {
        Self {
            node_type: d.node_type,
            id: d.id.0,
            owner: d.owner,
            serial: d.serial.value(),
            etag: d.etag,
        }
    }
}

/// Zero or one descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindResponse {
    pub success: bool,
    #[serde(default)]
    pub results: Vec<DescriptorJson>,
    pub error: Option<String>,
}

impl FindResponse {
    pub fn success(found: Option<EntityDescriptor>) -> Self {
        Self {
            success: true,
            results: found.map(DescriptorJson::from).into_iter().collect(),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            results: Vec::new(),
            error: Some(msg.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadResponse {
    pub success: bool,
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub mixins: Vec<String>,
    #[serde(default)]
    pub attributes: TaggedAttributes,
    pub error: Option<String>,
}

impl LoadResponse {
    pub fn success(loaded: LoadedEntity) -> Self {
        Self {
            success: true,
            attributes: from_wire_attributes(&loaded.attributes),
            id: loaded.id.0,
            kind: loaded.kind.0,
            mixins: loaded.mixins.into_iter().map(|m| m.0).collect(),
            error: None,
        }
    }

    pub fn error(id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            success: false,
            id: id.into(),
            kind: String::new(),
            mixins: Vec::new(),
            attributes: TaggedAttributes::new(),
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// LIST / NEXT
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRequest {
    pub category: String,
    #[serde(default)]
    pub filters: TaggedAttributes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    pub success: bool,
    pub cursor_id: Option<String>,
    pub serial: Option<u64>,
    pub error: Option<String>,
}

impl ListResponse {
    pub fn success(cursor_id: String, serial: u64) -> Self {
        Self {
            success: true,
            cursor_id: Some(cursor_id),
            serial: Some(serial),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            cursor_id: None,
            serial: None,
            error: Some(msg.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextRequest {
    pub cursor_id: String,
    #[serde(default)]
    pub start: usize,
    /// Zero or negative reads to the end.
    #[serde(default)]
    pub count: i64,
}

impl NextRequest {
    pub fn count(&self) -> usize {
        usize::try_from(self.count).unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemJson {
    pub id: String,
    pub owner: String,
}

impl From<CollectionItem> for ItemJson {
    fn from(item: CollectionItem) -> Self {
        Self {
            id: item.id.0,
            owner: item.owner,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextResponse {
    pub success: bool,
    #[serde(default)]
    pub items: Vec<ItemJson>,
    pub error: Option<String>,
}

impl NextResponse {
    pub fn success(items: Vec<CollectionItem>) -> Self {
        Self {
            success: true,
            items: items.into_iter().map(ItemJson::from).collect(),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            items: Vec::new(),
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// ACTIONS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub id: String,
    pub action: String,
    #[serde(default)]
    pub attributes: Option<TaggedAttributes>,
}

impl ActionRequest {
    pub fn validate(&self) -> Result<(), String> {
        validate_id("id", &self.id)?;
        validate_id("action", &self.action)?;
        validate_attributes(self.attributes.as_ref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    /// Whether the entity existed and its handler ran.
    pub executed: bool,
    pub error: Option<String>,
}

impl ActionResponse {
    pub fn success(executed: bool) -> Self {
        Self {
            success: true,
            executed,
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            executed: false,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// PROPERTIES
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyRequest {
    #[serde(default)]
    pub value: Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyResponse {
    pub success: bool,
    pub name: String,
    pub value: Option<String>,
}

// =============================================================================
// ERROR MAPPING
// =============================================================================

/// Short machine-readable name of an error variant.
pub fn error_kind(error: &StoreError) -> &'static str {
    match error {
        StoreError::UnknownCategory(_) => "UnknownCategory",
        StoreError::DanglingReference { .. } => "DanglingReference",
        StoreError::UnsupportedAttributeType { .. } => "UnsupportedAttributeType",
        StoreError::IndexOutOfRange { .. } => "IndexOutOfRange",
        StoreError::DigestUnavailable(_) => "DigestUnavailable",
        StoreError::SerializationError(_) => "SerializationError",
        StoreError::DeserializationError(_) => "DeserializationError",
        StoreError::IoError(_) => "IoError",
    }
}
