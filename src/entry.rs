use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;

use crate::error::CacheError;

/// A cache entry containing a value and its expiration time.
///
/// This is also the persisted form of a value: persistent stores hold the JSON
/// of an `Entry<V>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry<V> {
    /// The cached value.
    pub value: V,

    /// Unix timestamp in milliseconds.
    /// Do not use data after this point as it is considered no longer valid.
    pub expires_at: i64,
}

/// What a live cache entry says about a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cached<V> {
    /// A loaded value.
    Value(V),
    /// The key was looked up and confirmed to have no backing data.
    Absent,
}

impl<V> Cached<V> {
    /// The value, or `None` for a negative entry.
    pub fn into_value(self) -> Option<V> {
        match self {
            Cached::Value(v) => Some(v),
            Cached::Absent => None,
        }
    }
}

/// Type-erased storage entry.
///
/// Stores are type-agnostic: in-memory stores keep `Typed` values without any
/// serialization, persistent stores keep `Serialized` JSON. `Absent` is the
/// negative-cache marker and is understood by every store.
#[derive(Clone)]
pub enum StoredEntry {
    /// For in-memory stores: zero-copy storage of typed values.
    Typed {
        value: Arc<dyn Any + Send + Sync>,
        expires_at: i64,
    },
    /// For persistent stores: serialized JSON of an `Entry<V>`.
    Serialized { data: String, expires_at: i64 },
    /// Confirmed absence of backing data.
    Absent { expires_at: i64 },
}

impl std::fmt::Debug for StoredEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoredEntry::Typed { expires_at, .. } => f
                .debug_struct("Typed")
                .field("expires_at", expires_at)
                .finish_non_exhaustive(),
            StoredEntry::Serialized { data, expires_at } => f
                .debug_struct("Serialized")
                .field("data", data)
                .field("expires_at", expires_at)
                .finish(),
            StoredEntry::Absent { expires_at } => f
                .debug_struct("Absent")
                .field("expires_at", expires_at)
                .finish(),
        }
    }
}

/// Storage mode preference for stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Store prefers typed values (in-memory stores).
    Typed,
    /// Store prefers serialized values (persistent stores).
    Serialized,
}

/// Header shared by every persisted record. Value records carry extra fields
/// which are ignored here.
#[derive(Serialize, Deserialize)]
struct WireHeader {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    absent: bool,
    expires_at: i64,
}

impl<V> Entry<V> {
    /// Create a new cache entry.
    pub fn new(value: V, expires_at: i64) -> Self {
        Entry { value, expires_at }
    }

    /// Check if the entry has expired and should not be used.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }
}

impl StoredEntry {
    /// Create a StoredEntry from a typed value (for in-memory stores).
    pub fn from_typed<V>(value: V, expires_at: i64) -> Self
    where
        V: Send + Sync + 'static,
    {
        StoredEntry::Typed {
            value: Arc::new(value),
            expires_at,
        }
    }

    /// Serialize a value into a StoredEntry (for persistent stores).
    pub fn serialize<V>(value: &V, expires_at: i64) -> Result<Self, CacheError>
    where
        V: Serialize,
    {
        let data = serde_json::to_string(&Entry::new(value, expires_at))
            .map_err(|e| CacheError::Serialization(format!("Serialization failed: {}", e)))?;
        Ok(StoredEntry::Serialized { data, expires_at })
    }

    /// Create the negative-cache marker.
    pub fn absent(expires_at: i64) -> Self {
        StoredEntry::Absent { expires_at }
    }

    /// Build the entry for `value` in the format the given storage mode prefers.
    pub fn for_mode<V>(mode: StorageMode, value: V, expires_at: i64) -> Result<Self, CacheError>
    where
        V: Serialize + Send + Sync + 'static,
    {
        match mode {
            StorageMode::Typed => Ok(StoredEntry::from_typed(value, expires_at)),
            StorageMode::Serialized => StoredEntry::serialize(&value, expires_at),
        }
    }

    /// Decode a persisted record.
    pub fn from_wire(data: String) -> Result<Self, CacheError> {
        let header: WireHeader = serde_json::from_str(&data)
            .map_err(|e| CacheError::Serialization(format!("Invalid cache record: {}", e)))?;
        if header.absent {
            return Ok(StoredEntry::Absent {
                expires_at: header.expires_at,
            });
        }
        Ok(StoredEntry::Serialized {
            data,
            expires_at: header.expires_at,
        })
    }

    /// Encode for a persistent store.
    ///
    /// Typed entries have no serializer attached and cannot be persisted.
    pub fn to_wire(&self) -> Result<String, CacheError> {
        match self {
            StoredEntry::Serialized { data, .. } => Ok(data.clone()),
            StoredEntry::Absent { expires_at } => serde_json::to_string(&WireHeader {
                absent: true,
                expires_at: *expires_at,
            })
            .map_err(|e| CacheError::Serialization(format!("Serialization failed: {}", e))),
            StoredEntry::Typed { .. } => Err(CacheError::Serialization(
                "Cannot persist a typed entry".to_string(),
            )),
        }
    }

    /// Convert StoredEntry to a typed view.
    ///
    /// - `Typed`: downcasts the Arc value to V and clones it
    /// - `Serialized`: deserializes the JSON string to V
    /// - `Absent`: no value to convert
    pub fn into_typed<V>(self) -> Result<Cached<V>, CacheError>
    where
        V: Clone + for<'de> Deserialize<'de> + Send + Sync + 'static,
    {
        match self {
            StoredEntry::Typed { value, .. } => {
                let typed_arc = value
                    .downcast::<V>()
                    .map_err(|_| CacheError::Serialization("Type downcast failed".to_string()))?;
                Ok(Cached::Value((*typed_arc).clone()))
            }
            StoredEntry::Serialized { data, .. } => {
                let entry: Entry<V> = serde_json::from_str(&data).map_err(|e| {
                    CacheError::Serialization(format!("Deserialization failed: {}", e))
                })?;
                Ok(Cached::Value(entry.value))
            }
            StoredEntry::Absent { .. } => Ok(Cached::Absent),
        }
    }

    /// Get the expires_at timestamp.
    pub fn expires_at(&self) -> i64 {
        match self {
            StoredEntry::Typed { expires_at, .. } => *expires_at,
            StoredEntry::Serialized { expires_at, .. } => *expires_at,
            StoredEntry::Absent { expires_at } => *expires_at,
        }
    }

    /// Whether this is the negative-cache marker.
    pub fn is_absent(&self) -> bool {
        matches!(self, StoredEntry::Absent { .. })
    }

    /// Check if the entry has expired and should not be used.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at()
    }
}
