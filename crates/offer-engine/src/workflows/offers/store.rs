use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::audit::AuditEntry;
use super::decision::SellerDecision;
use super::domain::{Offer, OfferVersion, Property};
use super::integration::ContractPush;
use super::scoring::OfferScore;

/// One collection per entity kind; records are addressed by their own identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Property,
    Offer,
    OfferVersion,
    OfferScore,
    SellerDecision,
    AuditLog,
    ContractPush,
}

impl RecordKind {
    pub const ALL: [RecordKind; 7] = [
        Self::Property,
        Self::Offer,
        Self::OfferVersion,
        Self::OfferScore,
        Self::SellerDecision,
        Self::AuditLog,
        Self::ContractPush,
    ];

    pub const fn collection(self) -> &'static str {
        match self {
            Self::Property => "properties",
            Self::Offer => "offers",
            Self::OfferVersion => "offer_versions",
            Self::OfferScore => "offer_scores",
            Self::SellerDecision => "seller_decisions",
            Self::AuditLog => "audit_logs",
            Self::ContractPush => "contract_pushes",
        }
    }
}

/// A typed record that lives in exactly one collection.
pub trait Record: Serialize + DeserializeOwned {
    const KIND: RecordKind;

    fn record_id(&self) -> &str;
}

/// Key-addressable persistence. Last write wins; callers serialize access themselves.
pub trait RecordStore: Send + Sync {
    fn get_raw(&self, kind: RecordKind, id: &str) -> Result<Option<Value>, StoreError>;
    fn list_raw(&self, kind: RecordKind) -> Result<Vec<Value>, StoreError>;
    fn upsert_raw(&self, kind: RecordKind, id: &str, record: Value) -> Result<(), StoreError>;
}

/// Typed helpers layered over the raw store contract.
pub trait RecordStoreExt: RecordStore {
    fn get<R: Record>(&self, id: &str) -> Result<Option<R>, StoreError> {
        self.get_raw(R::KIND, id)?
            .map(|value| decode::<R>(id, value))
            .transpose()
    }

    fn list<R: Record>(&self, predicate: impl Fn(&R) -> bool) -> Result<Vec<R>, StoreError> {
        let mut records = Vec::new();
        for value in self.list_raw(R::KIND)? {
            let record: R = serde_json::from_value(value).map_err(|source| StoreError::Corrupt {
                kind: R::KIND,
                id: None,
                message: source.to_string(),
            })?;
            if predicate(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn upsert<R: Record>(&self, record: &R) -> Result<(), StoreError> {
        let value = serde_json::to_value(record).map_err(|source| StoreError::Corrupt {
            kind: R::KIND,
            id: Some(record.record_id().to_string()),
            message: source.to_string(),
        })?;
        self.upsert_raw(R::KIND, record.record_id(), value)
    }
}

impl<S: RecordStore + ?Sized> RecordStoreExt for S {}

fn decode<R: Record>(id: &str, value: Value) -> Result<R, StoreError> {
    serde_json::from_value(value).map_err(|source| StoreError::Corrupt {
        kind: R::KIND,
        id: Some(id.to_string()),
        message: source.to_string(),
    })
}

/// Error enumeration for record store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind:?} record {id} already exists and is append-only")]
    Conflict { kind: RecordKind, id: String },
    #[error("{kind:?} record {} could not be decoded: {message}", .id.as_deref().unwrap_or("<unknown>"))]
    Corrupt {
        kind: RecordKind,
        id: Option<String>,
        message: String,
    },
    #[error("record store io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

impl Record for Property {
    const KIND: RecordKind = RecordKind::Property;

    fn record_id(&self) -> &str {
        self.property_id.as_str()
    }
}

impl Record for Offer {
    const KIND: RecordKind = RecordKind::Offer;

    fn record_id(&self) -> &str {
        self.offer_id.as_str()
    }
}

impl Record for OfferVersion {
    const KIND: RecordKind = RecordKind::OfferVersion;

    fn record_id(&self) -> &str {
        self.version_id.as_str()
    }
}

impl Record for OfferScore {
    const KIND: RecordKind = RecordKind::OfferScore;

    fn record_id(&self) -> &str {
        self.offer_id.as_str()
    }
}

impl Record for SellerDecision {
    const KIND: RecordKind = RecordKind::SellerDecision;

    fn record_id(&self) -> &str {
        &self.decision_id
    }
}

impl Record for AuditEntry {
    const KIND: RecordKind = RecordKind::AuditLog;

    fn record_id(&self) -> &str {
        &self.audit_id
    }
}

impl Record for ContractPush {
    const KIND: RecordKind = RecordKind::ContractPush;

    fn record_id(&self) -> &str {
        &self.push_id
    }
}

type Collections = HashMap<RecordKind, BTreeMap<String, Value>>;

/// Process-local store. Lists come back in identifier order.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    collections: Mutex<Collections>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_collections<T>(
        &self,
        f: impl FnOnce(&mut Collections) -> T,
    ) -> Result<T, StoreError> {
        let mut guard = self
            .collections
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store mutex poisoned".to_string()))?;
        Ok(f(&mut guard))
    }
}

impl RecordStore for MemoryRecordStore {
    fn get_raw(&self, kind: RecordKind, id: &str) -> Result<Option<Value>, StoreError> {
        self.with_collections(|collections| {
            collections
                .get(&kind)
                .and_then(|records| records.get(id))
                .cloned()
        })
    }

    fn list_raw(&self, kind: RecordKind) -> Result<Vec<Value>, StoreError> {
        self.with_collections(|collections| {
            collections
                .get(&kind)
                .map(|records| records.values().cloned().collect())
                .unwrap_or_default()
        })
    }

    fn upsert_raw(&self, kind: RecordKind, id: &str, record: Value) -> Result<(), StoreError> {
        self.with_collections(|collections| {
            collections
                .entry(kind)
                .or_default()
                .insert(id.to_string(), record);
        })
    }
}
