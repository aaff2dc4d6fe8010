use std::cmp::Ordering;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::clock::Clock;
use super::domain::{ActorRole, RequestContext};
use super::ids::{compare_sequence_ids, IdSequence};
use super::store::{RecordKind, RecordStore, RecordStoreExt, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Property,
    Offer,
    OfferScore,
    SellerDecision,
    ContractPush,
}

impl EntityType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Property => "property",
            Self::Offer => "offer",
            Self::OfferScore => "offer_score",
            Self::SellerDecision => "seller_decision",
            Self::ContractPush => "contract_push",
        }
    }
}

/// Immutable record of one state-changing action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub audit_id: String,
    pub actor_user_id: String,
    pub actor_role: ActorRole,
    pub action: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub metadata: Value,
    pub ip_address: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn order_key(&self) -> AuditOrder<'_> {
        AuditOrder {
            created_at: self.created_at,
            audit_id: &self.audit_id,
        }
    }
}

/// Total order over audit entries: timestamp, then identifier sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditOrder<'a> {
    created_at: DateTime<Utc>,
    audit_id: &'a str,
}

impl Ord for AuditOrder<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| compare_sequence_ids(self.audit_id, other.audit_id))
    }
}

impl PartialOrd for AuditOrder<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Filter for the audit query surface. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditQuery {
    #[serde(default)]
    pub actor_user_id: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub entity_type: Option<EntityType>,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}

impl AuditQuery {
    pub fn for_entity(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: Some(entity_type),
            entity_id: Some(entity_id.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.actor_user_id
            .as_deref()
            .map_or(true, |actor| entry.actor_user_id == actor)
            && self
                .action
                .as_deref()
                .map_or(true, |action| entry.action == action)
            && self
                .entity_type
                .map_or(true, |entity_type| entry.entity_type == entity_type)
            && self
                .entity_id
                .as_deref()
                .map_or(true, |entity_id| entry.entity_id == entity_id)
            && self.from.map_or(true, |from| entry.created_at >= from)
            && self.to.map_or(true, |to| entry.created_at <= to)
    }
}

/// Append-only writer and reader over the `audit_logs` collection.
pub struct AuditTrail<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    sequence: IdSequence,
    last_written: Mutex<Option<DateTime<Utc>>>,
}

impl<S: RecordStore> AuditTrail<S> {
    pub fn open(store: Arc<S>, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let existing = store.list::<AuditEntry>(|_| true)?;
        let sequence = IdSequence::resume(
            "AUD",
            existing.iter().map(|entry| entry.audit_id.as_str()),
        );
        let last_written = existing.iter().map(|entry| entry.created_at).max();

        Ok(Self {
            store,
            clock,
            sequence,
            last_written: Mutex::new(last_written),
        })
    }

    /// Append one entry. Identifier and timestamp are assigned under the append
    /// lock so both orders agree.
    pub fn record(
        &self,
        context: &RequestContext,
        action: &str,
        entity_type: EntityType,
        entity_id: &str,
        metadata: Value,
    ) -> Result<AuditEntry, StoreError> {
        let mut last_written = self
            .last_written
            .lock()
            .map_err(|_| StoreError::Unavailable("audit append lock poisoned".to_string()))?;

        let now = self.clock.now();
        let created_at = last_written.map_or(now, |last| last.max(now));
        let audit_id = self.sequence.next_id();

        if self.store.get_raw(RecordKind::AuditLog, &audit_id)?.is_some() {
            return Err(StoreError::Conflict {
                kind: RecordKind::AuditLog,
                id: audit_id,
            });
        }

        let entry = AuditEntry {
            audit_id,
            actor_user_id: context.actor.user_id.clone(),
            actor_role: context.actor.role,
            action: action.to_string(),
            entity_type,
            entity_id: entity_id.to_string(),
            metadata,
            ip_address: context.ip_address.clone(),
            created_at,
        };
        self.store.upsert(&entry)?;
        *last_written = Some(created_at);
        Ok(entry)
    }

    pub fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, StoreError> {
        let mut entries = self.store.list::<AuditEntry>(|entry| query.matches(entry))?;
        entries.sort_by(|left, right| left.order_key().cmp(&right.order_key()));
        Ok(entries)
    }
}
