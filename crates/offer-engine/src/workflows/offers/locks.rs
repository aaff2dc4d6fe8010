use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::domain::{OfferId, PropertyId};
use super::store::StoreError;

/// Named async locks. Property locks are always taken before offer locks, and
/// several offer locks are always taken in identifier order.
#[derive(Debug, Default)]
pub struct LockTable {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

pub type LockGuard = OwnedMutexGuard<()>;

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: String) -> Result<Arc<AsyncMutex<()>>, StoreError> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| StoreError::Unavailable("lock table poisoned".to_string()))?;
        Ok(slots.entry(key).or_default().clone())
    }

    pub async fn property(&self, property_id: &PropertyId) -> Result<LockGuard, StoreError> {
        let slot = self.slot(format!("property:{property_id}"))?;
        Ok(slot.lock_owned().await)
    }

    pub async fn offer(&self, offer_id: &OfferId) -> Result<LockGuard, StoreError> {
        let slot = self.slot(format!("offer:{offer_id}"))?;
        Ok(slot.lock_owned().await)
    }

    pub async fn push(&self, push_id: &str) -> Result<LockGuard, StoreError> {
        let slot = self.slot(format!("push:{push_id}"))?;
        Ok(slot.lock_owned().await)
    }

    /// Lock every offer in `offer_ids`, sorted and de-duplicated.
    pub async fn offers(&self, offer_ids: &[OfferId]) -> Result<Vec<LockGuard>, StoreError> {
        let mut ordered: Vec<&OfferId> = offer_ids.iter().collect();
        ordered.sort();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for offer_id in ordered {
            guards.push(self.offer(offer_id).await?);
        }
        Ok(guards)
    }
}
