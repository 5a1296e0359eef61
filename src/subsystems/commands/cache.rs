//! In-memory mirror of the per-tenant command records.
//!
//! The cache hands out one slot per tenant; a slot holds
//! `Option<TenantCommands>` where `None` means "never loaded" — distinct
//! from a tenant whose record loaded empty. Holding a slot's async lock
//! across a read-modify-write serialises writers per tenant while leaving
//! other tenants untouched.
//!
//! There is no eviction: the map lives for the process lifetime and its
//! cardinality is bounded by the number of tenants, not message volume.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::platform::TenantId;

use super::store::{CommandStore, TenantCommands};

/// One tenant's cached command set. `None` until first populated.
pub type CacheSlot = Arc<tokio::sync::Mutex<Option<TenantCommands>>>;

#[derive(Default)]
pub struct CommandCache {
    // Outer lock guards only the slot map; per-tenant work happens under
    // the slot's own async mutex.
    slots: Mutex<HashMap<TenantId, CacheSlot>>,
}

impl CommandCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot for `tenant`, creating an unpopulated one on first access.
    pub fn slot(&self, tenant: TenantId) -> CacheSlot {
        let mut slots = self.slots.lock().expect("cache mutex poisoned");
        slots.entry(tenant).or_default().clone()
    }

    /// Populate a held slot from the durable store if it has never loaded.
    ///
    /// A missing record and a failed read both resolve to an empty set: a
    /// tenant without a record simply has no commands yet, and a corrupt
    /// record must not take the tenant down with it (it is logged and the
    /// next acknowledged write replaces it).
    pub fn populate(
        &self,
        tenant: TenantId,
        slot_guard: &mut Option<TenantCommands>,
        store: &CommandStore,
    ) {
        if slot_guard.is_some() {
            return;
        }
        let loaded = match store.read(tenant) {
            Ok(Some(commands)) => commands,
            Ok(None) => TenantCommands::new(),
            Err(e) => {
                warn!(%tenant, error = %e, "command record load failed, starting empty");
                TenantCommands::new()
            }
        };
        *slot_guard = Some(loaded);
    }
}
