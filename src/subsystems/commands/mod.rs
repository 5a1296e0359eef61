//! Commands subsystem — per-tenant custom command management.
//!
//! The [`CommandRegistry`] owns add/edit/remove/lookup semantics and is the
//! only writer of the [`cache::CommandCache`] and [`store::CommandStore`].
//! Mutations take the tenant's cache slot lock, load through on first
//! access, apply the change to a copy, persist it, and only then commit the
//! copy back to the cache — a failed durable write leaves the cache exactly
//! as it was.

pub mod cache;
pub mod store;

use thiserror::Error;

use crate::error::AppError;
use crate::platform::TenantId;

use cache::CommandCache;
use store::{CommandStore, TenantCommands};

/// Names that can never be used as custom commands.
pub const RESERVED_NAMES: [&str; 4] = ["add", "edit", "remove", "clear"];

/// Recoverable command-store faults, rendered to reply text by the comms
/// router — never a process error.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Empty or reserved command name.
    #[error("invalid command name: {0:?}")]
    InvalidName(String),

    #[error("reply text must not be empty")]
    InvalidReply,

    #[error("unknown command: {0}")]
    NotFound(String),

    /// The durable write or its task join failed; the cache was not touched.
    #[error("store failure: {0}")]
    Store(#[from] AppError),
}

pub struct CommandRegistry {
    store: CommandStore,
    cache: CommandCache,
}

impl CommandRegistry {
    /// The cache starts cold; tenants load on first access.
    pub fn new(store: CommandStore) -> Self {
        Self {
            store,
            cache: CommandCache::new(),
        }
    }

    /// Insert or silently overwrite a command and persist it.
    pub async fn add(
        &self,
        tenant: TenantId,
        name: &str,
        reply: &str,
    ) -> Result<String, CommandError> {
        let name = normalize_name(name)?;
        let reply = non_empty_reply(reply)?;

        let slot = self.cache.slot(tenant);
        let mut guard = slot.lock().await;
        self.cache.populate(tenant, &mut guard, &self.store);

        let mut next = guard.clone().unwrap_or_default();
        next.insert(name.clone(), reply.clone());
        self.persist(tenant, &next).await?;
        *guard = Some(next);

        Ok(format!("Added command \"{name}\" with reply: {reply}"))
    }

    /// Overwrite an existing command's reply and persist it.
    pub async fn edit(
        &self,
        tenant: TenantId,
        name: &str,
        reply: &str,
    ) -> Result<String, CommandError> {
        let name = name.to_lowercase();

        let slot = self.cache.slot(tenant);
        let mut guard = slot.lock().await;
        self.cache.populate(tenant, &mut guard, &self.store);

        let current = guard.get_or_insert_with(TenantCommands::new);
        if !current.contains_key(&name) {
            return Err(CommandError::NotFound(name));
        }
        let reply = non_empty_reply(reply)?;

        let mut next = current.clone();
        next.insert(name.clone(), reply.clone());
        self.persist(tenant, &next).await?;
        *guard = Some(next);

        Ok(format!("Updated command \"{name}\" with reply: {reply}"))
    }

    /// Delete an existing command and persist the removal.
    pub async fn remove(&self, tenant: TenantId, name: &str) -> Result<String, CommandError> {
        let name = name.to_lowercase();

        let slot = self.cache.slot(tenant);
        let mut guard = slot.lock().await;
        self.cache.populate(tenant, &mut guard, &self.store);

        let current = guard.get_or_insert_with(TenantCommands::new);
        if !current.contains_key(&name) {
            return Err(CommandError::NotFound(name));
        }

        let mut next = current.clone();
        next.remove(&name);
        self.persist(tenant, &next).await?;
        *guard = Some(next);

        Ok(format!("Removed command \"{name}\""))
    }

    /// Case-insensitive read. `None` means the caller decides how to phrase
    /// "no such command".
    pub async fn lookup(&self, tenant: TenantId, name: &str) -> Option<String> {
        let name = name.to_lowercase();
        let slot = self.cache.slot(tenant);
        let mut guard = slot.lock().await;
        self.cache.populate(tenant, &mut guard, &self.store);
        guard.as_ref().and_then(|commands| commands.get(&name).cloned())
    }

    /// All command names of a tenant, sorted. Enumeration order is not part
    /// of the durable contract; sorting just keeps help output stable.
    pub async fn list(&self, tenant: TenantId) -> Vec<String> {
        let slot = self.cache.slot(tenant);
        let mut guard = slot.lock().await;
        self.cache.populate(tenant, &mut guard, &self.store);
        let mut names: Vec<String> = guard
            .as_ref()
            .map(|commands| commands.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Durable write on the blocking pool, in the same shape the session
    /// stores are driven elsewhere: clone what the closure needs, join, and
    /// surface either failure as a store fault.
    async fn persist(&self, tenant: TenantId, next: &TenantCommands) -> Result<(), CommandError> {
        let store = self.store.clone();
        let snapshot = next.clone();
        tokio::task::spawn_blocking(move || store.write(tenant, &snapshot))
            .await
            .map_err(|e| AppError::Store(format!("write join: {e}")))?
            .map_err(CommandError::Store)
    }
}

fn normalize_name(name: &str) -> Result<String, CommandError> {
    let name = name.to_lowercase();
    if name.is_empty() || RESERVED_NAMES.contains(&name.as_str()) {
        return Err(CommandError::InvalidName(name));
    }
    Ok(name)
}

fn non_empty_reply(reply: &str) -> Result<String, CommandError> {
    let reply = reply.trim();
    if reply.is_empty() {
        return Err(CommandError::InvalidReply);
    }
    Ok(reply.to_string())
}
