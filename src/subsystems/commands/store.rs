//! Durable command records — one JSON file per tenant.
//!
//! Layout under the configured data dir:
//!
//! ```text
//! {data_dir}/
//! └── tenants/
//!     └── {tenant_id}.json      — { "commands": { name: reply }, "updated_at": ... }
//! ```
//!
//! Records are self-contained per tenant; there is no cross-tenant
//! transaction. Writes go through a temp file and an atomic rename so a
//! crash mid-write never leaves a truncated record behind.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::platform::TenantId;

/// In-memory command set of one tenant: lowercase name -> reply text.
pub type TenantCommands = HashMap<String, String>;

/// On-disk shape of `tenants/{id}.json`.
#[derive(serde::Serialize, serde::Deserialize)]
struct TenantRecord {
    commands: TenantCommands,
    /// RFC 3339 timestamp of the last successful write.
    updated_at: String,
}

/// Blocking file-backed store. Cloneable so async callers can move a copy
/// into `spawn_blocking`.
#[derive(Debug, Clone)]
pub struct CommandStore {
    tenants_dir: PathBuf,
}

impl CommandStore {
    /// Create or open the store root at `{data_dir}/tenants/`.
    pub fn open(data_dir: &Path) -> Result<Self, AppError> {
        let tenants_dir = data_dir.join("tenants");
        fs::create_dir_all(&tenants_dir)
            .map_err(|e| AppError::Store(format!("cannot create {}: {e}", tenants_dir.display())))?;
        Ok(Self { tenants_dir })
    }

    fn record_path(&self, tenant: TenantId) -> PathBuf {
        self.tenants_dir.join(format!("{tenant}.json"))
    }

    /// Read one tenant's record. `Ok(None)` means no record exists yet,
    /// which callers treat the same as an empty command set.
    pub fn read(&self, tenant: TenantId) -> Result<Option<TenantCommands>, AppError> {
        let path = self.record_path(tenant);
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AppError::Store(format!("cannot read {}: {e}", path.display())));
            }
        };
        let record: TenantRecord = serde_json::from_str(&data)
            .map_err(|e| AppError::Store(format!("malformed {}: {e}", path.display())))?;
        Ok(Some(record.commands))
    }

    /// Replace one tenant's record. The write is acknowledged only once the
    /// renamed file is in place.
    pub fn write(&self, tenant: TenantId, commands: &TenantCommands) -> Result<(), AppError> {
        let record = TenantRecord {
            commands: commands.clone(),
            updated_at: chrono::Utc::now().to_rfc3339(),
        };
        let data = serde_json::to_string_pretty(&record)
            .map_err(|e| AppError::Store(format!("serialise record: {e}")))?;

        let path = self.record_path(tenant);
        let tmp = self.tenants_dir.join(format!("{tenant}.json.tmp"));
        fs::write(&tmp, data)
            .map_err(|e| AppError::Store(format!("cannot write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &path).map_err(|e| {
            AppError::Store(format!("cannot replace {}: {e}", path.display()))
        })
    }
}
