//! Table provisioning
//!
//! One-shot administrative step run before a durable-backed deployment
//! first starts. Never called from the map hot path.

use tracing::{info, warn};

use crate::domain::ports::{TableAdmin, TableSpec};
use crate::error::Result;

/// What `provision_table` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Created,
    AlreadyExists,
}

/// Create the durable table described by `spec` unless it already exists.
///
/// Idempotent: an existing table is left untouched and only a warning is
/// logged.
pub async fn provision_table(admin: &dyn TableAdmin, spec: &TableSpec) -> Result<ProvisionOutcome> {
    if admin.table_exists(&spec.name).await? {
        warn!(table = %spec.name, "Table already exists, nothing to do");
        return Ok(ProvisionOutcome::AlreadyExists);
    }

    admin.create_table(spec).await?;
    info!(
        table = %spec.name,
        hash_key = %spec.hash_key_name,
        range_key = %spec.range_key_name,
        "Provisioned table"
    );
    Ok(ProvisionOutcome::Created)
}
