//! `pass audit` — display or verify the audit log.

use crate::audit;
use crate::cli::{output, vault_file_path, Cli};
use crate::errors::{PassCliError, Result};
use crate::vault::{meta, VaultService};

/// Execute the `audit` command.
pub fn execute(cli: &Cli, verify: bool, last: usize) -> Result<()> {
    let path = vault_file_path(cli)?;

    if verify {
        let service = VaultService::new(path);
        let report = service.verify_audit()?;
        output::success(&format!(
            "Audit log verified: {} entries, all signatures valid.",
            report.total
        ));
        return Ok(());
    }

    let metadata = meta::load(&path)?.ok_or_else(|| {
        PassCliError::AuditError("no vault.meta sidecar — audit was never enabled".into())
    })?;
    if !metadata.audit_enabled {
        return Err(PassCliError::AuditError(
            "audit logging is not enabled for this vault".into(),
        ));
    }

    let entries = audit::read_entries(std::path::Path::new(&metadata.audit_log_path), last)?;
    output::print_audit_table(&entries);
    Ok(())
}
