//! `pass remove` — delete the vault and everything that belongs to it.

use crate::cli::{open_unlocked, output, show_warnings, Cli};
use crate::errors::{PassCliError, Result};

/// Execute the `remove` command.
pub fn execute(cli: &Cli, force: bool) -> Result<()> {
    if !force {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt("Permanently delete the vault, its backup, and its keychain entries?")
            .default(false)
            .interact()
            .map_err(|e| PassCliError::CommandFailed(format!("confirmation: {e}")))?;
        if !confirmed {
            return Err(PassCliError::UserCancelled);
        }
    }

    let mut service = open_unlocked(cli)?;
    service.remove()?;
    show_warnings(&mut service);

    output::success("Vault removed.");
    Ok(())
}
