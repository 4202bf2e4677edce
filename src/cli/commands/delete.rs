//! `pass delete` — remove a credential.

use crate::cli::{open_unlocked, output, show_warnings, Cli};
use crate::errors::{PassCliError, Result};

/// Execute the `delete` command.
pub fn execute(cli: &Cli, service_name: &str, force: bool) -> Result<()> {
    if !force {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!("Delete credential '{service_name}'?"))
            .default(false)
            .interact()
            .map_err(|e| PassCliError::CommandFailed(format!("confirmation: {e}")))?;
        if !confirmed {
            return Err(PassCliError::UserCancelled);
        }
    }

    let mut service = open_unlocked(cli)?;
    service.delete(service_name)?;
    service.lock()?;
    show_warnings(&mut service);

    output::success(&format!("Credential '{service_name}' deleted."));
    Ok(())
}
