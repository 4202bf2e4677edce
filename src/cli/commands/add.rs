//! `pass add` — store a new credential.

use crate::cli::{open_unlocked, output, show_warnings, Cli};
use crate::errors::{PassCliError, Result};
use crate::vault::Credential;

/// Execute the `add` command.
pub fn execute(
    cli: &Cli,
    service_name: &str,
    username: &str,
    url: Option<&str>,
    category: Option<&str>,
    notes: Option<&str>,
) -> Result<()> {
    let mut service = open_unlocked(cli)?;

    let password = dialoguer::Password::new()
        .with_prompt(format!("Password for {service_name}"))
        .interact()
        .map_err(|e| PassCliError::CommandFailed(format!("password prompt: {e}")))?;

    let mut credential = Credential::new(service_name, username, password);
    credential.url = url.map(str::to_string);
    credential.category = category.map(str::to_string);
    credential.notes = notes.map(str::to_string);

    service.add(credential)?;
    service.lock()?;
    show_warnings(&mut service);

    output::success(&format!("Credential '{service_name}' added."));
    Ok(())
}
