//! `pass update` — modify an existing credential.

use crate::cli::{open_unlocked, output, show_warnings, Cli};
use crate::errors::{PassCliError, Result};
use crate::vault::CredentialUpdate;

/// Execute the `update` command.
#[allow(clippy::too_many_arguments)]
pub fn execute(
    cli: &Cli,
    service_name: &str,
    username: Option<&str>,
    change_password: bool,
    url: Option<&str>,
    category: Option<&str>,
    notes: Option<&str>,
) -> Result<()> {
    let password = if change_password {
        let value = dialoguer::Password::new()
            .with_prompt(format!("New password for {service_name}"))
            .interact()
            .map_err(|e| PassCliError::CommandFailed(format!("password prompt: {e}")))?;
        Some(value)
    } else {
        None
    };

    let update = CredentialUpdate {
        username: username.map(str::to_string),
        password,
        url: url.map(str::to_string),
        category: category.map(str::to_string),
        notes: notes.map(str::to_string),
        totp_secret: None,
    };

    let mut service = open_unlocked(cli)?;
    service.update(service_name, update)?;
    service.lock()?;
    show_warnings(&mut service);

    output::success(&format!("Credential '{service_name}' updated."));
    Ok(())
}
