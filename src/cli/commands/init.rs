//! `pass init` — create a new vault.

use rand::seq::index::sample;
use zeroize::Zeroizing;

use crate::cli::{output, prompt_new_password, show_warnings, vault_file_path, Cli};
use crate::config::Settings;
use crate::errors::{PassCliError, Result};
use crate::vault::{InitOptions, VaultService};

/// Execute the `init` command.
pub fn execute(
    cli: &Cli,
    recovery: bool,
    passphrase: bool,
    no_audit: bool,
    cache_password: bool,
    kdf: Option<&str>,
) -> Result<()> {
    let path = vault_file_path(cli)?;
    if path.exists() {
        output::tip("Use `pass add` to store credentials in the existing vault.");
        return Err(PassCliError::VaultAlreadyExists(path));
    }

    let cwd = std::env::current_dir()?;
    let mut settings = Settings::load(&cwd)?;
    if let Some(algorithm) = kdf {
        settings.kdf_algorithm = algorithm.to_string();
    }

    let password = prompt_new_password()?;

    let recovery_passphrase = if passphrase {
        let value = dialoguer::Password::new()
            .with_prompt("Choose recovery passphrase")
            .with_confirmation("Confirm recovery passphrase", "Passphrases do not match")
            .interact()
            .map_err(|e| PassCliError::CommandFailed(format!("passphrase prompt: {e}")))?;
        Some(Zeroizing::new(value))
    } else {
        None
    };

    let options = InitOptions {
        kdf: settings.kdf_params()?,
        audit: settings.audit_enabled && !no_audit,
        audit_log_path: Some(settings.audit_log_path(path.parent().unwrap_or(&cwd))),
        recovery,
        passphrase: recovery_passphrase,
        cache_password,
    };

    let mut service = VaultService::new(path);
    let mnemonic = service.init(&password, &options)?;
    show_warnings(&mut service);

    output::success(&format!(
        "Vault created at {}",
        service.vault_path().display()
    ));

    if let Some(mnemonic) = mnemonic {
        output::print_mnemonic(&mnemonic);
        verify_mnemonic_backup(&mnemonic)?;
    }

    output::tip("Run `pass add <service> --username <user>` to add a credential.");
    Ok(())
}

/// Spot-check that the user actually wrote the mnemonic down by
/// asking for three random positions. Mismatches allow a retry or an
/// explicit skip with a warning.
fn verify_mnemonic_backup(mnemonic: &str) -> Result<()> {
    let words: Vec<&str> = mnemonic.split(' ').collect();

    loop {
        let positions = sample(&mut rand::rng(), words.len(), 3);
        let mut all_correct = true;

        for position in positions.iter() {
            let answer: String = dialoguer::Input::new()
                .with_prompt(format!("Word #{}", position + 1))
                .interact_text()
                .map_err(|e| PassCliError::CommandFailed(format!("word prompt: {e}")))?;
            if answer.trim() != words[position] {
                all_correct = false;
            }
        }

        if all_correct {
            output::success("Mnemonic backup verified.");
            return Ok(());
        }

        output::warning("One or more words did not match.");
        let retry = dialoguer::Confirm::new()
            .with_prompt("Try the verification again?")
            .default(true)
            .interact()
            .map_err(|e| PassCliError::CommandFailed(format!("confirmation: {e}")))?;
        if !retry {
            output::warning("Backup not verified — make sure the words are written down.");
            return Ok(());
        }
    }
}
