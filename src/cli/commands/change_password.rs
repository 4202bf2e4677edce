//! `pass change-password` — rotate the master password, optionally
//! recovering with mnemonic challenge words.

use crate::cli::{open_unlocked, output, prompt_new_password, show_warnings, vault_file_path, Cli};
use crate::errors::{PassCliError, Result};
use crate::recovery;
use crate::vault::{storage, VaultService};

/// Execute the `change-password` command.
pub fn execute(cli: &Cli, recover: bool) -> Result<()> {
    if recover {
        return execute_recovery(cli);
    }

    let mut service = open_unlocked(cli)?;
    let new_password = prompt_new_password()?;

    let mnemonic = service.change_password(&new_password)?;
    service.lock()?;
    show_warnings(&mut service);

    output::success("Master password changed.");
    if let Some(mnemonic) = mnemonic {
        output::info("The vault format was upgraded; the old recovery words no longer work.");
        output::print_mnemonic(&mnemonic);
    }
    Ok(())
}

/// Recovery path: prompt for the 6 challenge words in a shuffled
/// order, then set a new master password.
fn execute_recovery(cli: &Cli) -> Result<()> {
    let path = vault_file_path(cli)?;
    let mut service = VaultService::new(path);

    // Read the challenge straight from the envelope header; recovery
    // must work without any password.
    let bytes = storage::load(service.vault_path())?;
    let raw = crate::vault::format::parse(&bytes)?;
    let blob = raw
        .header
        .recovery
        .as_ref()
        .ok_or(PassCliError::RecoveryDisabled)?;
    blob.validate()?;

    output::info("Answer with the word at each numbered position of your recovery mnemonic.");

    let order = recovery::shuffled_prompt_order(blob);
    let mut answers: Vec<(u8, String)> = Vec::with_capacity(order.len());
    for position in order {
        let word = loop {
            let answer: String = dialoguer::Input::new()
                .with_prompt(format!("Word #{}", position + 1))
                .interact_text()
                .map_err(|e| PassCliError::CommandFailed(format!("word prompt: {e}")))?;
            let answer = answer.trim().to_lowercase();
            match recovery::validate_word(&answer) {
                Ok(()) => break answer,
                Err(e) => output::warning(&e.to_string()),
            }
        };
        answers.push((position, word));
    }

    // The engine expects the words in ascending-position order.
    answers.sort_by_key(|(position, _)| *position);
    let words: Vec<String> = answers.into_iter().map(|(_, word)| word).collect();

    let passphrase = if blob.passphrase_required {
        let value = dialoguer::Password::new()
            .with_prompt("Recovery passphrase")
            .interact()
            .map_err(|e| PassCliError::CommandFailed(format!("passphrase prompt: {e}")))?;
        Some(value)
    } else {
        None
    };

    let new_password = prompt_new_password()?;
    service.recover(&words, passphrase.as_deref(), &new_password)?;
    service.lock()?;
    show_warnings(&mut service);

    output::success("Vault recovered — master password has been reset.");
    Ok(())
}
