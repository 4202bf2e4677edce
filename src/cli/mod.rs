//! CLI module — Clap argument parser, output helpers, and command implementations.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::Parser;
use zeroize::Zeroizing;

use crate::errors::{PassCliError, Result};
use crate::policy;
use crate::vault::VaultService;

/// pass-cli: local, offline credential vault.
#[derive(Parser)]
#[command(name = "pass", about = "Local offline credential vault", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Vault directory (default: .pass-cli)
    #[arg(long, default_value = ".pass-cli", global = true)]
    pub vault_dir: String,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Initialize a new vault
    Init {
        /// Generate a 24-word recovery mnemonic
        #[arg(long)]
        recovery: bool,

        /// Protect the mnemonic with an additional passphrase
        #[arg(long, requires = "recovery")]
        passphrase: bool,

        /// Disable audit logging
        #[arg(long)]
        no_audit: bool,

        /// Cache the master password in the OS keychain
        #[arg(long)]
        cache_password: bool,

        /// KDF for this vault: pbkdf2-sha256 (default) or argon2id
        #[arg(long)]
        kdf: Option<String>,
    },

    /// Add a credential
    Add {
        /// Service name (e.g. github)
        service: String,

        /// Username for the service
        #[arg(short, long)]
        username: String,

        /// Service URL
        #[arg(long)]
        url: Option<String>,

        /// Category label
        #[arg(long)]
        category: Option<String>,

        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// Get a credential
    Get {
        /// Service name
        service: String,

        /// Print the password instead of masking it
        #[arg(long)]
        show: bool,
    },

    /// List all credentials
    List,

    /// Update an existing credential
    Update {
        /// Service name
        service: String,

        #[arg(short, long)]
        username: Option<String>,

        /// Prompt for a new password
        #[arg(short, long)]
        password: bool,

        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Delete a credential
    Delete {
        /// Service name
        service: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Change the vault's master password
    ChangePassword {
        /// Recover with 6 mnemonic words instead of the old password
        #[arg(long)]
        recover: bool,
    },

    /// Delete the vault, its backup, and its keychain entries
    Remove {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Show or verify the audit log
    Audit {
        /// Verify every entry's HMAC signature
        #[arg(long)]
        verify: bool,

        /// Number of entries to show (default: 50)
        #[arg(long, default_value = "50")]
        last: usize,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for (bash, zsh, fish, powershell)
        shell: String,
    },
}

// ---------------------------------------------------------------------------
// Shared helpers used by multiple commands
// ---------------------------------------------------------------------------

/// Build the full path to the vault file from the CLI arguments.
///
/// Example: `<cwd>/.pass-cli/vault.enc`
pub fn vault_file_path(cli: &Cli) -> Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(&cli.vault_dir).join("vault.enc"))
}

/// Get the master password, trying in order:
/// 1. `PASS_CLI_PASSWORD` env var (CI/CD)
/// 2. OS keychain cache for this vault
/// 3. Interactive prompt
///
/// Returns `Zeroizing<String>` so the password is wiped on drop.
pub fn prompt_password(service: &VaultService) -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var("PASS_CLI_PASSWORD") {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }

    if let Some(cached) = service.cached_password() {
        return Ok(cached);
    }

    let pw = dialoguer::Password::new()
        .with_prompt("Enter master password")
        .interact()
        .map_err(|e| PassCliError::CommandFailed(format!("password prompt: {e}")))?;
    Ok(Zeroizing::new(pw))
}

/// Prompt for a new master password with confirmation, looping until
/// the structural policy is satisfied.
///
/// Also respects `PASS_CLI_PASSWORD` for scripted/CI usage — in that
/// case the policy failure is an error instead of a retry.
pub fn prompt_new_password() -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var("PASS_CLI_PASSWORD") {
        if !pw.is_empty() {
            policy::validate(&pw)?;
            return Ok(Zeroizing::new(pw));
        }
    }

    loop {
        let password = dialoguer::Password::new()
            .with_prompt("Choose master password")
            .with_confirmation("Confirm master password", "Passwords do not match, try again")
            .interact()
            .map_err(|e| PassCliError::CommandFailed(format!("password prompt: {e}")))?;

        match policy::validate(&password) {
            Ok(()) => {
                if policy::strength(&password) != policy::Strength::Strong {
                    output::tip("Tip: 16+ characters with all four classes rates as strong.");
                }
                return Ok(Zeroizing::new(password));
            }
            Err(e) => {
                output::warning(&e.to_string());
                continue;
            }
        }
    }
}

/// Unlock the vault, offering a backup restore when the live file is
/// missing but a backup generation exists.
pub fn open_unlocked(cli: &Cli) -> Result<VaultService> {
    let path = vault_file_path(cli)?;
    let mut service = VaultService::new(path);
    let password = prompt_password(&service)?;

    match service.unlock(&password) {
        Ok(()) => {}
        Err(PassCliError::BackupAvailable(backup)) => {
            output::warning(&format!(
                "Vault file is missing but a backup exists at {}",
                backup.display()
            ));
            let restore = dialoguer::Confirm::new()
                .with_prompt("Restore the backup?")
                .default(true)
                .interact()
                .map_err(|e| PassCliError::CommandFailed(format!("confirmation: {e}")))?;
            if !restore {
                return Err(PassCliError::UserCancelled);
            }
            crate::vault::storage::restore_backup(service.vault_path())?;
            service.unlock(&password)?;
            output::success("Vault restored from backup.");
        }
        Err(e) => return Err(e),
    }

    show_warnings(&mut service);
    Ok(service)
}

/// Print any non-fatal warnings the engine accumulated.
pub fn show_warnings(service: &mut VaultService) {
    for warning in service.take_warnings() {
        output::warning(&warning);
    }
}
