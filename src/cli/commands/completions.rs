//! `pass completions` — generate shell completion scripts.

use clap::CommandFactory;
use clap_complete::{generate, Shell};

use crate::cli::Cli;
use crate::errors::{PassCliError, Result};

/// Execute the `completions` command.
pub fn execute(shell: &str) -> Result<()> {
    let shell: Shell = shell
        .parse()
        .map_err(|_| PassCliError::CommandFailed(format!("unsupported shell '{shell}'")))?;

    let mut command = Cli::command();
    generate(shell, &mut command, "pass", &mut std::io::stdout());
    Ok(())
}
