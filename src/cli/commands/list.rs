//! `pass list` — list all credentials.

use crate::cli::{open_unlocked, output, show_warnings, Cli};
use crate::errors::Result;

/// Execute the `list` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let mut service = open_unlocked(cli)?;
    let summaries = service.list()?;
    output::print_credentials_table(&summaries);
    service.lock()?;
    show_warnings(&mut service);
    Ok(())
}
