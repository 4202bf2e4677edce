//! `pass get` — retrieve a single credential.

use crate::cli::{open_unlocked, show_warnings, Cli};
use crate::errors::Result;

/// Execute the `get` command.
pub fn execute(cli: &Cli, service_name: &str, show: bool) -> Result<()> {
    let mut service = open_unlocked(cli)?;
    let credential = service.get(service_name)?;

    println!("Service:  {}", credential.service);
    println!("Username: {}", credential.username);
    if show {
        println!("Password: {}", credential.password);
    } else {
        println!("Password: ******** (use --show to reveal)");
    }
    if let Some(url) = &credential.url {
        println!("URL:      {url}");
    }
    if let Some(category) = &credential.category {
        println!("Category: {category}");
    }
    if let Some(notes) = &credential.notes {
        println!("Notes:    {notes}");
    }

    service.lock()?;
    show_warnings(&mut service);
    Ok(())
}
