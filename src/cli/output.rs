//! Colored terminal output helpers.
//!
//! All user-facing output goes through these functions so we get
//! consistent styling across every command.

use comfy_table::{ContentArrangement, Table};
use console::style;

use crate::audit::AuditEntry;
use crate::vault::CredentialSummary;

/// Print a green success message: "check_mark {msg}"
pub fn success(msg: &str) {
    println!("{} {}", style("\u{2713}").green().bold(), msg);
}

/// Print a red error message: "x_mark {msg}"
pub fn error(msg: &str) {
    eprintln!("{} {}", style("\u{2717}").red().bold(), msg);
}

/// Print a yellow warning: "warning_sign {msg}"
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("\u{26a0}").yellow().bold(), msg);
}

/// Print a blue info message: "info_sign {msg}"
pub fn info(msg: &str) {
    println!("{} {}", style("\u{2139}").blue().bold(), msg);
}

/// Print a dim tip/hint: "arrow {msg}"
pub fn tip(msg: &str) {
    println!("{} {}", style("\u{2192}").dim(), style(msg).dim());
}

/// Print a table of credential summaries.
pub fn print_credentials_table(credentials: &[CredentialSummary]) {
    if credentials.is_empty() {
        info("No credentials in this vault yet.");
        tip("Run `pass add <service> --username <user>` to add your first credential.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Service", "Username", "Category", "Updated"]);

    for c in credentials {
        table.add_row(vec![
            c.service.clone(),
            c.username.clone(),
            c.category.clone().unwrap_or_default(),
            c.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }

    println!("{table}");
}

/// Print a table of audit entries.
pub fn print_audit_table(entries: &[AuditEntry]) {
    if entries.is_empty() {
        info("Audit log is empty.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Timestamp", "Event", "Outcome", "Credential"]);

    for e in entries {
        table.add_row(vec![
            e.timestamp.clone(),
            e.event_type.clone(),
            e.outcome.clone(),
            e.credential_name.clone(),
        ]);
    }

    println!("{table}");
}

/// Display a recovery mnemonic in numbered rows of four words.
pub fn print_mnemonic(mnemonic: &str) {
    println!();
    warning("Write these 24 words down. They are shown exactly once.");
    println!();

    let words: Vec<&str> = mnemonic.split(' ').collect();
    for (row, chunk) in words.chunks(4).enumerate() {
        let cells: Vec<String> = chunk
            .iter()
            .enumerate()
            .map(|(i, w)| format!("{:>2}. {w:<12}", row * 4 + i + 1))
            .collect();
        println!("  {}", cells.join(" "));
    }
    println!();
}
