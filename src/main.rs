use clap::Parser;
use pass_cli::cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init {
            recovery,
            passphrase,
            no_audit,
            cache_password,
            ref kdf,
        } => pass_cli::cli::commands::init::execute(
            &cli,
            recovery,
            passphrase,
            no_audit,
            cache_password,
            kdf.as_deref(),
        ),
        Commands::Add {
            ref service,
            ref username,
            ref url,
            ref category,
            ref notes,
        } => pass_cli::cli::commands::add::execute(
            &cli,
            service,
            username,
            url.as_deref(),
            category.as_deref(),
            notes.as_deref(),
        ),
        Commands::Get { ref service, show } => {
            pass_cli::cli::commands::get::execute(&cli, service, show)
        }
        Commands::List => pass_cli::cli::commands::list::execute(&cli),
        Commands::Update {
            ref service,
            ref username,
            password,
            ref url,
            ref category,
            ref notes,
        } => pass_cli::cli::commands::update::execute(
            &cli,
            service,
            username.as_deref(),
            password,
            url.as_deref(),
            category.as_deref(),
            notes.as_deref(),
        ),
        Commands::Delete { ref service, force } => {
            pass_cli::cli::commands::delete::execute(&cli, service, force)
        }
        Commands::ChangePassword { recover } => {
            pass_cli::cli::commands::change_password::execute(&cli, recover)
        }
        Commands::Remove { force } => pass_cli::cli::commands::remove::execute(&cli, force),
        Commands::Audit { verify, last } => {
            pass_cli::cli::commands::audit_cmd::execute(&cli, verify, last)
        }
        Commands::Completions { ref shell } => pass_cli::cli::commands::completions::execute(shell),
    };

    if let Err(e) = result {
        pass_cli::cli::output::error(&e.to_string());
        std::process::exit(e.exit_code());
    }
}
