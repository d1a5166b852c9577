//! Keyward CLI - manage an encrypted vault from the terminal
//!
//! Every invocation logs in, opens the vault with the master password, runs
//! one command and logs out. Nothing decrypted outlives the process.

use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use vault_core::{
    ActionLog, AuthClient, BackupId, Clipboard, ClipboardGuard, FileVaultStore, RestoreRequest,
    SecretString, SessionConfig, SessionGuard, SettingsManager,
};

mod system_clipboard;

use system_clipboard::SystemClipboard;

/// Keyward - zero-knowledge password vault
#[derive(Parser, Debug)]
#[command(name = "keyward")]
#[command(version)]
#[command(about = "Keyward - zero-knowledge password vault")]
struct Args {
    /// Account name
    #[arg(long, short, env = "KEYWARD_USER")]
    user: String,

    /// Master password; prompted for when absent
    #[arg(long, env = "KEYWARD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Data directory (defaults to the platform data dir)
    #[arg(long, env = "KEYWARD_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the account
    Register,
    /// List item titles
    List,
    /// Add an item; the secret is prompted for
    Add { title: String },
    /// Replace an item's secret
    Edit { title: String },
    /// Delete an item
    Delete { title: String },
    /// Print an item's secret
    Show { title: String },
    /// Copy an item's secret to the clipboard and clear it after the window
    Copy { title: String },
    /// Manage backups
    #[command(subcommand)]
    Backup(BackupCommand),
    /// Inspect the action log
    #[command(subcommand)]
    Log(LogCommand),
    /// Change settings
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Subcommand, Debug)]
enum BackupCommand {
    Create,
    List,
    /// Replace the vault with a backup
    Restore {
        name: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum LogCommand {
    Show,
    Clear,
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    /// Set the auto-lock timeout in minutes (1-60)
    AutoLock { minutes: u32 },
    /// Set how many seconds a copied secret stays on the clipboard
    Clipboard { seconds: u64 },
}

fn confirm(prompt: &str) -> io::Result<bool> {
    eprint!("{} [y/N] ", prompt);
    io::stderr().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

/// Copy `secret` and keep the process alive until the clipboard is cleared
async fn copy_until_cleared(
    secret: &SecretString,
    window: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let clipboard = Arc::new(SystemClipboard::new()?);
    let guard = ClipboardGuard::new(clipboard.clone(), window);

    guard.copy(secret)?;
    eprintln!(
        "Copied to clipboard, clearing in {} seconds (Ctrl-C clears now)",
        window.as_secs()
    );

    tokio::select! {
        _ = guard.wait_cleared() => {}
        _ = tokio::signal::ctrl_c() => {
            guard.cancel();
            clipboard.write_text("")?;
        }
    }
    eprintln!("Clipboard cleared");
    Ok(())
}

fn master_password(args: &Args) -> io::Result<String> {
    match &args.password {
        Some(password) => Ok(password.clone()),
        None => rpassword::prompt_password("Master password: "),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let data_dir = match &args.data_dir {
        Some(dir) => dir.clone(),
        None => FileVaultStore::default_dir()?,
    };
    let store = Arc::new(
        FileVaultStore::with_dir(data_dir.clone())
            .map_err(|e| format!("Failed to open data directory: {}", e))?,
    );
    let action_log = Arc::new(ActionLog::new(data_dir.join("logs")));
    let mut settings = SettingsManager::new(&data_dir);

    // Commands that need no vault
    match &args.command {
        Command::Settings(SettingsCommand::AutoLock { minutes }) => {
            let applied = settings.set_auto_lock_timeout(*minutes).await?;
            println!("Auto-lock timeout set to {} minutes", applied);
            return Ok(());
        }
        Command::Settings(SettingsCommand::Clipboard { seconds }) => {
            settings.set_clipboard_clear_seconds(*seconds).await?;
            println!(
                "Clipboard clears after {} seconds",
                settings.get().clipboard_window().as_secs()
            );
            return Ok(());
        }
        Command::Log(LogCommand::Show) => {
            for entry in action_log.list(&args.user).await? {
                println!("{}  {}", entry.timestamp.to_rfc3339(), entry.action);
            }
            return Ok(());
        }
        Command::Log(LogCommand::Clear) => {
            action_log.clear(&args.user).await?;
            println!("Action log cleared");
            return Ok(());
        }
        _ => {}
    }

    let password = master_password(&args)?;
    let auth = AuthClient::new(store.clone(), Default::default()).with_action_log(action_log.clone());

    if let Command::Register = args.command {
        auth.register(&args.user, &password).await?;
        println!("Account {} created", args.user);
        return Ok(());
    }

    let token = auth.login(&args.user, &password).await?;
    let config = SessionConfig::from_settings(settings.get());
    let session = SessionGuard::open(store, action_log, config, &args.user, token, &password).await?;
    info!("Session {} open", session.session_id());

    let clipboard_window = settings.get().clipboard_window();
    let outcome = run(&session, args.command, &password, clipboard_window).await;
    session.logout().await?;
    outcome
}

async fn run(
    session: &SessionGuard,
    command: Command,
    password: &str,
    clipboard_window: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::List => {
            for item in session.titles().await? {
                println!("{}  {}", item.updated_at.to_rfc3339(), item.title);
            }
        }
        Command::Add { title } => {
            let secret = rpassword::prompt_password(format!("Secret for {}: ", title))?;
            session.add(&title, &secret).await?;
            println!("Added {}", title);
        }
        Command::Edit { title } => {
            let secret = rpassword::prompt_password(format!("New secret for {}: ", title))?;
            session.edit(&title, &secret).await?;
            println!("Updated {}", title);
        }
        Command::Delete { title } => {
            session.delete(&title).await?;
            println!("Deleted {}", title);
        }
        Command::Show { title } => {
            let secret = session.reveal(&title).await?;
            println!("{}", secret.expose());
        }
        Command::Copy { title } => {
            let secret = session.reveal(&title).await?;
            copy_until_cleared(&secret, clipboard_window).await?;
        }
        Command::Backup(BackupCommand::Create) => {
            let id = session.create_backup().await?;
            println!("Created {}", id);
        }
        Command::Backup(BackupCommand::List) => {
            for record in session.list_backups().await? {
                match record.created_at {
                    Some(at) => println!("{}  {}", at.to_rfc3339(), record.id),
                    None => println!("{:25}  {}", "-", record.id),
                }
            }
        }
        Command::Backup(BackupCommand::Restore { name, yes }) => {
            let request = RestoreRequest::new(BackupId::new(name));
            let prompt = format!(
                "Replace the current vault with {}? Items added since will be lost.",
                request.backup()
            );
            if !yes && !confirm(&prompt)? {
                println!("Restore cancelled");
                return Ok(());
            }
            session.restore_backup(request.confirm(), password).await?;
            println!("Vault restored");
        }
        Command::Register | Command::Log(_) | Command::Settings(_) => {}
    }
    Ok(())
}
