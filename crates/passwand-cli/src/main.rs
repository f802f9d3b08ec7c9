#![deny(unsafe_code)]

mod auth;
mod commands;
mod exit_code;

use std::fs::File;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fs2::FileExt;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use passwand_core::{scan, store, WorkFactor};

use crate::commands::{change_main, check, delete, generate, get, list, set, update};

/// Command-line interface for the passwand vault
#[derive(Parser)]
#[command(name = "passwand")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Store a password
    passwand set --space foo.com --key username --value bob

    # Retrieve it (pipe the passphrase from a secret manager)
    PASSWAND_PASSWORD=\"$SECRET\" passwand get --space foo.com --key username

    # Generate and store a fresh password
    passwand generate --space foo.com --key password --length 40

    # Audit stored passwords against a word list
    passwand check --dictionary /usr/share/dict/words
")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to the vault file (default ~/.passwand.json)
    #[arg(long, value_name = "PATH", global = true)]
    data: Option<PathBuf>,

    /// Number of worker threads (default: online CPUs)
    #[arg(long, value_name = "N", global = true)]
    jobs: Option<NonZeroUsize>,

    /// scrypt work factor: base-2 log of the cost parameter
    #[arg(long, value_name = "W", global = true)]
    work_factor: Option<u8>,

    /// Main passphrase (insecure; prefer the interactive prompt)
    #[arg(long, env = "PASSWAND_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Retrieve the value of an entry
    Get(get::Args),

    /// Create a new entry
    Set(set::Args),

    /// Replace the value of an existing entry
    Update(update::Args),

    /// Remove an entry
    Delete(delete::Args),

    /// List every space/key pair
    List(list::Args),

    /// Generate a random value and store it
    Generate(generate::Args),

    /// Re-encrypt every entry under a new main passphrase
    ChangeMain(change_main::Args),

    /// Report weak stored passwords
    Check(check::Args),
}

/// How a command holds the advisory whole-file lock on the vault.
enum Access {
    Shared,
    Exclusive,
}

fn access_for(command: &Commands) -> Access {
    match command {
        Commands::Get(_) | Commands::List(_) | Commands::Check(_) => Access::Shared,
        Commands::Set(_)
        | Commands::Update(_)
        | Commands::Delete(_)
        | Commands::Generate(_)
        | Commands::ChangeMain(_) => Access::Exclusive,
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::from(categorize_error(&error))
        }
    }
}

/// Pick an exit code from the error chain, by type where possible.
fn categorize_error(error: &anyhow::Error) -> u8 {
    for cause in error.chain() {
        if let Some(engine) = cause.downcast_ref::<passwand_core::Error>() {
            return match engine {
                passwand_core::Error::BadMac => exit_code::AUTH_FAILED,
                passwand_core::Error::BadSchema => exit_code::VAULT_INVALID,
                _ => exit_code::GENERAL_ERROR,
            };
        }
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::NotFound {
                return exit_code::NOT_FOUND;
            }
        }
    }
    if format!("{error:#}").contains("not found") {
        return exit_code::NOT_FOUND;
    }
    exit_code::GENERAL_ERROR
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    let data = match cli.data {
        Some(path) => path,
        None => default_data_path()?,
    };
    let jobs = match cli.jobs {
        Some(jobs) => jobs,
        None => std::thread::available_parallelism()
            .context("failed to determine CPU count; pass --jobs")?,
    };
    let work_factor = match cli.work_factor {
        Some(w) => WorkFactor::new(w).context("invalid --work-factor")?,
        None => WorkFactor::default(),
    };

    // held until the process exits, shared or exclusive per command
    let _lock = lock_vault(&data, &access_for(&cli.command))?;

    let mut entries = if data.exists() {
        store::import(&data).context("failed to load database")?
    } else {
        Vec::new()
    };
    // the file does not persist the work factor; entries take the
    // command line's
    for entry in &mut entries {
        entry.work_factor = work_factor;
    }

    match cli.command {
        Commands::Get(args) => {
            let main = auth::obtain(cli.password, false)?;
            let mut op = get::Get::new(args, data);
            scan::scan(&main, &mut entries, jobs, &mut op)
        }
        Commands::Set(args) => {
            let main = auth::obtain(cli.password, true)?;
            let mut op = set::Set::new(
                &main,
                args.space,
                args.key,
                Zeroizing::new(args.value),
                work_factor,
                data,
            );
            scan::scan(&main, &mut entries, jobs, &mut op)
        }
        Commands::Update(args) => {
            let main = auth::obtain(cli.password, true)?;
            let mut op = update::Update::new(&main, args, work_factor, data);
            scan::scan(&main, &mut entries, jobs, &mut op)
        }
        Commands::Delete(args) => {
            let main = auth::obtain(cli.password, false)?;
            let mut op = delete::Delete::new(args, data);
            scan::scan(&main, &mut entries, jobs, &mut op)
        }
        Commands::List(_args) => {
            let main = auth::obtain(cli.password, false)?;
            let mut op = list::List;
            scan::scan(&main, &mut entries, jobs, &mut op)
        }
        Commands::Generate(args) => {
            let main = auth::obtain(cli.password, true)?;
            let value = generate::random_value(args.length.unwrap_or(generate::DEFAULT_LENGTH))?;
            let mut op = set::Set::new(&main, args.space, args.key, value, work_factor, data);
            scan::scan(&main, &mut entries, jobs, &mut op)
        }
        Commands::ChangeMain(args) => {
            let main = auth::obtain(cli.password, false)?;
            let new_main = auth::obtain_new(args.new_password)?;
            let mut op = change_main::ChangeMain::new(&new_main, work_factor, data);
            scan::scan(&main, &mut entries, jobs, &mut op)
        }
        Commands::Check(args) => {
            let main = auth::obtain(cli.password, false)?;
            let mut op = check::Check::new(args);
            scan::scan(&main, &mut entries, jobs, &mut op)
        }
    }
}

/// `$HOME/.passwand.json`.
fn default_data_path() -> Result<PathBuf> {
    let home = std::env::var_os("HOME").context("HOME is not set and --data was not given")?;
    Ok(PathBuf::from(home).join(".passwand.json"))
}

/// Take the advisory lock on the vault file for the duration of the
/// command. A vault that does not exist yet has nothing to lock; exporting
/// will create it.
fn lock_vault(path: &Path, access: &Access) -> Result<Option<File>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(error) => {
            return Err(error)
                .with_context(|| format!("failed to open {}", path.display()));
        }
    };
    match access {
        Access::Shared => file.lock_shared(),
        Access::Exclusive => file.lock_exclusive(),
    }
    .context("failed to lock vault file")?;
    Ok(Some(file))
}

/// Map `-v` counts onto a tracing filter, writing to stderr.
fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(std::io::stderr)
        .init();
}
