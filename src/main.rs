use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use coffer::vfs::VfsPath;
use coffer::{EntryKind, KdfParams, Storage, VaultError, VaultSession, default_storage, strength};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod auth;

use auth::PasswordInput;

#[derive(Debug, clap::Args)]
struct Argon2Args {
    /// Argon2 memory cost in KiB (default: 524288)
    #[arg(long = "argon-mem")]
    mem_cost_kib: Option<u32>,

    /// Argon2 time cost / iterations (default: 4)
    #[arg(long = "argon-time")]
    time_cost: Option<u32>,

    /// Argon2 parallelism (default: 4)
    #[arg(long = "argon-parallelism")]
    parallelism: Option<u32>,
}

impl Argon2Args {
    fn to_kdf_params(&self) -> Result<KdfParams> {
        let default = KdfParams::default();

        Ok(KdfParams::new(
            self.mem_cost_kib.unwrap_or(default.mem_cost_kib()),
            self.time_cost.unwrap_or(default.time_cost()),
            self.parallelism.unwrap_or(default.parallelism()),
        )?)
    }
}

fn resolve_storage(path: Option<PathBuf>) -> Result<Storage> {
    match path {
        Some(p) => Ok(Storage::new(p)?),
        None => Ok(default_storage()?),
    }
}

#[derive(Debug, Parser)]
#[command(name = "coffer")]
#[command(version, about = "Password-protected encrypted file container.")]
struct Cli {
    /// Path to the vault file
    #[arg(long, global = true, value_name = "PATH", env = "COFFER_VAULT")]
    vault: Option<PathBuf>,

    /// Read the password from the first line of stdin, ignoring COFFER_PASSWORD
    #[arg(long, global = true)]
    password_stdin: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Creates a new, empty vault
    Init {
        #[command(flatten)]
        argon2: Argon2Args,
    },

    /// Copies a file from disk into the vault
    #[command(arg_required_else_help = true)]
    Add {
        file: PathBuf,
        /// Vault directory to add into
        #[arg(long, default_value = "/")]
        to: String,
    },

    /// Creates a directory inside the vault
    #[command(arg_required_else_help = true)]
    Mkdir { path: String },

    /// Lists a vault directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
        /// Show kind, size and modification time
        #[arg(short, long, default_value_t = false)]
        long: bool,
        /// Print entries as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Extracts a file; writes to stdout unless --out is given
    #[command(arg_required_else_help = true)]
    Extract {
        path: String,
        /// Host directory to write the file into
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },

    /// Removes a file or directory (with its contents)
    #[command(arg_required_else_help = true)]
    Rm { path: String },

    /// Shows information about the vault
    Info,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

fn open(vault: Option<PathBuf>, input: PasswordInput) -> Result<VaultSession> {
    let storage = resolve_storage(vault)?;
    let password = input.unlock()?;
    Ok(VaultSession::open(storage, password)?)
}

fn split_parent(path: &str) -> Result<(String, String)> {
    let parsed = VfsPath::parse(path)?;
    match (parsed.parent(), parsed.name()) {
        (Some(parent), Some(name)) => Ok((parent.to_string(), name.to_string())),
        _ => bail!("'{path}' does not name an entry"),
    }
}

fn run(cli: Cli) -> Result<()> {
    let input = PasswordInput::new(cli.password_stdin);

    match cli.command {
        Commands::Init { argon2 } => {
            let kdf = argon2.to_kdf_params()?;
            let storage = resolve_storage(cli.vault)?;
            let password = input.choose()?;

            let report = strength::check(&password);
            if !report.is_acceptable() {
                eprintln!("warning: {} password: {}", report.label, report.issues.join(", "));
            }

            let mut session = VaultSession::create(storage, password, kdf)?;
            session.save().context("failed to write new vault")?;
            session.close();
            println!("vault initialized");
        }
        Commands::Add { file, to } => {
            let mut session = open(cli.vault, input)?;
            let added = session.add_file(&file, &to)?;
            session.save()?;
            println!("added '{added}'");
        }
        Commands::Mkdir { path } => {
            let (parent, name) = split_parent(&path)?;
            let mut session = open(cli.vault, input)?;
            session.mkdir(&parent, &name)?;
            session.save()?;
            println!("created '{path}'");
        }
        Commands::Ls { path, long, json } => {
            let session = open(cli.vault, input)?;
            let entries = session.list(&path)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }

            if entries.is_empty() {
                println!("(empty)");
                return Ok(());
            }

            if long {
                let name_width = entries
                    .iter()
                    .map(|e| e.name.len())
                    .chain(std::iter::once("Name".len()))
                    .max()
                    .unwrap_or(4);

                println!("{:<4}  {:>10}  {:<19}  {:<name_width$}", "Kind", "Size", "Modified", "Name");
                println!("{:-<4}  {:->10}  {:-<19}  {:-<name_width$}", "", "", "", "");

                for e in entries {
                    let kind = match e.kind {
                        EntryKind::Directory => "dir",
                        EntryKind::File => "file",
                    };
                    let modified = e
                        .modified_at
                        .unwrap_or(e.created_at)
                        .format("%Y-%m-%d %H:%M:%S")
                        .to_string();
                    println!("{kind:<4}  {:>10}  {modified:<19}  {:<name_width$}", e.size, e.name);
                }
            } else {
                for e in entries {
                    match e.kind {
                        EntryKind::Directory => println!("{}/", e.name),
                        EntryKind::File => println!("{}", e.name),
                    }
                }
            }
        }
        Commands::Extract { path, out } => {
            let session = open(cli.vault, input)?;
            match out {
                Some(dir) => {
                    let written = session.extract_to(&path, &dir)?;
                    println!("extracted to {}", written.display());
                }
                None => {
                    let content = session.extract(&path)?;
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&content)?;
                    stdout.flush()?;
                }
            }
        }
        Commands::Rm { path } => {
            let mut session = open(cli.vault, input)?;
            session.remove(&path)?;
            session.save()?;
            println!("removed '{path}'");
        }
        Commands::Info => {
            let session = open(cli.vault, input)?;
            let header = session.header()?;
            let stats = session.stats()?;
            let path = session.path()?;
            let on_disk = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

            println!("Vault:        {}", path.display());
            println!("Format:       v{}", header.version());
            println!(
                "KDF:          argon2id m={} KiB, t={}, p={}",
                header.kdf().mem_cost_kib(),
                header.kdf().time_cost(),
                header.kdf().parallelism()
            );
            println!("Files:        {}", stats.files);
            println!("Directories:  {}", stats.directories);
            println!("Content size: {} bytes", stats.total_bytes);
            println!("File size:    {on_disk} bytes");
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = match e.downcast_ref::<VaultError>() {
                Some(vault_err) => vault_err.user_message(),
                None => format!("{e:#}"),
            };
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}
