//! ledgerfs CLI
//!
//! Stores files as content-addressed chunks on a local ledger and restores
//! them with full verification.
//!
//! # Commands
//! - `create` - Declare a file and upload all of its chunks
//! - `upload` - Create the chunks of a declared file that are still missing
//! - `register` - Register created chunks with their file
//! - `download` - Fetch, verify and save a file
//! - `view` - Show a file manifest
//! - `delete` - Delete a file and its chunks
//! - `freeze` - Make a file immutable
//! - `credits` - List, merge, split or mint credits
//! - `config` - Show or edit configuration
//!
//! # Configuration
//! Config file: ~/.ledgerfs/config.toml

use anyhow::Result;
use clap::{Parser, Subcommand};
use ledgerfs_core::ObjectHandle;
use std::path::PathBuf;

mod commands;
mod config;
mod symbols;

use commands::{credits, delete, download, upload, view};

#[derive(Parser)]
#[command(name = "ledgerfs")]
#[command(about = "Content-addressed file storage on a ledger")]
#[command(version)]
struct Cli {
    /// Ledger database path (overrides config file)
    #[arg(long, global = true)]
    ledger: Option<PathBuf>,

    /// Account name (overrides config file)
    #[arg(long, global = true)]
    account: Option<String>,

    /// Concurrent chunk operations (overrides config file)
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Declare a local file and upload all of its chunks
    Create {
        /// Path to the file
        path: PathBuf,

        /// Bytes per chunk
        #[arg(long)]
        chunk_size: Option<usize>,

        /// zstd level to compress with before chunking
        #[arg(long)]
        compress: Option<i32>,

        /// Store the file uncompressed whatever the config says
        #[arg(long, conflicts_with = "compress")]
        no_compress: bool,

        /// MIME type (guessed from the file name if omitted)
        #[arg(long)]
        mime_type: Option<String>,

        /// Only declare the file; push chunks later with `upload`
        #[arg(long)]
        declare_only: bool,
    },

    /// Create the chunks of a declared file that are still missing
    Upload {
        file_id: ObjectHandle,

        /// The same local file that was declared
        path: PathBuf,
    },

    /// Register created chunks with their file
    Register { file_id: ObjectHandle },

    /// Download and verify a file
    Download {
        file_id: ObjectHandle,

        /// Output file name inside the downloads directory
        #[arg(short, long)]
        name: Option<String>,

        /// Exact output path (overrides --name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show a file manifest
    View {
        file_id: ObjectHandle,

        /// Print the manifest as JSON
        #[arg(long)]
        json: bool,

        /// List every chunk entry
        #[arg(long)]
        chunks: bool,
    },

    /// Delete a file and its chunks
    Delete { file_id: ObjectHandle },

    /// Make a file immutable
    Freeze { file_id: ObjectHandle },

    /// Manage credits
    Credits {
        #[command(subcommand)]
        command: CreditCommands,
    },

    /// Show or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum CreditCommands {
    /// List the account's credits
    List,

    /// Merge all credits into one
    Merge,

    /// Split off `count` credits of `value` each
    Split { count: usize, value: u64 },

    /// Create a new credit on the local ledger
    Mint { amount: u64 },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Show config file path
    Path,

    /// Initialize config file with defaults
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., ledger.account, upload.chunk_size)
        key: String,
        /// Value to set
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Load configuration from ~/.ledgerfs/config.toml
    let mut cfg = config::load_config();

    // CLI args override config file
    if let Some(path) = cli.ledger {
        cfg.ledger.path = path;
    }
    if let Some(account) = cli.account {
        cfg.ledger.account = account;
    }
    if cli.workers.is_some() {
        cfg.upload.workers = cli.workers;
        cfg.download.workers = cli.workers;
    }

    match cli.command {
        Commands::Create {
            path,
            chunk_size,
            compress,
            no_compress,
            mime_type,
            declare_only,
        } => {
            if chunk_size.is_some() {
                cfg.upload.chunk_size = chunk_size;
            }
            if let Some(level) = compress {
                cfg.upload.compression_level = Some(config::CompressionSetting::Level(level));
            }
            if no_compress {
                cfg.upload.compression_level = Some(config::CompressionSetting::OFF);
            }
            let pipeline = cfg.upload_pipeline()?;
            let ledger = commands::open_ledger(&cfg)?;
            let config = upload::CreateConfig {
                path,
                mime_type,
                declare_only,
            };
            upload::create(ledger, pipeline, config).await?;
        }

        Commands::Upload { file_id, path } => {
            let pipeline = cfg.upload_pipeline()?;
            let ledger = commands::open_ledger(&cfg)?;
            upload::upload(ledger, pipeline, file_id, &path).await?;
        }

        Commands::Register { file_id } => {
            let pipeline = cfg.upload_pipeline()?;
            let ledger = commands::open_ledger(&cfg)?;
            upload::register(ledger, pipeline, file_id).await?;
        }

        Commands::Download {
            file_id,
            name,
            output,
        } => {
            let pipeline = cfg.download_pipeline()?;
            let ledger = commands::open_ledger(&cfg)?;
            let config = download::DownloadConfig {
                file: file_id,
                name,
                output,
                output_dir: cfg.download.output_dir.clone(),
            };
            download::run(ledger, pipeline, config).await?;
        }

        Commands::View {
            file_id,
            json,
            chunks,
        } => {
            let ledger = commands::open_ledger(&cfg)?;
            let config = view::ViewConfig {
                file: file_id,
                json,
                chunks,
            };
            view::run(ledger, config).await?;
        }

        Commands::Delete { file_id } => {
            delete::delete(commands::open_ledger(&cfg)?, file_id).await?;
        }

        Commands::Freeze { file_id } => {
            delete::freeze(commands::open_ledger(&cfg)?, file_id).await?;
        }

        Commands::Credits { command } => {
            let ledger = commands::open_ledger(&cfg)?;
            match command {
                CreditCommands::List => credits::list(ledger).await?,
                CreditCommands::Merge => credits::merge(ledger).await?,
                CreditCommands::Split { count, value } => {
                    credits::split(ledger, count, value).await?
                }
                CreditCommands::Mint { amount } => credits::mint(ledger, amount).await?,
            }
        }

        Commands::Config { command } => {
            handle_config_command(command, &cfg)?;
        }
    }

    Ok(())
}

/// Handle config subcommands
fn handle_config_command(
    command: Option<ConfigCommands>,
    effective: &config::LedgerFsConfig,
) -> Result<()> {
    use console::style;

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("{}", style("ledgerfs Configuration").bold().underlined());
            println!();
            println!("{}", style("[ledger]").cyan());
            println!("  path = \"{}\"", effective.ledger.path.display());
            println!("  account = \"{}\"", effective.ledger.account);
            println!();

            let upload = effective.upload_pipeline()?;
            println!("{}", style("[upload]").cyan());
            println!("  workers = {}", upload.workers);
            println!("  chunk_size = {}", upload.chunk_size);
            match upload.compression_level {
                Some(level) => println!("  compression_level = {}", level),
                None => println!("  compression_level = \"off\""),
            }
            println!("  chunk_credit = {}", upload.chunk_credit);
            println!("  file_credit = {}", upload.file_credit);
            println!();

            let download = effective.download_pipeline()?;
            println!("{}", style("[download]").cyan());
            println!("  workers = {}", download.workers);
            println!("  output_dir = \"{}\"", effective.download.output_dir.display());
            println!();

            if let Ok(path) = config::config_file_path() {
                println!("{} {}", style("Config file:").dim(), path.display());
                if !path.exists() {
                    println!(
                        "{} Run '{}' to create it",
                        style("(not created yet)").yellow(),
                        style("ledgerfs config init").green()
                    );
                }
            }
        }

        Some(ConfigCommands::Path) => {
            println!("{}", config::config_file_path()?.display());
        }

        Some(ConfigCommands::Init { force }) => {
            let path = config::config_file_path()?;
            if path.exists() && !force {
                println!(
                    "{} Config file already exists at {}",
                    style(symbols::WARN).yellow(),
                    path.display()
                );
                println!("Use --force to overwrite");
                return Ok(());
            }

            config::save_config(&config::LedgerFsConfig::default())?;
            println!(
                "{} Config file created at {}",
                style(symbols::CHECK).green(),
                path.display()
            );
        }

        Some(ConfigCommands::Set { key, value }) => {
            // Edit the file as stored, not the overridden view
            let mut cfg = config::load_config();
            cfg.set(&key, &value)?;
            config::save_config(&cfg)?;
            println!("{} Configuration updated", style(symbols::CHECK).green());
        }
    }

    Ok(())
}
