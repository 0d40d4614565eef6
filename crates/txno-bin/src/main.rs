//! txno - operator CLI for the transactional outbox.

mod app;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use txno_config_and_utils::{init_logging, Config, Paths};

/// txno command-line interface.
#[derive(Parser)]
#[command(name = "txno")]
#[command(about = "Inspect and maintain a transactional outbox database")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config and the default database. Defaults to ~/.txno
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the outbox schema
    Migrate,
    /// Print the schema DDL for a dialect
    Schema {
        /// Dialect to render (defaults to the configured one)
        #[arg(short, long)]
        dialect: Option<String>,
    },
    /// Reset a blocked entry so it is retried
    Unblock {
        /// Entry id
        id: String,
    },
    /// Check the database and report the schema version
    Status,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;
    config.validate()?;

    init_logging(cli.log_level.as_deref().unwrap_or(&config.log_level));

    match cli.command {
        Commands::Migrate => app::migrate(&config, &paths)?,
        Commands::Schema { dialect } => {
            app::print_schema(&config, dialect.as_deref(), &mut std::io::stdout().lock())?
        }
        Commands::Unblock { id } => {
            app::unblock(&config, &paths, &id)?;
        }
        Commands::Status => app::status(&config, &paths)?,
    }

    Ok(())
}
