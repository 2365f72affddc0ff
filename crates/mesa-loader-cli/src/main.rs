//! Mesa3D loader CLI
//!
//! Inspect the embedded bundle, extract a variant into the shared cache, or
//! run the full activation from the command line.

mod commands;

use clap::{ArgAction, Parser, Subcommand};
use commands::VariantArgs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mesa-loader")]
#[command(about = "Extract and load the embedded Mesa3D OpenGL libraries", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve, extract and load the libraries (exit code is the status code)
    Activate {
        #[command(flatten)]
        variant: VariantArgs,
    },

    /// Print the variant that applies to this host
    Resolve {
        #[command(flatten)]
        variant: VariantArgs,
    },

    /// Extract the variant into the cache and print its directory
    Materialize {
        #[command(flatten)]
        variant: VariantArgs,
    },

    /// List the bundled variants and files
    List {
        /// Read an unpacked bundle directory instead of the embedded one
        #[arg(long)]
        bundle_dir: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show versions, platform, cache location and environment
    Info,

    /// Remove extracted libraries
    Clean {
        /// Cache root to remove (default: configured cache root)
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    mesa_loader::logging::init_with_default(match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    });

    match cli.command {
        Commands::Activate { variant } => {
            let code = commands::activate::execute(&variant)?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Resolve { variant } => commands::resolve::execute(&variant)?,
        Commands::Materialize { variant } => commands::materialize::execute(&variant)?,
        Commands::List { bundle_dir, json } => commands::list::execute(bundle_dir.as_deref(), json)?,
        Commands::Info => commands::info::execute()?,
        Commands::Clean { cache_dir } => commands::clean::execute(cache_dir)?,
    }

    Ok(())
}
