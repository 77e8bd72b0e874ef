mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "porter")]
#[command(about = "Encrypted blob transfer tool")]
#[command(version)]
struct Cli {
    /// Path to the Porter config directory (default: ~/.porter)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Hex-encoded sealing key (or set PORTER_KEY env var). Overrides the
    /// key file from the configuration.
    #[arg(long, global = true, env = "PORTER_KEY")]
    key_hex: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize Porter configuration and generate a sealing key
    Init {
        /// Bucket to transfer to/from
        bucket: String,
        /// AWS region
        #[arg(long)]
        region: Option<String>,
        /// Custom endpoint URL for S3-compatible services
        #[arg(long)]
        endpoint_url: Option<String>,
    },

    /// Upload a local file to a remote path
    Upload {
        /// Local file to upload
        file: PathBuf,
        /// Remote object path
        remote: String,
    },

    /// Download a remote object to a local path
    Download {
        /// Remote object path
        remote: String,
        /// Local destination file
        dest: PathBuf,
    },

    /// Delete a remote object
    Delete {
        /// Remote object path
        remote: String,
    },

    /// Print a shareable download link for a remote object
    Url {
        /// Remote object path
        remote: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("porter=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let base_dir = match cli.config_dir {
        Some(ref dir) => dir.clone(),
        None => porter_core::config::PorterConfig::default_base_dir()?,
    };

    let rt = tokio::runtime::Runtime::new()?;

    match cli.command {
        Commands::Init {
            ref bucket,
            ref region,
            ref endpoint_url,
        } => commands::init::run(&base_dir, bucket, region.as_deref(), endpoint_url.as_deref()),
        Commands::Upload {
            ref file,
            ref remote,
        } => rt.block_on(commands::upload::run(file, remote, &base_dir, &cli.key_hex)),
        Commands::Download {
            ref remote,
            ref dest,
        } => rt.block_on(commands::download::run(
            remote,
            dest,
            &base_dir,
            &cli.key_hex,
        )),
        Commands::Delete { ref remote } => {
            rt.block_on(commands::delete::run(remote, &base_dir))
        }
        Commands::Url { ref remote } => rt.block_on(commands::url::run(remote, &base_dir)),
    }
}
