//! aspace-ingest - command-line entry point
//!
//! Loads the TOML configuration, sets up tracing and runs one ingestion pass.

use std::path::PathBuf;

use anyhow::{Context, Result};
use aspace_common::config::{resolve_config_path, TomlConfig};
use aspace_ingest::client::correlator::IdMapping;
use aspace_ingest::client::linker::MergePolicy;
use aspace_ingest::workflow;
use aspace_ingest::IngestClient;
use clap::{Parser, Subcommand};
use tracing::info;

/// Command-line arguments for aspace-ingest
#[derive(Parser, Debug)]
#[command(name = "aspace-ingest")]
#[command(about = "Batch ingestion client for an archival management backend")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(short, long, env = "ASPACE_INGEST_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert and upload a directory of EAD documents
    Ead {
        /// Directory of *.xml files (defaults to ingest_dir)
        dir: Option<PathBuf>,

        /// Where to write the EAD id mapping (defaults to id_mapping_file)
        #[arg(long)]
        mapping_out: Option<PathBuf>,
    },
    /// Upload pre-built batches from a JSON file
    Batches {
        /// Configured repository key
        #[arg(short, long)]
        repository: String,
        file: PathBuf,
    },
    /// Find-or-create entities and link them onto accessions or resources
    Link {
        #[arg(short, long)]
        repository: String,
        file: PathBuf,
    },
    /// Build and upload a classification tree
    Classifications {
        #[arg(short, long)]
        repository: String,
        file: PathBuf,
    },
    /// Merge batches into resources created by an earlier EAD pass
    Merge {
        #[arg(short, long)]
        repository: String,
        file: PathBuf,

        /// EAD id mapping (defaults to id_mapping_file)
        #[arg(long)]
        mapping: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let config = TomlConfig::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    aspace_common::logging::init_tracing(&config.logging).context("Failed to initialize logging")?;
    info!("Starting aspace-ingest {}", env!("CARGO_PKG_VERSION"));

    let client = IngestClient::from_config(&config).context("Failed to create ingest client")?;

    let summary = match args.command {
        Command::Ead { dir, mapping_out } => {
            let dir = dir
                .or_else(|| config.ingest_dir.clone())
                .context("No EAD directory given and ingest_dir not configured")?;
            let mapping_out = mapping_out.unwrap_or_else(|| config.id_mapping_file.clone());
            workflow::ingest_ead_directory(&client, &config, &dir, &mapping_out).await?
        }
        Command::Batches { repository, file } => {
            let repo_id = config.repository_id(&repository)?;
            let batches = workflow::load_batches(&file)
                .with_context(|| format!("Failed to read batches from {}", file.display()))?;
            workflow::ingest_batches(&client, repo_id, batches).await?
        }
        Command::Link { repository, file } => {
            let repo_id = config.repository_id(&repository)?;
            let requests = workflow::load_link_requests(&file)
                .with_context(|| format!("Failed to read link requests from {}", file.display()))?;
            workflow::link_entities(&client, repo_id, requests).await?
        }
        Command::Classifications { repository, file } => {
            let repo_id = config.repository_id(&repository)?;
            let rows = workflow::classifications::load_classification_rows(&file)
                .with_context(|| format!("Failed to read classifications from {}", file.display()))?;
            workflow::ingest_classifications(&client, repo_id, &rows).await?
        }
        Command::Merge {
            repository,
            file,
            mapping,
        } => {
            let repo_id = config.repository_id(&repository)?;
            let mapping = mapping.unwrap_or_else(|| config.id_mapping_file.clone());
            let id_mapping = IdMapping::load_json(&mapping)
                .with_context(|| format!("Failed to read id mapping from {}", mapping.display()))?;
            let batches = workflow::load_batches(&file)
                .with_context(|| format!("Failed to read batches from {}", file.display()))?;
            let client = client.with_id_mapping(id_mapping);
            workflow::merge_batches(&client, repo_id, batches, &MergePolicy::finding_aid_supplement())
                .await?
        }
    };

    println!("{}", summary);
    Ok(())
}
