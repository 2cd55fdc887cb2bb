//! filevault: store files and generate their variants from the command line.
//!
//! Configuration comes from `--config <file.json>` or from `FILEVAULT_*` environment
//! variables (a `.env` file is loaded). Files are exchanged as JSON file records.

use anyhow::Context;
use clap::{Parser, Subcommand};
use filevault_cli::{init_tracing, load_config, parse_variant_list, read_record, write_record};
use filevault_core::FileFactory;
use filevault_processing::VariantPipeline;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "filevault", about = "File storage and variant generation")]
struct Cli {
    /// JSON configuration file (defaults to the FILEVAULT_* environment)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a local file and generate its variants
    Store {
        /// Path to the file to store
        file: PathBuf,
        /// Storage adapter (defaults to the configured default adapter)
        #[arg(long)]
        adapter: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        model_id: Option<String>,
        #[arg(long)]
        collection: Option<String>,
        /// Write the resulting record here instead of printing it
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Regenerate variants of stored files, updating their records in place
    Generate {
        /// File record JSON files
        #[arg(required = true)]
        records: Vec<PathBuf>,
        /// Comma separated variant names (all declared variants when omitted)
        #[arg(long)]
        only: Option<String>,
        /// Files processed concurrently
        #[arg(long, default_value = "4")]
        concurrency: usize,
    },
    /// Remove a stored file and its variants, or a single variant
    Remove {
        /// File record JSON file
        record: PathBuf,
        /// Remove only this variant and update the record
        #[arg(long)]
        variant: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let pipeline = VariantPipeline::from_config(&config)
        .await
        .context("Failed to set up the storage pipeline")?;

    match cli.command {
        Commands::Store {
            file,
            adapter,
            model,
            model_id,
            collection,
            output,
        } => {
            let adapter = adapter.unwrap_or_else(|| config.default_adapter.clone());
            let mut new_file = FileFactory::from_disk(&file, &adapter)?;
            if let Some(model) = model {
                new_file = new_file.belongs_to_model(model, model_id);
            }
            if let Some(collection) = collection {
                new_file = new_file.add_to_collection(collection);
            }

            let stored = pipeline
                .handle(new_file)
                .await
                .with_context(|| format!("Failed to store {}", file.display()))?;
            write_record(&stored, None, output.as_deref())?;
        }
        Commands::Generate {
            records,
            only,
            concurrency,
        } => {
            let mut loaded = Vec::with_capacity(records.len());
            for path in &records {
                loaded.push(read_record(path)?);
            }

            match only.map(|list| parse_variant_list(&list)) {
                Some(only) => {
                    for ((file, record), path) in loaded.into_iter().zip(&records) {
                        let file = pipeline
                            .regenerate(file, Some(&only))
                            .await
                            .with_context(|| format!("Failed to regenerate {}", path.display()))?;
                        write_record(&file, Some(record), Some(path))?;
                    }
                }
                None => {
                    let mut originals = std::collections::HashMap::new();
                    let mut files = Vec::with_capacity(loaded.len());
                    for ((file, record), path) in loaded.into_iter().zip(&records) {
                        originals.insert(file.uuid().to_string(), (record, path.clone()));
                        files.push(file);
                    }

                    let mut failed = 0;
                    for result in pipeline.process_batch(files, concurrency).await {
                        match result {
                            Ok(file) => {
                                if let Some((record, path)) = originals.remove(file.uuid()) {
                                    write_record(&file, Some(record), Some(&path))?;
                                }
                            }
                            Err(e) => {
                                failed += 1;
                                tracing::error!(
                                    file_id = %e.file_id(),
                                    variant = ?e.variant(),
                                    error = %e.error(),
                                    "Variant generation failed"
                                );
                                if e.error().is_configuration_error() {
                                    return Err(e.into_error().into());
                                }
                            }
                        }
                    }
                    if failed > 0 {
                        anyhow::bail!("{} of {} files failed", failed, records.len());
                    }
                }
            }
        }
        Commands::Remove { record, variant } => {
            let (file, existing) = read_record(&record)?;
            match variant {
                Some(name) => {
                    let file = pipeline.storage().remove_variant(file, &name).await?;
                    write_record(&file, Some(existing), Some(&record))?;
                }
                None => {
                    let removed = pipeline.storage().remove(&file).await?;
                    println!(
                        "{}",
                        serde_json::json!({ "id": file.uuid(), "removed": removed })
                    );
                }
            }
        }
    }

    Ok(())
}
