use anyhow::Context;
use filevault_core::{DataTransformer, File, FileRecord, FileStorageConfig, RecordTransformer};
use std::path::Path;

/// Initialize tracing for the CLI binary.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// Configuration from `--config`, or from the `FILEVAULT_*` environment
pub fn load_config(path: Option<&Path>) -> anyhow::Result<FileStorageConfig> {
    match path {
        Some(path) => FileStorageConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => FileStorageConfig::from_env().context("Failed to load configuration from environment"),
    }
}

/// Read a persisted file record and turn it into a [`File`]
pub fn read_record(path: &Path) -> anyhow::Result<(File, FileRecord)> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read record {}", path.display()))?;
    let record: FileRecord = serde_json::from_str(&json)
        .with_context(|| format!("Invalid file record in {}", path.display()))?;
    let file = RecordTransformer.to_file(&record)?;
    Ok((file, record))
}

/// Write `file` back onto its record, or print it when no path is given
pub fn write_record(file: &File, existing: Option<FileRecord>, path: Option<&Path>) -> anyhow::Result<()> {
    let record = RecordTransformer.to_record(file, existing);
    let json = serde_json::to_string_pretty(&record).context("Serialize record")?;
    match path {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Failed to write record {}", path.display()))?,
        None => println!("{}", json),
    }
    Ok(())
}

/// Split a comma separated variant list; empty entries are dropped
pub fn parse_variant_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn variant_list() {
        assert_eq!(parse_variant_list("thumb, large,,"), vec!["thumb", "large"]);
        assert!(parse_variant_list("").is_empty());
    }

    #[test]
    fn record_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("record.json");
        let file = File::builder("cake.png", "local")
            .model("Item")
            .model_id("7")
            .build()
            .with_path("Item/cake.png");

        write_record(&file, None, Some(&path)).unwrap();
        let (read, record) = read_record(&path).unwrap();
        assert_eq!(read, file);
        assert_eq!(record.foreign_key, Some(filevault_core::ForeignKey::Int(7)));
    }

    #[test]
    fn missing_record() {
        let dir = TempDir::new().unwrap();
        let err = read_record(&dir.path().join("missing.json")).unwrap_err();
        assert!(err.to_string().contains("missing.json"));
    }
}
