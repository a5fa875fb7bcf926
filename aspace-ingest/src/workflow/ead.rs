//! EAD directory pass
//!
//! Converts every EAD document in a directory and uploads the result,
//! recording which resource id each document's EAD id ended up with.

use crate::client::tracker::OutcomeSummary;
use crate::client::IngestClient;
use aspace_common::config::TomlConfig;
use aspace_common::Result;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// `*.xml` files in `dir` owned by a configured repository, sorted by path
pub fn collect_ead_files(config: &TomlConfig, dir: &Path) -> Result<Vec<(PathBuf, i64)>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| path.extension().is_some_and(|ext| ext == "xml"))
        .collect();
    files.sort();

    Ok(files
        .into_iter()
        .filter_map(|path| match config.repository_for_file(&path) {
            Some(repo_id) => Some((path, repo_id)),
            None => {
                warn!(file = %path.display(), "No repository configured for file, skipping");
                None
            }
        })
        .collect())
}

/// Convert and upload each document, `batch_size` files per run
///
/// The id mapping gathered along the way is written to `mapping_out`.
pub async fn ingest_ead_directory(
    client: &IngestClient,
    config: &TomlConfig,
    dir: &Path,
    mapping_out: &Path,
) -> Result<OutcomeSummary> {
    let files = collect_ead_files(config, dir)?;
    info!(dir = %dir.display(), files = files.len(), "BEGIN INGEST");

    for chunk in files.chunks(config.batch_size.max(1)) {
        client.authorize().await?;
        for (path, repo_id) in chunk {
            client.queue_conversion(path, *repo_id).await?;
        }
        client.run().await;
    }

    client.id_mapping().write_json(mapping_out)?;
    let summary = client.summary();
    info!(
        mapping = %mapping_out.display(),
        mapped = client.id_mapping().len(),
        "{}",
        summary
    );
    info!("END INGEST");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_filters_by_repository_prefix() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["mnsss002.xml", "mnsss001.xml", "other7.xml", "mnsss003.txt"] {
            std::fs::write(dir.path().join(name), "<ead/>").unwrap();
        }
        let config = TomlConfig::from_toml_str(
            r#"
            backend_uri = "http://localhost:8089"
            password = "x"
            [repositories]
            mnsss = 2
            "#,
        )
        .unwrap();

        let files = collect_ead_files(&config, dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|(p, repo)| (p.file_name().unwrap().to_str().unwrap().to_string(), *repo))
            .collect();
        assert_eq!(
            names,
            vec![("mnsss001.xml".to_string(), 2), ("mnsss002.xml".to_string(), 2)]
        );
    }
}
