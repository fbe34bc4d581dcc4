use std::path::Path;

use crate::config::RunConfig;
use crate::error::BenchError;

/// Read a JSON run configuration from disk.
///
/// Keys missing from the file keep their [`RunConfig::default`] values.
pub async fn read_config(path: impl AsRef<Path>) -> Result<RunConfig, BenchError> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        BenchError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    serde_json::from_str(&content)
        .map_err(|e| BenchError::Config(format!("invalid config {}: {e}", path.display())))
}

/// Write a [`RunConfig`] as pretty-printed JSON.
pub async fn write_config(config: &RunConfig, path: impl AsRef<Path>) -> Result<(), BenchError> {
    let path = path.as_ref();
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| BenchError::Config(format!("failed to serialize config: {e}")))?;
    tokio::fs::write(path, content).await.map_err(|e| {
        BenchError::Config(format!("failed to write {}: {e}", path.display()))
    })
}
