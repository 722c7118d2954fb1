pub mod keys;
pub mod report;
pub mod sequence;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to create export directory {0}: {1}")]
    CreateDir(String, std::io::Error),
    #[error("failed to write {0}: {1}")]
    Write(String, std::io::Error),
    #[error("failed to serialize summary: {0}")]
    Json(#[from] serde_json::Error),
}

/// Create `dir` (and parents) if needed.
pub fn ensure_directory(dir: &std::path::Path) -> Result<(), ExportError> {
    std::fs::create_dir_all(dir).map_err(|e| ExportError::CreateDir(dir.display().to_string(), e))
}
