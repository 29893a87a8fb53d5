use std::path::Path;

use engine_logging::engine_debug;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("download directory {dir:?} is unusable: {reason}")]
    OutputDir { dir: String, reason: String },
}

impl PersistError {
    fn output_dir(dir: &Path, reason: impl ToString) -> Self {
        PersistError::OutputDir {
            dir: dir.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Startup check: create the download directory if needed and prove a file
/// can be written in it. Blocking; run it before serving requests.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    std::fs::create_dir_all(dir).map_err(|err| PersistError::output_dir(dir, err))?;
    if !dir.is_dir() {
        return Err(PersistError::output_dir(dir, "not a directory"));
    }
    NamedTempFile::new_in(dir).map_err(|err| PersistError::output_dir(dir, err))?;
    Ok(())
}

/// Per-transfer check on the runtime: recreate the directory if it vanished
/// since startup.
pub async fn prepare_output_dir(dir: &Path) -> Result<(), PersistError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|err| PersistError::output_dir(dir, err))?;
    let meta = tokio::fs::metadata(dir)
        .await
        .map_err(|err| PersistError::output_dir(dir, err))?;
    if !meta.is_dir() {
        return Err(PersistError::output_dir(dir, "not a directory"));
    }
    engine_debug!("download directory ready: {:?}", dir);
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::{ensure_output_dir, prepare_output_dir, PersistError};

    #[test]
    fn startup_check_creates_nested_dirs() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("a").join("b");
        ensure_output_dir(&dir).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn startup_check_rejects_a_file() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("taken");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            ensure_output_dir(&file),
            Err(PersistError::OutputDir { .. })
        ));
    }

    #[tokio::test]
    async fn transfer_check_recreates_a_removed_dir() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("downloads");
        prepare_output_dir(&dir).await.unwrap();
        std::fs::remove_dir(&dir).unwrap();
        prepare_output_dir(&dir).await.unwrap();
        assert!(dir.is_dir());
    }

    #[tokio::test]
    async fn transfer_check_rejects_a_file() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("taken");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            prepare_output_dir(&file).await,
            Err(PersistError::OutputDir { .. })
        ));
    }
}
