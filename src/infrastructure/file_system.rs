use crate::core::interfaces::FileSystemService;
use crate::utils::{KilnError, Result};
use std::path::Path;
use tokio::fs;

pub struct TokioFileSystemService;

#[async_trait::async_trait]
impl FileSystemService for TokioFileSystemService {
    async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).await.map_err(KilnError::Io)
    }

    async fn read_file(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).await.map_err(KilnError::Io)
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| KilnError::emission(parent, e))?;
        }

        fs::write(path, content)
            .await
            .map_err(|e| KilnError::emission(path, e))
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(KilnError::emission(path, e)),
        }
    }

    async fn reset_directory(&self, path: &Path) -> Result<()> {
        if fs::metadata(path).await.is_ok() {
            fs::remove_dir_all(path)
                .await
                .map_err(|e| KilnError::emission(path, e))?;
        }
        fs::create_dir_all(path)
            .await
            .map_err(|e| KilnError::emission(path, e))
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_operations() {
        let fs_service = TokioFileSystemService;
        let temp_dir = tempdir().unwrap();
        let test_file = temp_dir.path().join("nested/dir/test.txt");

        fs_service.write_file(&test_file, b"Hello, kiln!").await.unwrap();
        assert!(fs_service.file_exists(&test_file));
        assert_eq!(fs_service.read_file(&test_file).await.unwrap(), "Hello, kiln!");

        fs_service.remove_file(&test_file).await.unwrap();
        assert!(!fs_service.file_exists(&test_file));
        fs_service.remove_file(&test_file).await.unwrap();
    }

    #[tokio::test]
    async fn test_reset_directory_clears_previous_output() {
        let fs_service = TokioFileSystemService;
        let temp_dir = tempdir().unwrap();
        let out = temp_dir.path().join("dist");
        fs_service.write_file(&out.join("old.js"), b"stale").await.unwrap();

        fs_service.reset_directory(&out).await.unwrap();
        assert!(out.is_dir());
        assert!(!out.join("old.js").exists());
    }
}
