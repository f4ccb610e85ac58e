use crate::core::models::*;
use crate::utils::Result;
use async_trait::async_trait;
use std::path::Path;

/// File system operations interface
#[async_trait]
pub trait FileSystemService: Send + Sync {
    async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>>;
    async fn read_file(&self, path: &Path) -> Result<String>;
    /// Creates missing parent directories; failures are emission errors
    async fn write_file(&self, path: &Path, content: &[u8]) -> Result<()>;
    async fn remove_file(&self, path: &Path) -> Result<()>;
    /// Remove `path` with everything under it and recreate it empty
    async fn reset_directory(&self, path: &Path) -> Result<()>;
    fn file_exists(&self, path: &Path) -> bool;
}

/// Settings every transformer sees
#[derive(Debug, Clone)]
pub struct TransformSettings {
    pub mode: Mode,
    pub target: String,
}

/// Turns one source file into its transformed output plus outgoing imports.
/// Implementations are synchronous; the graph builder runs them on blocking tasks.
pub trait ModuleTransformer: Send + Sync {
    fn supports(&self, module_type: ModuleType) -> bool;
    fn transform(
        &self,
        path: &Path,
        source: &[u8],
        settings: &TransformSettings,
    ) -> Result<TransformedModule>;
}

/// Build service interface
#[async_trait]
pub trait BuildService: Send + Sync {
    async fn build(&self, config: &BuildConfig) -> Result<BuildResult>;
}
