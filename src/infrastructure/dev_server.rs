use crate::core::emission::PAGE_FILENAME;
use crate::core::models::DevServerConfig;
use crate::utils::{KilnError, Logger, Result};
use axum::Router;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tower_http::services::{ServeDir, ServeFile};

/// Serves the output directory, then the static directory, then the page
/// itself so client-side routes load the app.
#[derive(Debug, Clone)]
pub struct DevServer {
    outdir: PathBuf,
    static_dir: PathBuf,
    port: u16,
    compress: bool,
}

impl DevServer {
    pub fn new(root: &Path, outdir: &Path, config: &DevServerConfig) -> Self {
        Self {
            outdir: root.join(outdir),
            static_dir: root.join(&config.static_dir),
            port: config.port,
            compress: config.compress,
        }
    }

    /// Live updates listen one port above the page
    pub fn live_update_port(&self) -> u16 {
        self.port.saturating_add(1)
    }

    pub fn create_router(&self) -> Router {
        let page = ServeFile::new(self.outdir.join(PAGE_FILENAME));
        let static_files = ServeDir::new(&self.static_dir).fallback(page);
        let output = ServeDir::new(&self.outdir).fallback(static_files);

        let router = Router::new().fallback_service(output);
        if self.compress {
            router.layer(CompressionLayer::new())
        } else {
            router
        }
    }

    pub async fn run(&self) -> Result<()> {
        let addr = format!("127.0.0.1:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| KilnError::Server(format!("dev server bind failed on {}: {}", addr, e)))?;
        Logger::info(&format!("🚀 Dev server running on http://{}", addr));
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        axum::serve(listener, self.create_router())
            .await
            .map_err(|e| KilnError::Server(e.to_string()))
    }
}
