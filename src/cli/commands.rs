use crate::core::interfaces::{BuildService, FileSystemService};
use crate::core::models::{BuildConfig, Mode};
use crate::core::services::KilnBuildService;
use crate::infrastructure::{generate_hmr_client_code, DevServer, HmrService, TokioFileSystemService};
use crate::utils::{CliOverrides, ConfigLoader, DevSession, KilnError, KilnUI, Logger, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Deterministic, content-addressed bundles for single-page web apps")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the project once
    Build {
        /// Project root
        #[arg(short, long, default_value = ".")]
        root: String,
        /// Output directory, relative to the root
        #[arg(short, long)]
        outdir: Option<String>,
        /// production or development
        #[arg(short, long, default_value = "production")]
        mode: String,
        /// Skip minification
        #[arg(long)]
        no_minify: bool,
    },
    /// Watch, rebuild and serve with live updates
    Dev {
        /// Project root
        #[arg(short, long, default_value = ".")]
        root: String,
        /// Port to serve on; live updates use the next one
        #[arg(short, long)]
        port: Option<u16>,
    },
}

pub struct CliHandler;

impl CliHandler {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self) -> Result<()> {
        Logger::init();

        match Cli::parse().command {
            Commands::Build {
                root,
                outdir,
                mode,
                no_minify,
            } => {
                let mode = Mode::parse(&mode)
                    .ok_or_else(|| KilnError::config(format!("unknown mode '{}'", mode)))?;
                let overrides = CliOverrides {
                    outdir,
                    minify: no_minify.then_some(false),
                    port: None,
                };
                self.handle_build_command(&root, mode, &overrides).await
            }
            Commands::Dev { root, port } => {
                let overrides = CliOverrides {
                    port,
                    ..Default::default()
                };
                self.handle_dev_command(&root, &overrides).await
            }
        }
    }

    async fn handle_build_command(&self, root: &str, mode: Mode, overrides: &CliOverrides) -> Result<()> {
        let config = Self::load_config(root, mode, overrides)?;
        let mut ui = KilnUI::new();
        ui.show_banner(mode.as_str());
        ui.start_spinner("building");

        let fs_service: Arc<dyn FileSystemService> = Arc::new(TokioFileSystemService);
        let service = KilnBuildService::new(fs_service);
        let result = service.build(&config).await;
        ui.stop_spinner();

        let result = result?;
        ui.show_summary(&result, &config.outdir.display().to_string());
        Ok(())
    }

    async fn handle_dev_command(&self, root: &str, overrides: &CliOverrides) -> Result<()> {
        let config = Self::load_config(root, Mode::Development, overrides)?;
        KilnUI::new().show_banner(Mode::Development.as_str());

        let server = DevServer::new(&config.root, &config.outdir, &config.dev_server);
        let hmr = HmrService::new();
        hmr.start_server(server.live_update_port()).await?;

        let fs_service: Arc<dyn FileSystemService> = Arc::new(TokioFileSystemService);
        let service = KilnBuildService::new(fs_service)
            .with_page_snippet(generate_hmr_client_code(server.live_update_port()));
        let session = Arc::new(DevSession::new(config, service, hmr));

        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                Logger::error(&format!("Dev server stopped: {}", e));
            }
        });

        session.watch().await
    }

    fn load_config(root: &str, mode: Mode, overrides: &CliOverrides) -> Result<BuildConfig> {
        let root: PathBuf = Path::new(root).canonicalize().map_err(|e| {
            KilnError::config(format!("project root {} is not accessible: {}", root, e))
        })?;
        ConfigLoader::load(&root, mode, overrides)
    }
}

impl Default for CliHandler {
    fn default() -> Self {
        Self::new()
    }
}
