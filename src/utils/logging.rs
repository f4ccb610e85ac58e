use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

pub struct Logger;

impl Logger {
    /// Install the global subscriber. `RUST_LOG` overrides the default filter.
    pub fn init() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kiln=info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    }

    pub fn build_start(root: &str, outdir: &str, mode: &str) {
        info!("🔨 kiln - {} build", mode);
        info!("📁 Input: {}", root);
        info!("📦 Output: {}", outdir);
    }

    pub fn graph_built(modules: usize, entries: usize, on_demand: usize) {
        info!(
            "🔗 Module graph: {} modules from {} entries ({} on-demand roots)",
            modules, entries, on_demand
        );
    }

    pub fn chunk_created(name: &str, kind: &str, modules: usize, size: usize) {
        debug!(
            "  ├─ {} [{}] ({} modules, {:.1}KB)",
            name,
            kind,
            modules,
            size as f64 / 1024.0
        );
    }

    pub fn processing_file(name: &str, mode: &str) {
        debug!("⚡ Processing: {} ({})", name, mode);
    }

    pub fn processing_css(name: &str) {
        debug!("🎨 Processing CSS: {}", name);
    }

    pub fn info(msg: &str) {
        info!("{}", msg);
    }

    pub fn debug(msg: &str) {
        debug!("{}", msg);
    }

    pub fn error(msg: &str) {
        error!("❌ {}", msg);
    }

    pub fn warn(msg: &str) {
        warn!("⚠️  {}", msg);
    }
}

pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    pub fn start(name: &str) -> Self {
        debug!("⏱️  Starting: {}", name);
        Self {
            start: Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!("⏱️  Completed: {} in {:.2?}", self.name, self.elapsed());
    }
}
