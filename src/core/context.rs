use crate::core::interfaces::TransformSettings;
use crate::core::models::{BuildConfig, BuildWarning, ModuleId};
use crate::infrastructure::ModuleResolver;
use crate::utils::{KilnError, Result, TransformCache};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const DATE_FORMAT: &str = "%-m/%-d/%Y, %-I:%M:%S %p";

/// Everything one build invocation owns. Created per build, dropped with it.
pub struct BuildContext {
    pub config: Arc<BuildConfig>,
    pub generation: u64,
    latest_generation: Arc<AtomicU64>,
    pub resolver: ModuleResolver,
    pub transform_cache: Arc<TransformCache>,
    date_label: String,
    warnings: Mutex<Vec<BuildWarning>>,
}

impl BuildContext {
    /// A standalone build: generation 1, fresh cache
    pub fn new(config: Arc<BuildConfig>) -> Self {
        Self::for_generation(
            config,
            1,
            Arc::new(AtomicU64::new(1)),
            Arc::new(TransformCache::new()),
        )
    }

    pub fn for_generation(
        config: Arc<BuildConfig>,
        generation: u64,
        latest_generation: Arc<AtomicU64>,
        transform_cache: Arc<TransformCache>,
    ) -> Self {
        let resolver = ModuleResolver::new(
            config.root.clone(),
            config.alias.clone(),
            config.extensions.clone(),
        );
        let date_label = Self::format_timestamp(config.build_timestamp);

        Self {
            config,
            generation,
            latest_generation,
            resolver,
            transform_cache,
            date_label,
            warnings: Mutex::new(Vec::new()),
        }
    }

    /// Fails with `Superseded` once a newer generation has started
    pub fn ensure_current(&self) -> Result<()> {
        if self.latest_generation.load(Ordering::SeqCst) != self.generation {
            return Err(KilnError::Superseded {
                generation: self.generation,
            });
        }
        Ok(())
    }

    pub fn transform_settings(&self) -> TransformSettings {
        TransformSettings {
            mode: self.config.mode,
            target: self.config.target.clone(),
        }
    }

    pub fn date_label(&self) -> &str {
        &self.date_label
    }

    /// The banner comment prepended to minified scripts
    pub fn banner(&self) -> String {
        format!(
            "/* {} */",
            self.config.banner.replace("{date}", &self.date_label)
        )
    }

    /// Root-relative, `/`-separated id for a canonical module path
    pub fn module_id(&self, path: &Path) -> ModuleId {
        let relative = path.strip_prefix(&self.config.root).unwrap_or(path);
        let id = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .filter(|c| c != "/")
            .collect::<Vec<_>>()
            .join("/");
        format!("./{}", id)
    }

    /// Path importers of entry specifiers are resolved against
    pub fn entry_importer(&self) -> PathBuf {
        self.config.root.join("kiln.config.json")
    }

    pub fn warn(&self, warning: BuildWarning) {
        crate::utils::Logger::warn(&warning.to_string());
        self.warnings.lock().push(warning);
    }

    pub fn take_warnings(&self) -> Vec<BuildWarning> {
        std::mem::take(&mut *self.warnings.lock())
    }

    /// Pinned timestamps (config, then `SOURCE_DATE_EPOCH`) and the current time
    /// both render in UTC
    fn format_timestamp(pinned: Option<i64>) -> String {
        let pinned = pinned.or_else(|| {
            std::env::var("SOURCE_DATE_EPOCH")
                .ok()
                .and_then(|value| value.trim().parse::<i64>().ok())
        });

        let time: DateTime<Utc> = pinned
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_else(Utc::now);
        time.format(DATE_FORMAT).to_string()
    }
}
