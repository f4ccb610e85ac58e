// Dev session: watches the project and rebuilds in generations

use crate::core::context::BuildContext;
use crate::core::models::{BuildConfig, BuildResult, Mode};
use crate::core::pipeline::Pipeline;
use crate::core::services::KilnBuildService;
use crate::infrastructure::{HmrMessage, HmrService};
use crate::utils::{KilnError, Logger, Result, TransformCache};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

const DEBOUNCE: Duration = Duration::from_millis(100);

/// Long-lived state shared by every generation of a dev session
pub struct DevSession {
    config: Arc<BuildConfig>,
    service: KilnBuildService,
    hmr: HmrService,
    latest_generation: Arc<AtomicU64>,
    transform_cache: Arc<TransformCache>,
    /// Fingerprints of the last committed output. Held for the whole build so
    /// generations never write concurrently.
    previous: Mutex<Option<BTreeMap<String, String>>>,
}

impl DevSession {
    pub fn new(config: BuildConfig, service: KilnBuildService, hmr: HmrService) -> Self {
        Self {
            config: Arc::new(BuildConfig {
                mode: Mode::Development,
                ..config
            }),
            service,
            hmr,
            latest_generation: Arc::new(AtomicU64::new(0)),
            transform_cache: Arc::new(TransformCache::new()),
            previous: Mutex::new(None),
        }
    }

    /// Start a new generation. Bumping the counter first makes any in-flight
    /// build abandon at its next stage boundary.
    pub async fn rebuild(&self, changed: &[PathBuf]) -> Result<BuildResult> {
        let generation = self.latest_generation.fetch_add(1, Ordering::SeqCst) + 1;
        if !changed.is_empty() {
            Logger::info(&format!("🔄 Rebuilding ({} files changed)", changed.len()));
        }

        let mut previous = self.previous.lock().await;
        let incremental = previous.is_some();
        let ctx = BuildContext::for_generation(
            self.config.clone(),
            generation,
            self.latest_generation.clone(),
            self.transform_cache.clone(),
        );
        let pipeline = if incremental {
            Pipeline::incremental()
        } else {
            Pipeline::for_mode(Mode::Development, false)
        };

        match self.service.run(&ctx, &pipeline, (*previous).as_ref()).await {
            Ok(result) => {
                *previous = Some(KilnBuildService::fingerprints(&result));
                if incremental {
                    if let Some(message) = HmrMessage::for_changes(generation, &result.written) {
                        self.hmr.broadcast(message);
                    }
                }
                Logger::info(&format!(
                    "✅ Generation {} ready ({} files written)",
                    generation,
                    result.written.len()
                ));
                Ok(result)
            }
            Err(err) if err.is_superseded() => {
                Logger::debug(&err.to_string());
                Err(err)
            }
            Err(err) => {
                Logger::error(&err.format_detailed());
                Err(err)
            }
        }
    }

    /// Initial build, then debounced rebuilds until Ctrl+C
    pub async fn watch(self: Arc<Self>) -> Result<()> {
        if let Err(err) = self.rebuild(&[]).await {
            Logger::warn(&format!("Initial build failed, waiting for changes: {}", err));
        }

        let (tx, mut rx) = mpsc::channel::<Event>(1024);
        let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            forward_event(&tx, res)
        })
        .map_err(|e| KilnError::Server(format!("File watcher setup failed: {}", e)))?;
        watcher
            .watch(&self.config.root, RecursiveMode::Recursive)
            .map_err(|e| KilnError::Server(format!("Watch setup failed: {}", e)))?;
        Logger::info(&format!("👀 Watching {}", self.config.root.display()));

        let outdir = self.config.root.join(&self.config.outdir);
        loop {
            let first = tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    Logger::info("👋 Stopping dev session");
                    break;
                }
            };

            let mut batch = BTreeSet::new();
            collect_paths(&first, &outdir, &mut batch);
            while let Ok(Some(event)) = tokio::time::timeout(DEBOUNCE, rx.recv()).await {
                collect_paths(&event, &outdir, &mut batch);
            }
            if batch.is_empty() {
                continue;
            }

            let session = self.clone();
            let changed: Vec<PathBuf> = batch.into_iter().collect();
            tokio::spawn(async move {
                let _ = session.rebuild(&changed).await;
            });
        }

        drop(watcher);
        Ok(())
    }
}

/// Runs on the watcher's own thread. Waits for room instead of dropping
/// events when the channel is full.
fn forward_event(tx: &mpsc::Sender<Event>, res: notify::Result<Event>) {
    match res {
        Ok(event) => {
            if tx.blocking_send(event).is_err() {
                Logger::debug("Watch channel closed, dropping file event");
            }
        }
        Err(e) => Logger::warn(&format!("File watcher error: {}", e)),
    }
}

fn collect_paths(event: &Event, outdir: &Path, batch: &mut BTreeSet<PathBuf>) {
    if should_ignore_event(event) {
        return;
    }
    for path in &event.paths {
        if !path.starts_with(outdir) && !is_ignored_path(path) {
            batch.insert(path.clone());
        }
    }
}

fn should_ignore_event(event: &Event) -> bool {
    matches!(event.kind, EventKind::Access(_) | EventKind::Other)
}

fn is_ignored_path(path: &Path) -> bool {
    let path_str = path.to_string_lossy();
    path_str.contains("/.git/")
        || path_str.contains("/node_modules/")
        || path_str.ends_with('~')
        || path_str.ends_with(".swp")
        || path_str.ends_with(".tmp")
}
