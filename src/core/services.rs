use crate::core::chunking::{ChunkPlan, ChunkingEngine};
use crate::core::context::BuildContext;
use crate::core::emission::{Emission, Emitter, OutputWriter, RenderedModules, PAGE_FILENAME};
use crate::core::graph::{GraphBuilder, ModuleGraph};
use crate::core::interfaces::*;
use crate::core::models::*;
use crate::core::pipeline::{Pipeline, Stage};
use crate::infrastructure::{ArtifactOptimizer, ProcessorSet};
use crate::utils::bundle_analysis::{check_budgets, BundleAnalysis};
use crate::utils::{KilnError, Logger, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Main build service: drives a pipeline's stages over one build context
pub struct KilnBuildService {
    fs_service: Arc<dyn FileSystemService>,
    processors: ProcessorSet,
    page_snippet: Option<String>,
}

impl KilnBuildService {
    pub fn new(fs_service: Arc<dyn FileSystemService>) -> Self {
        Self {
            fs_service,
            processors: ProcessorSet::default(),
            page_snippet: None,
        }
    }

    /// Markup injected after the script tags (the dev live-update client)
    pub fn with_page_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.page_snippet = Some(snippet.into());
        self
    }

    /// Run every stage in order. Each stage first checks the generation is
    /// still current, so a superseded build never commits output.
    pub async fn run(
        &self,
        ctx: &BuildContext,
        pipeline: &Pipeline,
        previous: Option<&BTreeMap<String, String>>,
    ) -> Result<BuildResult> {
        let started = Instant::now();
        let config = &ctx.config;
        let outdir = config.root.join(&config.outdir);
        Logger::build_start(
            &config.root.display().to_string(),
            &outdir.display().to_string(),
            config.mode.as_str(),
        );

        let mut graph = ModuleGraph::default();
        let mut plan = ChunkPlan::default();
        let mut rendered = RenderedModules::default();
        let mut emission = Emission::default();
        let mut written = Vec::new();
        let mut report_path = None;

        for stage in pipeline.stages() {
            ctx.ensure_current()?;
            if stage.commits_output() {
                Logger::debug(&format!("💾 {} (generation {} is current)", stage.label(), ctx.generation));
            } else {
                Logger::debug(&format!("▶ {}", stage.label()));
            }

            match stage {
                Stage::LoadGraph => {
                    let builder = GraphBuilder::new(self.fs_service.clone(), self.processors.clone());
                    graph = builder.build(ctx).await?;
                }
                Stage::Chunk => {
                    rendered = RenderedModules::render(ctx, &mut graph);
                    plan = ChunkingEngine::new(ctx, &graph).plan()?;
                }
                Stage::Name => {
                    let template = self.load_template(ctx).await?;
                    emission = Emitter::new(ctx, &graph, &plan, &rendered)
                        .with_page_snippet(self.page_snippet.clone())
                        .emit(template.as_deref())?;
                }
                Stage::Optimize => {
                    let optimizer = ArtifactOptimizer::new(ctx.banner(), config.minify_exclude.clone());
                    let mut artifacts = std::mem::take(&mut emission.artifacts);
                    emission.artifacts = tokio::task::spawn_blocking(move || {
                        optimizer.optimize(&mut artifacts).map(|_| artifacts)
                    })
                    .await
                    .map_err(|e| KilnError::optimization("artifacts", format!("optimizer task failed: {}", e)))??;
                }
                Stage::CheckBudgets => {
                    let warnings = check_budgets(
                        &emission.artifacts,
                        &emission.manifest,
                        &config.performance,
                        &config.public_path,
                        config.mode,
                    );
                    for warning in warnings {
                        ctx.warn(warning);
                    }
                }
                Stage::WriteAll => {
                    let writer = OutputWriter::new(self.fs_service.as_ref(), &outdir);
                    written = writer.write_all(&emission.artifacts, &emission.page).await?;
                }
                Stage::WriteChanged => {
                    let writer = OutputWriter::new(self.fs_service.as_ref(), &outdir);
                    written = match previous {
                        Some(previous) => {
                            writer
                                .write_changed(&emission.artifacts, &emission.page, previous)
                                .await?
                        }
                        None => writer.write_all(&emission.artifacts, &emission.page).await?,
                    };
                }
                Stage::Report => {
                    let analysis = BundleAnalysis::analyze(&emission.artifacts, &graph);
                    let millis = config
                        .build_timestamp
                        .map(|secs| secs * 1000)
                        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
                    let path = outdir.join(BundleAnalysis::report_filename(millis));
                    let html = analysis.generate_html(ctx.date_label());
                    self.fs_service.write_file(&path, html.as_bytes()).await?;
                    Logger::info(&format!("📊 Report: {}", path.display()));
                    report_path = Some(path);
                }
            }
        }

        Ok(BuildResult {
            generation: ctx.generation,
            module_count: graph.modules.len(),
            artifacts: emission.artifacts,
            manifest: emission.manifest,
            page: Some(emission.page),
            warnings: ctx.take_warnings(),
            written,
            report_path,
            build_time: started.elapsed(),
        })
    }

    /// Filename → fingerprint of everything a build put in the output directory
    pub fn fingerprints(result: &BuildResult) -> BTreeMap<String, String> {
        let mut fingerprints: BTreeMap<String, String> = result
            .artifacts
            .iter()
            .map(|a| (a.filename.clone(), OutputWriter::fingerprint(&a.content)))
            .collect();
        if let Some(page) = &result.page {
            fingerprints.insert(PAGE_FILENAME.to_string(), OutputWriter::fingerprint(page.as_bytes()));
        }
        fingerprints
    }

    async fn load_template(&self, ctx: &BuildContext) -> Result<Option<String>> {
        let Some(template) = &ctx.config.template else {
            return Ok(None);
        };
        let path: PathBuf = ctx.config.root.join(template);
        if !self.fs_service.file_exists(&path) {
            Logger::debug(&format!("No page template at {}, using the default", path.display()));
            return Ok(None);
        }
        self.fs_service.read_file(&path).await.map(Some)
    }
}

#[async_trait]
impl BuildService for KilnBuildService {
    async fn build(&self, config: &BuildConfig) -> Result<BuildResult> {
        let mut config = config.clone();
        config.root = config.root.canonicalize().map_err(|e| {
            KilnError::config(format!("project root {} is not accessible: {}", config.root.display(), e))
        })?;

        let ctx = BuildContext::new(Arc::new(config));
        let pipeline = Pipeline::for_mode(ctx.config.mode, ctx.config.minify);
        self.run(&ctx, &pipeline, None).await
    }
}
