use crate::core::chunking::ChunkPlan;
use crate::core::context::BuildContext;
use crate::core::graph::ModuleGraph;
use crate::core::interfaces::FileSystemService;
use crate::core::models::*;
use crate::core::naming;
use crate::infrastructure::processors::{LightningCssProcessor, ModuleLinker};
use crate::infrastructure::runtime;
use crate::utils::{Logger, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

pub const STYLES_MARKER: &str = "<!-- kiln:styles -->";
pub const SCRIPTS_MARKER: &str = "<!-- kiln:scripts -->";
pub const PAGE_FILENAME: &str = "index.html";

const DEFAULT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>kiln</title>
</head>
<body>
<div id="root"></div>
</body>
</html>
"#;

/// Registry-ready text of every script and style module
#[derive(Debug, Default)]
pub struct RenderedModules {
    bodies: BTreeMap<ModuleId, String>,
}

impl RenderedModules {
    /// Swap specifiers for module ids (scripts) and asset URLs (scripts and styles).
    /// Records each module's rendered size on the graph for chunk budgeting.
    pub fn render(ctx: &BuildContext, graph: &mut ModuleGraph) -> Self {
        let public_path = ctx.config.public_path.clone();
        let asset_urls: HashMap<ModuleId, String> = graph
            .modules
            .values()
            .filter_map(|m| match &m.output {
                ModuleOutput::Binary { filename, .. } => {
                    Some((m.id.clone(), format!("{}{}", public_path, filename)))
                }
                _ => None,
            })
            .collect();
        let kinds: HashMap<ModuleId, AssetKind> = graph
            .modules
            .values()
            .map(|m| (m.id.clone(), m.asset_kind()))
            .collect();

        let mut bodies = BTreeMap::new();
        for module in graph.modules.values_mut() {
            let body = match &module.output {
                ModuleOutput::Script(code) => {
                    let body = ModuleLinker::rewrite_requires(code, |specifier, dynamic| {
                        let target = module.resolved.get(specifier)?;
                        let quoted = serde_json::to_string(target).ok()?;
                        Some(match (kinds.get(target)?, dynamic) {
                            (AssetKind::Script, false) => format!("require({})", quoted),
                            (AssetKind::Script | AssetKind::Style, true) => format!("require.e({})", quoted),
                            (AssetKind::Style, false) => "void 0".to_string(),
                            (AssetKind::Binary, false) => serde_json::to_string(asset_urls.get(target)?).ok()?,
                            (AssetKind::Binary, true) => format!(
                                "Promise.resolve({})",
                                serde_json::to_string(asset_urls.get(target)?).ok()?
                            ),
                        })
                    });
                    runtime::module_factory(&module.id, &body)
                }
                ModuleOutput::Style(css) => {
                    let css = LightningCssProcessor::rewrite_urls(css, |reference| {
                        module
                            .resolved
                            .get(reference)
                            .and_then(|target| asset_urls.get(target))
                            .cloned()
                    });
                    format!("{}\n", css.trim_end())
                }
                ModuleOutput::Binary { .. } => continue,
            };
            module.rendered_size = body.len();
            bodies.insert(module.id.clone(), body);
        }

        Self { bodies }
    }

    pub fn body(&self, id: &str) -> &str {
        self.bodies.get(id).map(String::as_str).unwrap_or("")
    }
}

/// Output of the naming stage
#[derive(Debug, Default)]
pub struct Emission {
    pub artifacts: Vec<Artifact>,
    pub manifest: OutputManifest,
    pub page: String,
}

/// Names chunks by content and builds the page. Chunks without embedded
/// references are named first; runtime chunks embed the on-demand chunk map,
/// so they are rendered and named last.
pub struct Emitter<'a> {
    ctx: &'a BuildContext,
    graph: &'a ModuleGraph,
    plan: &'a ChunkPlan,
    rendered: &'a RenderedModules,
    page_snippet: Option<String>,
}

impl<'a> Emitter<'a> {
    pub fn new(
        ctx: &'a BuildContext,
        graph: &'a ModuleGraph,
        plan: &'a ChunkPlan,
        rendered: &'a RenderedModules,
    ) -> Self {
        Self {
            ctx,
            graph,
            plan,
            rendered,
            page_snippet: None,
        }
    }

    /// Extra markup appended before `</body>`, e.g. the live-update client
    pub fn with_page_snippet(mut self, snippet: Option<String>) -> Self {
        self.page_snippet = snippet;
        self
    }

    pub fn emit(&self, template: Option<&str>) -> Result<Emission> {
        let _timer = crate::utils::Timer::start("Naming artifacts");
        let mode = self.ctx.config.mode;
        let mut artifacts: Vec<Artifact> = Vec::new();
        let mut by_chunk: HashMap<(String, ArtifactKind), usize> = HashMap::new();

        let mut seen_assets = HashSet::new();
        for module in self.graph.modules.values() {
            if let ModuleOutput::Binary { filename, bytes } = &module.output {
                if seen_assets.insert(filename.clone()) {
                    artifacts.push(Artifact {
                        filename: filename.clone(),
                        chunk: None,
                        kind: ArtifactKind::Asset,
                        tier: NamingTier::Named,
                        content: bytes.as_ref().clone(),
                        digest: naming::content_digest(bytes),
                        modules: vec![module.id.clone()],
                    });
                }
            }
        }

        for chunk in self.plan.chunks.iter().filter(|c| !c.carries_runtime() && !c.is_empty()) {
            let content = self.render_script_chunk(chunk, None);
            by_chunk.insert((chunk.name.clone(), ArtifactKind::Script), artifacts.len());
            artifacts.push(self.name_artifact(chunk, ArtifactKind::Script, content, mode));
        }
        for style in &self.plan.styles {
            let content: String = style.modules.iter().map(|id| self.rendered.body(id)).collect();
            by_chunk.insert((style.name.clone(), ArtifactKind::Style), artifacts.len());
            artifacts.push(self.name_artifact(style, ArtifactKind::Style, content, mode));
        }

        let initial = self.initial_chunks();
        let chunk_map = self.on_demand_map(&artifacts, &by_chunk, &initial);
        for chunk in self.plan.chunks.iter().filter(|c| c.carries_runtime()) {
            let content = self.render_script_chunk(chunk, Some(&chunk_map));
            by_chunk.insert((chunk.name.clone(), ArtifactKind::Script), artifacts.len());
            artifacts.push(self.name_artifact(chunk, ArtifactKind::Script, content, mode));
        }

        let manifest = self.manifest(&artifacts, &by_chunk, &initial);
        let page = self.page(template, &manifest);

        Ok(Emission {
            artifacts,
            manifest,
            page,
        })
    }

    fn render_script_chunk(&self, chunk: &Chunk, chunk_map: Option<&BTreeMap<ModuleId, Vec<String>>>) -> String {
        let mut out = String::new();
        if chunk_map.is_some() {
            out.push_str(&runtime::runtime_source());
        }
        out.push_str(&runtime::chunk_header(&[chunk.name.as_str()]));
        for id in &chunk.modules {
            out.push_str(self.rendered.body(id));
        }
        out.push_str(runtime::CHUNK_FOOTER);
        if let Some(map) = chunk_map {
            out.push_str(&runtime::startup(map, &chunk.startup));
        }
        out
    }

    fn name_artifact(&self, chunk: &Chunk, kind: ArtifactKind, content: String, mode: Mode) -> Artifact {
        let digest = naming::content_digest(content.as_bytes());
        let ext = if kind == ArtifactKind::Style { ".css" } else { ".js" };
        let filename = naming::artifact_filename(kind, chunk.tier, mode, &chunk.name, &digest, ext);
        Logger::debug(&format!("📝 {} → {}", chunk.name, filename));

        Artifact {
            filename,
            chunk: Some(chunk.name.clone()),
            kind,
            tier: chunk.tier,
            content: content.into_bytes(),
            digest,
            modules: chunk.modules.clone(),
        }
    }

    /// Chunk groups each entry loads up front, in load order. dependOn targets
    /// come first, then the shared split chunk, then the entry's own parts.
    fn initial_chunks(&self) -> BTreeMap<String, Vec<String>> {
        let config = &self.ctx.config;
        let mut initial = BTreeMap::new();

        for entry in &config.entries {
            let mut needed: HashSet<&str> = HashSet::new();
            let mut current = Some(entry);
            let mut guard = 0;
            while let Some(e) = current {
                for id in self.graph.entry_closure.get(&e.name).into_iter().flatten() {
                    if let Some(chunk) = self.plan.module_chunk.get(id) {
                        needed.insert(chunk.as_str());
                    }
                }
                needed.insert(e.name.as_str());
                current = e.depend_on.as_deref().and_then(|t| config.entry(t));
                guard += 1;
                if guard > config.entries.len() {
                    break;
                }
            }

            let mut groups: Vec<String> = Vec::new();
            for chunk in self.plan.all() {
                let member = needed.contains(chunk.name.as_str()) || needed.contains(chunk.group.as_str());
                if member && !groups.contains(&chunk.group) {
                    groups.push(chunk.group.clone());
                }
            }
            initial.insert(entry.name.clone(), groups);
        }

        initial
    }

    /// On-demand root → files to load before requiring it
    fn on_demand_map(
        &self,
        artifacts: &[Artifact],
        by_chunk: &HashMap<(String, ArtifactKind), usize>,
        initial: &BTreeMap<String, Vec<String>>,
    ) -> BTreeMap<ModuleId, Vec<String>> {
        let (public_path, mode) = (self.ctx.config.public_path.as_str(), self.ctx.config.mode);
        let preloaded: HashSet<&str> = initial.values().flatten().map(String::as_str).collect();
        let mut map = BTreeMap::new();

        for root in &self.graph.on_demand_roots {
            let closure: HashSet<&str> = self
                .graph
                .on_demand_closure
                .get(&root.module)
                .into_iter()
                .flatten()
                .map(String::as_str)
                .collect();

            let mut files = Vec::new();
            for (chunk, kind) in self
                .plan
                .chunks
                .iter()
                .map(|c| (c, ArtifactKind::Script))
                .chain(self.plan.styles.iter().map(|c| (c, ArtifactKind::Style)))
            {
                if preloaded.contains(chunk.group.as_str())
                    || !chunk.modules.iter().any(|id| closure.contains(id.as_str()))
                {
                    continue;
                }
                if let Some(&index) = by_chunk.get(&(chunk.name.clone(), kind)) {
                    files.push(artifacts[index].reference(public_path, mode));
                }
            }
            map.insert(root.module.clone(), files);
        }

        map
    }

    fn manifest(
        &self,
        artifacts: &[Artifact],
        by_chunk: &HashMap<(String, ArtifactKind), usize>,
        initial: &BTreeMap<String, Vec<String>>,
    ) -> OutputManifest {
        let (public_path, mode) = (self.ctx.config.public_path.as_str(), self.ctx.config.mode);
        let mut manifest = OutputManifest::default();

        for artifact in artifacts {
            match (&artifact.chunk, artifact.kind) {
                (Some(chunk), ArtifactKind::Script) => {
                    manifest.chunks.insert(chunk.clone(), artifact.filename.clone());
                }
                (Some(chunk), ArtifactKind::Style) => {
                    manifest.chunks.insert(format!("{}.css", chunk), artifact.filename.clone());
                }
                _ => {
                    for id in &artifact.modules {
                        manifest.assets.insert(id.clone(), artifact.filename.clone());
                    }
                }
            }
        }

        for (entry, groups) in initial {
            let mut files = EntrypointFiles::default();
            for group in groups {
                for part in self.plan.parts_of(group) {
                    if let Some(&i) = by_chunk.get(&(part.name.clone(), ArtifactKind::Script)) {
                        files.scripts.push(artifacts[i].reference(public_path, mode));
                    }
                }
                for part in self.plan.style_parts_of(group) {
                    if let Some(&i) = by_chunk.get(&(part.name.clone(), ArtifactKind::Style)) {
                        files.styles.push(artifacts[i].reference(public_path, mode));
                    }
                }
            }
            manifest.entrypoints.insert(entry.clone(), files);
        }

        manifest
    }

    /// Inject tags for every non-target entry, in declaration order, without repeats
    fn page(&self, template: Option<&str>, manifest: &OutputManifest) -> String {
        let config = &self.ctx.config;
        let mut scripts: Vec<&str> = Vec::new();
        let mut styles: Vec<&str> = Vec::new();

        for entry in config.entries.iter().filter(|e| !config.is_depend_on_target(&e.name)) {
            if let Some(files) = manifest.entrypoints.get(&entry.name) {
                for script in &files.scripts {
                    if !scripts.contains(&script.as_str()) {
                        scripts.push(script);
                    }
                }
                for style in &files.styles {
                    if !styles.contains(&style.as_str()) {
                        styles.push(style);
                    }
                }
            }
        }

        let style_tags: String = styles
            .iter()
            .map(|href| format!("<link rel=\"stylesheet\" href=\"{}\">\n", href))
            .collect();
        let mut script_tags: String = scripts
            .iter()
            .map(|src| format!("<script defer src=\"{}\"></script>\n", src))
            .collect();
        if let Some(snippet) = &self.page_snippet {
            script_tags.push_str(snippet);
        }

        let template = template.unwrap_or(DEFAULT_TEMPLATE);
        let page = inject(template, STYLES_MARKER, "</head>", &style_tags);
        inject(&page, SCRIPTS_MARKER, "</body>", &script_tags)
    }
}

/// Replace `marker`, else insert before `fallback`, else append
fn inject(page: &str, marker: &str, fallback: &str, tags: &str) -> String {
    if page.contains(marker) {
        return page.replacen(marker, tags.trim_end(), 1);
    }
    match page.rfind(fallback) {
        Some(at) => format!("{}{}{}", &page[..at], tags, &page[at..]),
        None => format!("{}{}", page, tags),
    }
}

/// Writes artifacts and the page under the output directory
pub struct OutputWriter<'a> {
    fs: &'a dyn FileSystemService,
    outdir: &'a Path,
}

impl<'a> OutputWriter<'a> {
    pub fn new(fs: &'a dyn FileSystemService, outdir: &'a Path) -> Self {
        Self { fs, outdir }
    }

    /// Digest of the bytes actually on disk, used to diff dev generations
    pub fn fingerprint(content: &[u8]) -> String {
        naming::content_digest(content)
    }

    /// Clear the directory and write everything
    pub async fn write_all(&self, artifacts: &[Artifact], page: &str) -> Result<Vec<String>> {
        let _timer = crate::utils::Timer::start("Writing output");
        self.fs.reset_directory(self.outdir).await?;

        let mut written = Vec::with_capacity(artifacts.len() + 1);
        for artifact in artifacts {
            self.fs
                .write_file(&self.outdir.join(&artifact.filename), &artifact.content)
                .await?;
            written.push(artifact.filename.clone());
        }
        self.fs
            .write_file(&self.outdir.join(PAGE_FILENAME), page.as_bytes())
            .await?;
        written.push(PAGE_FILENAME.to_string());
        Ok(written)
    }

    /// Write files whose bytes differ from `previous` and delete the ones that vanished
    pub async fn write_changed(
        &self,
        artifacts: &[Artifact],
        page: &str,
        previous: &BTreeMap<String, String>,
    ) -> Result<Vec<String>> {
        let mut written = Vec::new();
        let mut current: HashSet<&str> = HashSet::new();
        let files = artifacts
            .iter()
            .map(|a| (a.filename.as_str(), a.content.as_slice()))
            .chain(std::iter::once((PAGE_FILENAME, page.as_bytes())));

        for (filename, content) in files {
            current.insert(filename);
            if previous.get(filename) == Some(&Self::fingerprint(content)) {
                continue;
            }
            self.fs.write_file(&self.outdir.join(filename), content).await?;
            written.push(filename.to_string());
        }

        for stale in previous.keys().filter(|f| !current.contains(f.as_str())) {
            self.fs.remove_file(&self.outdir.join(stale)).await?;
        }

        Ok(written)
    }
}
