use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Root-relative, `/`-separated module id as it appears in emitted code
pub type ModuleId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Development,
    Production,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Development => "development",
            Mode::Production => "production",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Mode::Production)
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "development" | "dev" => Some(Mode::Development),
            "production" | "prod" => Some(Mode::Production),
            _ => None,
        }
    }
}

/// A named root of the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub imports: Vec<String>,
    pub depend_on: Option<String>,
}

impl Entry {
    pub fn new(name: impl Into<String>, imports: Vec<String>) -> Self {
        Self {
            name: name.into(),
            imports,
            depend_on: None,
        }
    }

    pub fn depending_on(mut self, target: impl Into<String>) -> Self {
        self.depend_on = Some(target.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceBudget {
    pub max_entrypoint_size: usize,
    pub max_asset_size: usize,
}

impl Default for PerformanceBudget {
    fn default() -> Self {
        Self {
            max_entrypoint_size: 512_000,
            max_asset_size: 512_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SplitChunksConfig {
    /// Name of the chunk holding modules shared by independent entries
    pub name: String,
    pub min_size: usize,
    pub max_size: usize,
}

impl Default for SplitChunksConfig {
    fn default() -> Self {
        Self {
            name: "vendors".to_string(),
            min_size: 250_000,
            max_size: 512_000,
        }
    }
}

/// How a chunk's visible filename is formed in production
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingTier {
    /// `[name].[contenthash:8].js`
    Named,
    /// `vendors/[name].js`, digest carried as a `?v=` query
    Generic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NamingPolicy {
    pub entry: NamingTier,
    pub vendor_shared: NamingTier,
    pub on_demand: NamingTier,
    /// Per chunk-name tier, checked before the per-kind defaults
    pub overrides: BTreeMap<String, NamingTier>,
}

impl Default for NamingPolicy {
    fn default() -> Self {
        let mut overrides = BTreeMap::new();
        overrides.insert("alarm".to_string(), NamingTier::Named);
        overrides.insert("status".to_string(), NamingTier::Named);
        Self {
            entry: NamingTier::Named,
            vendor_shared: NamingTier::Generic,
            on_demand: NamingTier::Generic,
            overrides,
        }
    }
}

impl NamingPolicy {
    pub fn tier_for(&self, kind: ChunkKind, name: &str) -> NamingTier {
        if let Some(tier) = self.overrides.get(name) {
            return *tier;
        }
        match kind {
            ChunkKind::Entry => self.entry,
            ChunkKind::VendorShared => self.vendor_shared,
            ChunkKind::OnDemand => self.on_demand,
            ChunkKind::Style => NamingTier::Named,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DevServerConfig {
    pub port: u16,
    #[serde(rename = "static")]
    pub static_dir: PathBuf,
    pub compress: bool,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            port: 3090,
            static_dir: PathBuf::from("public"),
            compress: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub root: PathBuf,
    pub outdir: PathBuf,
    pub mode: Mode,
    pub entries: Vec<Entry>,
    pub template: Option<PathBuf>,
    pub public_path: String,
    pub alias: BTreeMap<String, String>,
    pub extensions: Vec<String>,
    pub target: String,
    pub performance: PerformanceBudget,
    pub split_chunks: SplitChunksConfig,
    pub naming: NamingPolicy,
    pub dev_server: DevServerConfig,
    /// Banner text; `{date}` expands to the build timestamp
    pub banner: String,
    pub minify: bool,
    pub minify_exclude: Vec<String>,
    /// Unix seconds; pins the banner date for reproducible output
    pub build_timestamp: Option<i64>,
}

pub fn default_extensions() -> Vec<String> {
    [".js", ".jsx", ".ts", ".tsx", ".json"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            outdir: PathBuf::from("dist"),
            mode: Mode::Production,
            entries: Vec::new(),
            template: None,
            public_path: "/".to_string(),
            alias: BTreeMap::new(),
            extensions: default_extensions(),
            target: "es2020".to_string(),
            performance: PerformanceBudget::default(),
            split_chunks: SplitChunksConfig::default(),
            naming: NamingPolicy::default(),
            dev_server: DevServerConfig::default(),
            banner: "Build Date :: {date}".to_string(),
            minify: true,
            minify_exclude: vec!["config/".to_string()],
            build_timestamp: None,
        }
    }
}

impl BuildConfig {
    pub fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Entries some other entry names as its `dependOn`
    pub fn depend_on_targets(&self) -> Vec<&str> {
        let mut targets: Vec<&str> = self
            .entries
            .iter()
            .filter_map(|e| e.depend_on.as_deref())
            .collect();
        targets.sort_unstable();
        targets.dedup();
        targets
    }

    pub fn is_depend_on_target(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.depend_on.as_deref() == Some(name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Script,
    Style,
    Binary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleType {
    JavaScript,
    TypeScript,
    Json,
    Css,
    Scss,
    Image,
    Font,
    Unknown,
}

impl ModuleType {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "js" | "jsx" | "mjs" | "cjs" => ModuleType::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => ModuleType::TypeScript,
            "json" => ModuleType::Json,
            "css" => ModuleType::Css,
            "scss" | "sass" => ModuleType::Scss,
            "svg" | "png" | "jpg" | "jpeg" | "gif" | "ico" | "webp" | "avif" => ModuleType::Image,
            "woff" | "woff2" | "eot" | "ttf" | "otf" => ModuleType::Font,
            _ => ModuleType::Unknown,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        Self::from_extension(path.extension().and_then(|e| e.to_str()).unwrap_or(""))
    }

    pub fn asset_kind(&self) -> Option<AssetKind> {
        match self {
            ModuleType::JavaScript | ModuleType::TypeScript | ModuleType::Json => {
                Some(AssetKind::Script)
            }
            ModuleType::Css | ModuleType::Scss => Some(AssetKind::Style),
            ModuleType::Image | ModuleType::Font => Some(AssetKind::Binary),
            ModuleType::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportKind {
    /// `import`, `export ... from`, `require()` and CSS `@import`
    Static,
    /// `import()`: seeds an on-demand chunk
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRecord {
    pub specifier: String,
    pub kind: ImportKind,
    /// Requested on-demand chunk name, from a `chunkName` comment
    pub chunk_name: Option<String>,
}

impl ImportRecord {
    pub fn new(specifier: impl Into<String>, kind: ImportKind) -> Self {
        Self {
            specifier: specifier.into(),
            kind,
            chunk_name: None,
        }
    }
}

/// Transformed form of a module
#[derive(Debug, Clone)]
pub enum ModuleOutput {
    Script(String),
    Style(String),
    Binary { filename: String, bytes: Arc<Vec<u8>> },
}

impl ModuleOutput {
    pub fn size(&self) -> usize {
        match self {
            ModuleOutput::Script(code) | ModuleOutput::Style(code) => code.len(),
            ModuleOutput::Binary { bytes, .. } => bytes.len(),
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            ModuleOutput::Script(code) | ModuleOutput::Style(code) => Some(code),
            ModuleOutput::Binary { .. } => None,
        }
    }
}

/// Result of the transform stage for a single file
#[derive(Debug, Clone)]
pub struct TransformedModule {
    pub output: ModuleOutput,
    pub imports: Vec<ImportRecord>,
}

#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub id: ModuleId,
    pub path: PathBuf,
    pub source: Arc<str>,
    pub module_type: ModuleType,
    pub imports: Vec<ImportRecord>,
    pub output: ModuleOutput,
    /// specifier → resolved module id
    pub resolved: BTreeMap<String, ModuleId>,
    /// Emitted size, filled after rendering
    pub rendered_size: usize,
}

impl ModuleInfo {
    pub fn asset_kind(&self) -> AssetKind {
        match self.output {
            ModuleOutput::Script(_) => AssetKind::Script,
            ModuleOutput::Style(_) => AssetKind::Style,
            ModuleOutput::Binary { .. } => AssetKind::Binary,
        }
    }

    /// Size used for chunk budgeting: rendered code when known, else transformed size
    pub fn size(&self) -> usize {
        if self.rendered_size > 0 {
            self.rendered_size
        } else {
            self.output.size()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkKind {
    Entry,
    VendorShared,
    OnDemand,
    Style,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Entry => "entry",
            ChunkKind::VendorShared => "vendor-shared",
            ChunkKind::OnDemand => "on-demand",
            ChunkKind::Style => "style",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub name: String,
    pub kind: ChunkKind,
    /// Members in declared order
    pub modules: Vec<ModuleId>,
    pub size: usize,
    /// Name of the chunk this part was split from (its own name when unsplit)
    pub group: String,
    pub tier: NamingTier,
    /// Modules this chunk runs on load; only the last part of an entry chunk has them
    pub startup: Vec<ModuleId>,
    pub hash: Option<String>,
}

impl Chunk {
    pub fn new(name: impl Into<String>, kind: ChunkKind, tier: NamingTier) -> Self {
        let name = name.into();
        Self {
            group: name.clone(),
            name,
            kind,
            modules: Vec::new(),
            size: 0,
            tier,
            startup: Vec::new(),
            hash: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn carries_runtime(&self) -> bool {
        !self.startup.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Script,
    Style,
    Asset,
}

/// A named file ready to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub filename: String,
    pub chunk: Option<String>,
    pub kind: ArtifactKind,
    pub tier: NamingTier,
    pub content: Vec<u8>,
    /// Digest over the named (pre-minification) content
    pub digest: String,
    pub modules: Vec<ModuleId>,
}

impl Artifact {
    pub fn size(&self) -> usize {
        self.content.len()
    }

    /// URL the page and runtime use to load this artifact
    pub fn reference(&self, public_path: &str, mode: Mode) -> String {
        let mut url = format!("{}{}", public_path, self.filename);
        if mode.is_production() && self.tier == NamingTier::Generic && self.kind != ArtifactKind::Asset {
            url.push_str("?v=");
            url.push_str(&self.digest);
        }
        url
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrypointFiles {
    pub scripts: Vec<String>,
    pub styles: Vec<String>,
}

/// Name → filename mapping consumed by the page template
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputManifest {
    pub chunks: BTreeMap<String, String>,
    pub entrypoints: BTreeMap<String, EntrypointFiles>,
    pub assets: BTreeMap<ModuleId, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildWarning {
    SizeConstraint {
        chunk: String,
        module: ModuleId,
        size: usize,
        max_size: usize,
    },
    AssetSize {
        artifact: String,
        size: usize,
        limit: usize,
    },
    EntrypointSize {
        entry: String,
        size: usize,
        limit: usize,
    },
    StaleModule {
        path: PathBuf,
        message: String,
    },
}

impl std::fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildWarning::SizeConstraint {
                chunk,
                module,
                size,
                max_size,
            } => write!(
                f,
                "chunk '{}' keeps module {} alone at {} bytes, above maxSize {}",
                chunk, module, size, max_size
            ),
            BuildWarning::AssetSize {
                artifact,
                size,
                limit,
            } => write!(
                f,
                "asset {} is {} bytes, above the {} byte asset budget",
                artifact, size, limit
            ),
            BuildWarning::EntrypointSize { entry, size, limit } => write!(
                f,
                "entrypoint '{}' loads {} bytes, above the {} byte entrypoint budget",
                entry, size, limit
            ),
            BuildWarning::StaleModule { path, message } => write!(
                f,
                "serving stale output for {}: {}",
                path.display(),
                message
            ),
        }
    }
}

#[derive(Debug, Default)]
pub struct BuildResult {
    pub generation: u64,
    pub artifacts: Vec<Artifact>,
    pub manifest: OutputManifest,
    pub page: Option<String>,
    pub warnings: Vec<BuildWarning>,
    /// Filenames written by this generation
    pub written: Vec<String>,
    pub report_path: Option<PathBuf>,
    pub module_count: usize,
    pub build_time: std::time::Duration,
}

impl BuildResult {
    pub fn artifact(&self, filename: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.filename == filename)
    }

    pub fn chunk_artifact(&self, chunk: &str) -> Option<&Artifact> {
        self.artifacts
            .iter()
            .find(|a| a.chunk.as_deref() == Some(chunk) && a.kind == ArtifactKind::Script)
    }
}
