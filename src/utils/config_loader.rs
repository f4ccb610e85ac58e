use crate::core::models::{
    BuildConfig, DevServerConfig, Entry, Mode, NamingPolicy, PerformanceBudget, SplitChunksConfig,
};
use crate::core::naming::sanitize_chunk_name;
use crate::utils::{KilnError, Logger, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_FILENAME: &str = "kiln.config.json";
const DEFAULT_TEMPLATE: &str = "public/index.html";

/// One value of the `entry` map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryDescriptor {
    Single(String),
    List(Vec<String>),
    Detailed(DetailedEntry),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedEntry {
    pub import: ImportList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depend_on: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImportList {
    One(String),
    Many(Vec<String>),
}

impl ImportList {
    fn into_vec(self) -> Vec<String> {
        match self {
            ImportList::One(import) => vec![import],
            ImportList::Many(imports) => imports,
        }
    }
}

impl EntryDescriptor {
    fn into_entry(self, name: &str) -> Entry {
        match self {
            EntryDescriptor::Single(import) => Entry::new(name, vec![import]),
            EntryDescriptor::List(imports) => Entry::new(name, imports),
            EntryDescriptor::Detailed(detailed) => Entry {
                name: name.to_string(),
                imports: detailed.import.into_vec(),
                depend_on: detailed.depend_on,
            },
        }
    }
}

/// Configuration file format (kiln.config.json). Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KilnConfig {
    /// Entry name → descriptor, in declaration order
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<serde_json::Map<String, serde_json::Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub outdir: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<BTreeMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<PerformanceBudget>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_chunks: Option<SplitChunksConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub naming: Option<NamingPolicy>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_server: Option<DevServerConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub minify: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub minify_exclude: Option<Vec<String>>,

    /// Unix seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_timestamp: Option<i64>,
}

impl KilnConfig {
    pub fn entries(&self) -> Result<Vec<Entry>> {
        let Some(map) = &self.entry else {
            return Ok(Vec::new());
        };
        map.iter()
            .map(|(name, value)| {
                if sanitize_chunk_name(name).as_deref() != Some(name.as_str()) {
                    return Err(KilnError::config(format!(
                        "entry name '{}' is not usable as a file name",
                        name
                    )));
                }
                serde_json::from_value::<EntryDescriptor>(value.clone())
                    .map(|descriptor| descriptor.into_entry(name))
                    .map_err(|e| KilnError::config(format!("invalid entry '{}': {}", name, e)))
            })
            .collect()
    }
}

/// Flags given on the command line; they win over the file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub outdir: Option<String>,
    pub minify: Option<bool>,
    pub port: Option<u16>,
}

/// Config loader that supports config files with CLI override
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load kiln.config.json from the project root if present
    pub fn load_from_file(root: &Path) -> Result<Option<KilnConfig>> {
        let config_path = root.join(CONFIG_FILENAME);

        if !config_path.exists() {
            Logger::debug(&format!("No {} found, using defaults", CONFIG_FILENAME));
            return Ok(None);
        }

        Logger::debug(&format!("Loading config from {}", config_path.display()));
        let content = std::fs::read_to_string(&config_path)?;
        let config: KilnConfig = serde_json::from_str(&content)
            .map_err(|e| KilnError::config(format!("Failed to parse {}: {}", CONFIG_FILENAME, e)))?;

        Ok(Some(config))
    }

    /// Merge file config with CLI arguments (CLI > file > defaults)
    pub fn merge_with_cli(
        file_config: Option<KilnConfig>,
        root: PathBuf,
        mode: Mode,
        overrides: &CliOverrides,
    ) -> Result<BuildConfig> {
        let file = file_config.unwrap_or_default();
        let defaults = BuildConfig::default();

        let entries = file.entries()?;
        if entries.is_empty() {
            return Err(KilnError::config(format!(
                "no entries configured; add an \"entry\" map to {}",
                CONFIG_FILENAME
            )));
        }

        let mut dev_server = file.dev_server.unwrap_or_default();
        if let Some(port) = overrides.port {
            dev_server.port = port;
        }

        let outdir = overrides
            .outdir
            .clone()
            .or(file.outdir)
            .map(PathBuf::from)
            .unwrap_or(defaults.outdir);

        Ok(BuildConfig {
            root,
            outdir,
            mode,
            entries,
            template: Some(PathBuf::from(file.template.as_deref().unwrap_or(DEFAULT_TEMPLATE))),
            public_path: file.public_path.unwrap_or(defaults.public_path),
            alias: file.alias.unwrap_or(defaults.alias),
            extensions: file.extensions.unwrap_or(defaults.extensions),
            target: file.target.unwrap_or(defaults.target),
            performance: file.performance.unwrap_or(defaults.performance),
            split_chunks: file.split_chunks.unwrap_or(defaults.split_chunks),
            naming: file.naming.unwrap_or(defaults.naming),
            dev_server,
            banner: file.banner.unwrap_or(defaults.banner),
            minify: overrides.minify.or(file.minify).unwrap_or(defaults.minify),
            minify_exclude: file.minify_exclude.unwrap_or(defaults.minify_exclude),
            build_timestamp: file.build_timestamp,
        })
    }

    /// Load the file under `root` and merge it with the command line
    pub fn load(root: &Path, mode: Mode, overrides: &CliOverrides) -> Result<BuildConfig> {
        let file = Self::load_from_file(root)?;
        Self::merge_with_cli(file, root.to_path_buf(), mode, overrides)
    }
}
