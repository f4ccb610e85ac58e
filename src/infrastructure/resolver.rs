use crate::utils::{KilnError, PathAliasResolver, Result};
use dashmap::DashMap;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Package.json fields that matter for browser bundling
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageJson {
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub browser: Option<BrowserField>,
    #[serde(default)]
    pub exports: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BrowserField {
    String(String),
    Object(HashMap<String, serde_json::Value>),
}

/// Condition names tried, in order, inside a package `exports` map
const EXPORT_CONDITIONS: &[&str] = &["browser", "import", "module", "default", "require"];

/// Node-style module resolution with aliases and a per-build cache
pub struct ModuleResolver {
    root: PathBuf,
    aliases: PathAliasResolver,
    extensions: Vec<String>,
    cache: DashMap<(PathBuf, String), PathBuf>,
    package_cache: DashMap<PathBuf, Option<PackageJson>>,
}

impl ModuleResolver {
    pub fn new(root: PathBuf, aliases: BTreeMap<String, String>, extensions: Vec<String>) -> Self {
        Self {
            aliases: PathAliasResolver::new(aliases, root.clone()),
            root,
            extensions,
            cache: DashMap::new(),
            package_cache: DashMap::new(),
        }
    }

    /// Resolve `specifier` as imported from the file `importer`.
    /// Entry specifiers use a path inside the project root as importer.
    pub fn resolve(&self, specifier: &str, importer: &Path) -> Result<PathBuf> {
        let base_dir = importer.parent().unwrap_or(&self.root).to_path_buf();
        let key = (base_dir.clone(), specifier.to_string());
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.clone());
        }

        let resolved = self
            .resolve_uncached(specifier, &base_dir)
            .ok_or_else(|| KilnError::resolution(specifier, importer))?;
        let resolved = resolved.canonicalize().unwrap_or(resolved);

        self.cache.insert(key, resolved.clone());
        Ok(resolved)
    }

    fn resolve_uncached(&self, specifier: &str, base_dir: &Path) -> Option<PathBuf> {
        let specifier = specifier.split(['?', '#']).next().unwrap_or(specifier);

        if let Some(aliased) = self.aliases.resolve(specifier) {
            return self.resolve_file_or_directory(&aliased);
        }

        if specifier.starts_with("./") || specifier.starts_with("../") || specifier == "." || specifier == ".." {
            return self.resolve_file_or_directory(&base_dir.join(specifier));
        }

        if let Some(rooted) = specifier.strip_prefix('/') {
            return self.resolve_file_or_directory(&self.root.join(rooted));
        }

        self.resolve_node_module(specifier, base_dir)
    }

    /// Walk up from `base_dir` looking for `node_modules/<package>`
    fn resolve_node_module(&self, specifier: &str, base_dir: &Path) -> Option<PathBuf> {
        let (pkg_name, subpath) = Self::parse_package_specifier(specifier);
        let mut current = Some(base_dir);

        while let Some(dir) = current {
            let package_dir = dir.join("node_modules").join(&pkg_name);
            if package_dir.is_dir() {
                if let Some(entry) = self.resolve_package_entry(&package_dir, subpath.as_deref()) {
                    return Some(entry);
                }
            }
            current = dir.parent();
        }

        None
    }

    /// Split `@scope/pkg/sub/path` into (`@scope/pkg`, `sub/path`)
    pub fn parse_package_specifier(specifier: &str) -> (String, Option<String>) {
        let segments = if specifier.starts_with('@') { 2 } else { 1 };
        let mut parts = specifier.splitn(segments + 1, '/');
        let name: Vec<&str> = parts.by_ref().take(segments).collect();
        let rest = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
        (name.join("/"), rest)
    }

    fn resolve_package_entry(&self, package_dir: &Path, subpath: Option<&str>) -> Option<PathBuf> {
        let package = self.read_package_json(&package_dir.join("package.json"));

        if let Some(exports) = package.as_ref().and_then(|p| p.exports.as_ref()) {
            let key = match subpath {
                Some(sub) => format!("./{}", sub),
                None => ".".to_string(),
            };
            if let Some(target) = Self::match_exports(exports, &key) {
                if let Some(resolved) = self.resolve_as_file(&package_dir.join(target.trim_start_matches("./"))) {
                    return Some(resolved);
                }
            }
        }

        if let Some(sub) = subpath {
            return self.resolve_file_or_directory(&package_dir.join(sub));
        }

        if let Some(package) = package {
            let candidates = [
                match &package.browser {
                    Some(BrowserField::String(path)) => Some(path.clone()),
                    _ => None,
                },
                package.module.clone(),
                package.main.clone(),
            ];
            for candidate in candidates.into_iter().flatten() {
                if let Some(resolved) = self.resolve_file_or_directory(&package_dir.join(&candidate)) {
                    return Some(resolved);
                }
            }
        }

        self.resolve_index(package_dir)
    }

    /// Pick a target path out of an `exports` value for the given subpath key
    fn match_exports(exports: &serde_json::Value, key: &str) -> Option<String> {
        use serde_json::Value;

        match exports {
            Value::String(target) if key == "." => Some(target.clone()),
            Value::Object(map) => {
                let is_subpath_map = map.keys().any(|k| k.starts_with('.'));
                if is_subpath_map {
                    map.get(key).and_then(Self::match_conditions)
                } else if key == "." {
                    Self::match_conditions(exports)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn match_conditions(value: &serde_json::Value) -> Option<String> {
        use serde_json::Value;

        match value {
            Value::String(target) => Some(target.clone()),
            Value::Object(map) => EXPORT_CONDITIONS
                .iter()
                .filter_map(|condition| map.get(*condition))
                .find_map(Self::match_conditions),
            Value::Array(items) => items.iter().find_map(Self::match_conditions),
            _ => None,
        }
    }

    fn resolve_file_or_directory(&self, path: &Path) -> Option<PathBuf> {
        if let Some(file) = self.resolve_as_file(path) {
            return Some(file);
        }

        if !path.is_dir() {
            return None;
        }

        if let Some(main) = self
            .read_package_json(&path.join("package.json"))
            .and_then(|p| p.main)
        {
            if let Some(resolved) = self.resolve_as_file(&path.join(main)) {
                return Some(resolved);
            }
        }

        self.resolve_index(path)
    }

    fn resolve_index(&self, dir: &Path) -> Option<PathBuf> {
        self.extensions
            .iter()
            .map(|ext| dir.join(format!("index{}", ext)))
            .find(|candidate| candidate.is_file())
    }

    /// Exact file first, then the extension-priority list appended to the name
    fn resolve_as_file(&self, path: &Path) -> Option<PathBuf> {
        if path.is_file() {
            return Some(path.to_path_buf());
        }

        let file_name = path.file_name()?.to_string_lossy().to_string();
        self.extensions
            .iter()
            .map(|ext| path.with_file_name(format!("{}{}", file_name, ext)))
            .find(|candidate| candidate.is_file())
    }

    fn read_package_json(&self, path: &Path) -> Option<PackageJson> {
        if let Some(cached) = self.package_cache.get(path) {
            return cached.clone();
        }

        let package = std::fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str::<PackageJson>(&content).ok());
        self.package_cache.insert(path.to_path_buf(), package.clone());
        package
    }
}
