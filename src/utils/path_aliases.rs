use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use crate::utils::Logger;

/// Maps logical import prefixes (e.g. `@components`) onto physical directories
#[derive(Debug, Clone)]
pub struct PathAliasResolver {
    aliases: BTreeMap<String, String>,
    root: PathBuf,
}

impl PathAliasResolver {
    pub fn new(aliases: BTreeMap<String, String>, root: PathBuf) -> Self {
        if !aliases.is_empty() {
            Logger::debug(&format!("🔗 Initialized PathAliasResolver with {} aliases", aliases.len()));
            for (alias, target) in &aliases {
                Logger::debug(&format!("  {} → {}", alias, target));
            }
        }

        Self { aliases, root }
    }

    /// Rewrite an aliased specifier to a filesystem path.
    /// Returns None when no alias applies. The longest matching alias wins.
    pub fn resolve(&self, import_path: &str) -> Option<PathBuf> {
        let (alias, target) = self
            .aliases
            .iter()
            .filter(|(alias, _)| Self::matches(alias, import_path))
            .max_by_key(|(alias, _)| alias.len())?;

        let base = self.resolve_target(target);
        let rest = import_path[alias.len()..].trim_start_matches('/');
        let resolved = if rest.is_empty() { base } else { base.join(rest) };

        Logger::debug(&format!("🔗 Resolved alias: {} → {}", import_path, resolved.display()));
        Some(resolved)
    }

    fn matches(alias: &str, import_path: &str) -> bool {
        import_path == alias
            || (import_path.starts_with(alias) && import_path[alias.len()..].starts_with('/'))
    }

    fn resolve_target(&self, target: &str) -> PathBuf {
        let path = Path::new(target);

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(target.strip_prefix("./").unwrap_or(target))
        }
    }
}
