use crate::core::context::BuildContext;
use crate::core::interfaces::FileSystemService;
use crate::core::models::*;
use crate::core::naming;
use crate::infrastructure::ProcessorSet;
use crate::utils::{KilnError, Logger, Result, TransformCache};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

/// Target of a dynamic import, traversed like an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnDemandRoot {
    pub module: ModuleId,
    /// Chunk name from a `chunkName` comment, else derived from the module id
    pub name: String,
}

/// Reachability facts every later stage reads
#[derive(Debug, Default)]
pub struct ModuleGraph {
    pub modules: BTreeMap<ModuleId, ModuleInfo>,
    /// Entry name → its listed modules, resolved, in declaration order
    pub entry_modules: BTreeMap<String, Vec<ModuleId>>,
    /// Entry name → static closure in depth-first pre-order
    pub entry_closure: BTreeMap<String, Vec<ModuleId>>,
    /// Module → entries reaching it through static edges
    pub reached_by: BTreeMap<ModuleId, BTreeSet<String>>,
    pub on_demand_roots: Vec<OnDemandRoot>,
    /// On-demand root module → static closure in pre-order
    pub on_demand_closure: BTreeMap<ModuleId, Vec<ModuleId>>,
    /// Every reached module, dependencies before dependents
    pub postorder: Vec<ModuleId>,
}

impl ModuleGraph {
    pub fn module(&self, id: &str) -> Option<&ModuleInfo> {
        self.modules.get(id)
    }

    /// Targets of static edges, in import order
    pub fn static_targets(&self, id: &str) -> Vec<ModuleId> {
        self.edge_targets(id, ImportKind::Static)
    }

    fn edge_targets(&self, id: &str, kind: ImportKind) -> Vec<ModuleId> {
        let Some(module) = self.modules.get(id) else {
            return Vec::new();
        };
        let mut targets: Vec<ModuleId> = Vec::new();
        for import in module.imports.iter().filter(|i| i.kind == kind) {
            if let Some(target) = module.resolved.get(&import.specifier) {
                if !targets.contains(target) {
                    targets.push(target.clone());
                }
            }
        }
        targets
    }

    pub fn postorder_index(&self) -> HashMap<&str, usize> {
        self.postorder
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect()
    }

    /// Pre-order walk over static edges from `roots`
    fn walk(&self, roots: &[ModuleId], postorder: &mut Vec<ModuleId>, post_seen: &mut HashSet<ModuleId>) -> Vec<ModuleId> {
        let mut visited: HashSet<ModuleId> = HashSet::new();
        let mut order = Vec::new();

        for root in roots {
            if !self.modules.contains_key(root) || !visited.insert(root.clone()) {
                continue;
            }
            order.push(root.clone());
            let mut stack: Vec<(ModuleId, Vec<ModuleId>, usize)> =
                vec![(root.clone(), self.static_targets(root), 0)];

            while let Some((id, children, next)) = stack.last_mut() {
                if *next < children.len() {
                    let child = children[*next].clone();
                    *next += 1;
                    if self.modules.contains_key(&child) && visited.insert(child.clone()) {
                        order.push(child.clone());
                        let grandchildren = self.static_targets(&child);
                        stack.push((child, grandchildren, 0));
                    }
                } else {
                    let finished = id.clone();
                    stack.pop();
                    if post_seen.insert(finished.clone()) {
                        postorder.push(finished);
                    }
                }
            }
        }

        order
    }

    /// Record entry closures, reached-by sets, on-demand roots and the global post-order
    fn order(&mut self, entries: &[Entry]) {
        let mut postorder = Vec::new();
        let mut post_seen = HashSet::new();

        for entry in entries {
            let roots = self.entry_modules.get(&entry.name).cloned().unwrap_or_default();
            let closure = self.walk(&roots, &mut postorder, &mut post_seen);
            for id in &closure {
                self.reached_by
                    .entry(id.clone())
                    .or_default()
                    .insert(entry.name.clone());
            }
            self.discover_on_demand_roots(&closure);
            self.entry_closure.insert(entry.name.clone(), closure);
        }

        let mut index = 0;
        while index < self.on_demand_roots.len() {
            let root = self.on_demand_roots[index].module.clone();
            let closure = self.walk(std::slice::from_ref(&root), &mut postorder, &mut post_seen);
            self.discover_on_demand_roots(&closure);
            self.on_demand_closure.insert(root, closure);
            index += 1;
        }

        self.postorder = postorder;
    }

    fn discover_on_demand_roots(&mut self, closure: &[ModuleId]) {
        for id in closure {
            let Some(module) = self.modules.get(id) else {
                continue;
            };
            let discovered: Vec<OnDemandRoot> = module
                .imports
                .iter()
                .filter(|i| i.kind == ImportKind::Dynamic)
                .filter_map(|import| {
                    let target = module.resolved.get(&import.specifier)?;
                    Some(OnDemandRoot {
                        module: target.clone(),
                        name: import
                            .chunk_name
                            .as_deref()
                            .and_then(naming::sanitize_chunk_name)
                            .unwrap_or_else(|| chunk_name_for(target)),
                    })
                })
                .collect();

            for root in discovered {
                if !self.on_demand_roots.iter().any(|r| r.module == root.module) {
                    self.on_demand_roots.push(root);
                }
            }
        }
    }
}

/// `./src/pages/Settings.tsx` → `src_pages_Settings`
pub fn chunk_name_for(id: &str) -> String {
    let trimmed = id.trim_start_matches("./");
    let without_ext = match trimmed.rfind('.') {
        Some(dot) if dot > trimmed.rfind('/').map(|s| s + 1).unwrap_or(0) => &trimmed[..dot],
        _ => trimmed,
    };
    without_ext
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// Loads the graph in breadth-wise waves, transforming each wave concurrently
pub struct GraphBuilder {
    fs: Arc<dyn FileSystemService>,
    processors: ProcessorSet,
}

impl GraphBuilder {
    pub fn new(fs: Arc<dyn FileSystemService>, processors: ProcessorSet) -> Self {
        Self { fs, processors }
    }

    pub async fn build(&self, ctx: &BuildContext) -> Result<ModuleGraph> {
        let _timer = crate::utils::Timer::start("Building module graph");
        let mut graph = ModuleGraph::default();
        let importer = ctx.entry_importer();

        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut wave: Vec<PathBuf> = Vec::new();
        for entry in &ctx.config.entries {
            let mut listed = Vec::new();
            for specifier in &entry.imports {
                let path = ctx.resolver.resolve(specifier, &importer)?;
                listed.push(ctx.module_id(&path));
                if seen.insert(path.clone()) {
                    wave.push(path);
                }
            }
            graph.entry_modules.insert(entry.name.clone(), listed);
        }

        while !wave.is_empty() {
            ctx.ensure_current()?;
            wave.sort();

            let loads = wave.iter().map(|path| self.load_module(ctx, path.clone()));
            let results = futures::future::join_all(loads).await;

            let mut next = Vec::new();
            let mut errors = Vec::new();
            for result in results {
                let mut module = match result {
                    Ok(module) => module,
                    Err(err) => {
                        errors.push(err);
                        continue;
                    }
                };

                for import in &module.imports {
                    match ctx.resolver.resolve(&import.specifier, &module.path) {
                        Ok(target) => {
                            module
                                .resolved
                                .insert(import.specifier.clone(), ctx.module_id(&target));
                            if seen.insert(target.clone()) {
                                next.push(target);
                            }
                        }
                        Err(err) => errors.push(err),
                    }
                }
                graph.modules.insert(module.id.clone(), module);
            }

            if !errors.is_empty() {
                for err in &errors {
                    Logger::error(&err.to_string());
                }
                return Err(errors.swap_remove(0));
            }

            wave = next;
        }

        graph.order(&ctx.config.entries);
        Logger::graph_built(
            graph.modules.len(),
            ctx.config.entries.len(),
            graph.on_demand_roots.len(),
        );
        Ok(graph)
    }

    async fn load_module(&self, ctx: &BuildContext, path: PathBuf) -> Result<ModuleInfo> {
        let bytes = self.fs.read_bytes(&path).await?;
        let module_type = ModuleType::from_path(&path);
        let digest = TransformCache::digest(&bytes);

        let source: Arc<str> = match module_type.asset_kind() {
            Some(AssetKind::Script) | Some(AssetKind::Style) => {
                Arc::from(String::from_utf8_lossy(&bytes).as_ref())
            }
            _ => Arc::from(""),
        };

        let transformed = match ctx.transform_cache.get(&path, &digest) {
            Some(hit) => hit,
            None => {
                let transformer = self.processors.for_type(module_type).ok_or_else(|| {
                    KilnError::transform(&path, format!("no transformer for {:?}", module_type))
                })?;
                let settings = ctx.transform_settings();
                let task_path = path.clone();
                let result = tokio::task::spawn_blocking(move || {
                    transformer.transform(&task_path, &bytes, &settings)
                })
                .await
                .map_err(|e| KilnError::transform(&path, format!("transform task failed: {}", e)))?;

                match result {
                    Ok(module) => {
                        ctx.transform_cache
                            .insert(path.clone(), digest, module.clone());
                        module
                    }
                    Err(err) if !ctx.config.mode.is_production() => {
                        match ctx.transform_cache.last_good(&path) {
                            Some(stale) => {
                                ctx.warn(BuildWarning::StaleModule {
                                    path: path.clone(),
                                    message: err.to_string(),
                                });
                                stale
                            }
                            None => return Err(err),
                        }
                    }
                    Err(err) => return Err(err),
                }
            }
        };

        Ok(ModuleInfo {
            id: ctx.module_id(&path),
            path,
            source,
            module_type,
            imports: transformed.imports,
            output: transformed.output,
            resolved: BTreeMap::new(),
            rendered_size: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(id: &str, statics: &[&str], dynamics: &[(&str, Option<&str>)]) -> ModuleInfo {
        let mut imports = Vec::new();
        let mut resolved = BTreeMap::new();
        for target in statics {
            imports.push(ImportRecord::new(*target, ImportKind::Static));
            resolved.insert(target.to_string(), target.to_string());
        }
        for (target, name) in dynamics {
            let mut record = ImportRecord::new(*target, ImportKind::Dynamic);
            record.chunk_name = name.map(str::to_string);
            imports.push(record);
            resolved.insert(target.to_string(), target.to_string());
        }
        ModuleInfo {
            id: id.to_string(),
            path: PathBuf::from(id),
            source: Arc::from(""),
            module_type: ModuleType::JavaScript,
            imports,
            output: ModuleOutput::Script(String::new()),
            resolved,
            rendered_size: 0,
        }
    }

    fn graph(modules: Vec<ModuleInfo>, entries: &[(&str, &[&str])]) -> (ModuleGraph, Vec<Entry>) {
        let mut graph = ModuleGraph::default();
        for m in modules {
            graph.modules.insert(m.id.clone(), m);
        }
        let entries: Vec<Entry> = entries
            .iter()
            .map(|(name, listed)| {
                graph
                    .entry_modules
                    .insert(name.to_string(), listed.iter().map(|s| s.to_string()).collect());
                Entry::new(*name, listed.iter().map(|s| s.to_string()).collect())
            })
            .collect();
        (graph, entries)
    }

    #[test]
    fn test_preorder_and_postorder_with_cycle() {
        let (mut g, entries) = graph(
            vec![
                module("a", &["b", "c"], &[]),
                module("b", &["c"], &[]),
                module("c", &["a"], &[]),
            ],
            &[("app", &["a"])],
        );
        g.order(&entries);
        assert_eq!(g.entry_closure["app"], vec!["a", "b", "c"]);
        assert_eq!(g.postorder, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_reached_by_tracks_each_entry() {
        let (mut g, entries) = graph(
            vec![
                module("x", &["shared"], &[]),
                module("y", &["shared"], &[]),
                module("shared", &[], &[]),
            ],
            &[("one", &["x"]), ("two", &["y"])],
        );
        g.order(&entries);
        let reached: Vec<&str> = g.reached_by["shared"].iter().map(String::as_str).collect();
        assert_eq!(reached, vec!["one", "two"]);
        assert_eq!(g.reached_by["x"].len(), 1);
    }

    #[test]
    fn test_dynamic_imports_become_on_demand_roots() {
        let (mut g, entries) = graph(
            vec![
                module("main", &[], &[("./pages/Alarm.tsx", Some("alarm")), ("./pages/Settings.tsx", None)]),
                module("./pages/Alarm.tsx", &["dep"], &[]),
                module("./pages/Settings.tsx", &["dep"], &[]),
                module("dep", &[], &[]),
            ],
            &[("app", &["main"])],
        );
        g.order(&entries);

        assert_eq!(g.entry_closure["app"], vec!["main"]);
        let names: Vec<&str> = g.on_demand_roots.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["alarm", "pages_Settings"]);
        assert_eq!(g.on_demand_closure["./pages/Alarm.tsx"], vec!["./pages/Alarm.tsx", "dep"]);
        assert!(!g.reached_by.contains_key("dep"));
    }

    #[test]
    fn test_requested_chunk_names_are_sanitized() {
        let (mut g, entries) = graph(
            vec![
                module("main", &[], &[("./pages/Alarm.tsx", Some("../../outside/alarm")), ("./pages/Admin.tsx", Some(".."))]),
                module("./pages/Alarm.tsx", &[], &[]),
                module("./pages/Admin.tsx", &[], &[]),
            ],
            &[("app", &["main"])],
        );
        g.order(&entries);

        let names: Vec<&str> = g.on_demand_roots.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["outside_alarm", "pages_Admin"]);
    }

    #[test]
    fn test_chunk_name_for_module_ids() {
        assert_eq!(chunk_name_for("./src/pages/Settings.tsx"), "src_pages_Settings");
        assert_eq!(chunk_name_for("./node_modules/my-lib/index.js"), "node_modules_my-lib_index");
        assert_eq!(chunk_name_for("./src/.hidden/file"), "src__hidden_file");
    }
}
