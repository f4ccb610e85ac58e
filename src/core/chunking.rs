use crate::core::context::BuildContext;
use crate::core::graph::ModuleGraph;
use crate::core::models::*;
use crate::utils::{KilnError, Logger, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Chunk membership, final before naming
#[derive(Debug, Default, Clone)]
pub struct ChunkPlan {
    /// Script chunks in load order: dependOn targets, shared split, entries, on-demand
    pub chunks: Vec<Chunk>,
    /// Style chunks, split by size like scripts; `group` names the script chunk
    /// that claimed them
    pub styles: Vec<Chunk>,
    /// Module → name of the chunk holding it
    pub module_chunk: BTreeMap<ModuleId, String>,
}

impl ChunkPlan {
    /// Script parts split from `group`, in order
    pub fn parts_of(&self, group: &str) -> Vec<&Chunk> {
        self.chunks.iter().filter(|c| c.group == group).collect()
    }

    /// Style parts split from `group`, in order
    pub fn style_parts_of(&self, group: &str) -> Vec<&Chunk> {
        self.styles.iter().filter(|c| c.group == group).collect()
    }

    pub fn all(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter().chain(self.styles.iter())
    }
}

/// A chunk before style partitioning and size splitting
struct Draft {
    name: String,
    kind: ChunkKind,
    modules: Vec<ModuleId>,
    startup: Vec<ModuleId>,
}

pub struct ChunkingEngine<'a> {
    ctx: &'a BuildContext,
    graph: &'a ModuleGraph,
}

impl<'a> ChunkingEngine<'a> {
    pub fn new(ctx: &'a BuildContext, graph: &'a ModuleGraph) -> Self {
        Self { ctx, graph }
    }

    pub fn plan(&self) -> Result<ChunkPlan> {
        let _timer = crate::utils::Timer::start("Chunking");
        let config = &self.ctx.config;
        let mut drafts: Vec<Draft> = Vec::new();
        let mut claimed: HashSet<ModuleId> = HashSet::new();

        let chains: BTreeMap<&str, Vec<String>> = config
            .entries
            .iter()
            .map(|e| Ok((e.name.as_str(), self.dependency_chain(e)?)))
            .collect::<Result<_>>()?;

        // dependOn targets first: each keeps its own closure, whatever its size
        for entry in config.entries.iter().filter(|e| config.is_depend_on_target(&e.name)) {
            let members = self.own_members(entry, &chains[entry.name.as_str()], &claimed);
            claimed.extend(members.iter().cloned());
            drafts.push(Draft {
                name: entry.name.clone(),
                kind: ChunkKind::VendorShared,
                modules: members,
                startup: Vec::new(),
            });
        }

        let independents: Vec<&Entry> = config
            .entries
            .iter()
            .filter(|e| !config.is_depend_on_target(&e.name))
            .collect();
        let remaining: Vec<Vec<ModuleId>> = independents
            .iter()
            .map(|e| self.own_members(e, &chains[e.name.as_str()], &claimed))
            .collect();

        // Modules two or more independent entries reach go to the shared split chunk
        let mut owners: HashMap<&str, usize> = HashMap::new();
        for members in &remaining {
            for id in members {
                *owners.entry(id.as_str()).or_default() += 1;
            }
        }
        let mut shared: Vec<ModuleId> = Vec::new();
        for members in &remaining {
            for id in members {
                if owners[id.as_str()] > 1 && !shared.contains(id) {
                    shared.push(id.clone());
                }
            }
        }
        if !shared.is_empty() {
            claimed.extend(shared.iter().cloned());
            drafts.push(Draft {
                name: config.split_chunks.name.clone(),
                kind: ChunkKind::VendorShared,
                modules: shared,
                startup: Vec::new(),
            });
        }

        for (entry, members) in independents.iter().zip(remaining) {
            let modules: Vec<ModuleId> = members.into_iter().filter(|id| !claimed.contains(id)).collect();
            claimed.extend(modules.iter().cloned());
            drafts.push(Draft {
                name: entry.name.clone(),
                kind: ChunkKind::Entry,
                modules,
                startup: self.startup_for(entry, &chains[entry.name.as_str()]),
            });
        }

        drafts.extend(self.on_demand_drafts(&claimed));

        self.finish(drafts)
    }

    /// Transitive dependOn targets of `entry`, nearest first
    fn dependency_chain(&self, entry: &Entry) -> Result<Vec<String>> {
        let config = &self.ctx.config;
        let mut chain: Vec<String> = Vec::new();
        let mut current = entry;

        while let Some(target) = current.depend_on.as_deref() {
            if target == entry.name || chain.iter().any(|c| c == target) {
                return Err(KilnError::config(format!(
                    "dependOn cycle through entry '{}'",
                    entry.name
                )));
            }
            current = config.entry(target).ok_or_else(|| {
                KilnError::config(format!(
                    "entry '{}' depends on unknown entry '{}'",
                    entry.name, target
                ))
            })?;
            chain.push(target.to_string());
        }

        Ok(chain)
    }

    fn chunkable(&self, id: &str) -> bool {
        self.graph
            .module(id)
            .map(|m| m.asset_kind() != AssetKind::Binary)
            .unwrap_or(false)
    }

    /// Closure of `entry` minus whatever its dependOn chain already provides
    fn own_members(&self, entry: &Entry, chain: &[String], claimed: &HashSet<ModuleId>) -> Vec<ModuleId> {
        let provided: HashSet<&ModuleId> = chain
            .iter()
            .filter_map(|name| self.graph.entry_closure.get(name))
            .flatten()
            .collect();

        self.graph
            .entry_closure
            .get(&entry.name)
            .map(|closure| {
                closure
                    .iter()
                    .filter(|id| self.chunkable(id) && !provided.contains(id) && !claimed.contains(*id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Listed script modules of the chain (farthest target first), then the entry's own
    fn startup_for(&self, entry: &Entry, chain: &[String]) -> Vec<ModuleId> {
        let mut startup: Vec<ModuleId> = Vec::new();
        let names = chain.iter().rev().map(String::as_str).chain(std::iter::once(entry.name.as_str()));
        for name in names {
            for id in self.graph.entry_modules.get(name).into_iter().flatten() {
                let is_script = self
                    .graph
                    .module(id)
                    .map(|m| m.asset_kind() == AssetKind::Script)
                    .unwrap_or(false);
                if is_script && !startup.contains(id) {
                    startup.push(id.clone());
                }
            }
        }
        startup
    }

    /// Unclaimed modules grouped by the set of on-demand roots reaching them
    fn on_demand_drafts(&self, claimed: &HashSet<ModuleId>) -> Vec<Draft> {
        let mut reach: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        let mut first_seen: Vec<&str> = Vec::new();

        for root in &self.graph.on_demand_roots {
            for id in self.graph.on_demand_closure.get(&root.module).into_iter().flatten() {
                if claimed.contains(id) || !self.chunkable(id) {
                    continue;
                }
                let roots = reach.entry(id.as_str()).or_default();
                if roots.is_empty() {
                    first_seen.push(id.as_str());
                }
                roots.insert(root.name.as_str());
            }
        }

        let mut groups: Vec<(BTreeSet<&str>, Vec<ModuleId>)> = Vec::new();
        for id in first_seen {
            let key = &reach[id];
            match groups.iter_mut().find(|(k, _)| k == key) {
                Some((_, members)) => members.push(id.to_string()),
                None => groups.push((key.clone(), vec![id.to_string()])),
            }
        }

        groups
            .into_iter()
            .map(|(roots, modules)| Draft {
                name: roots.into_iter().collect::<Vec<_>>().join("~"),
                kind: ChunkKind::OnDemand,
                modules,
                startup: Vec::new(),
            })
            .collect()
    }

    /// Partition styles out, split oversized chunks, assign tiers. Draft names
    /// are reserved up front so split parts never take a declared name.
    fn finish(&self, drafts: Vec<Draft>) -> Result<ChunkPlan> {
        let config = &self.ctx.config;
        let post_index = self.graph.postorder_index();
        let mut plan = ChunkPlan::default();

        let mut reserved: HashSet<String> = HashSet::new();
        let named: Vec<(String, Draft)> = drafts
            .into_iter()
            .filter(|d| !d.modules.is_empty() || d.kind == ChunkKind::Entry)
            .map(|d| (unique_name(&d.name, &mut reserved), d))
            .collect();
        let mut script_names = reserved.clone();
        let mut style_names = reserved;

        for (name, draft) in named {
            let tier = config.naming.tier_for(draft.kind, &name);

            let (mut styles, scripts): (Vec<ModuleId>, Vec<ModuleId>) = draft
                .modules
                .into_iter()
                .partition(|id| self.graph.module(id).map(|m| m.asset_kind()) == Some(AssetKind::Style));

            if !styles.is_empty() {
                styles.sort_by_key(|id| post_index.get(id.as_str()).copied().unwrap_or(usize::MAX));
                let mut style = Chunk::new(name.clone(), ChunkKind::Style, NamingTier::Named);
                style.size = styles.iter().map(|id| self.module_size(id)).sum();
                style.modules = styles;

                for part in self.split_by_size(style, &mut style_names) {
                    for id in &part.modules {
                        plan.module_chunk.insert(id.clone(), part.name.clone());
                    }
                    plan.styles.push(part);
                }
            }

            if scripts.is_empty() && draft.kind != ChunkKind::Entry {
                continue;
            }

            let mut chunk = Chunk::new(name.clone(), draft.kind, tier);
            chunk.size = scripts.iter().map(|id| self.module_size(id)).sum();
            chunk.modules = scripts;
            chunk.startup = draft.startup;

            for part in self.split_by_size(chunk, &mut script_names) {
                Logger::chunk_created(&part.name, part.kind.as_str(), part.modules.len(), part.size);
                for id in &part.modules {
                    plan.module_chunk.insert(id.clone(), part.name.clone());
                }
                plan.chunks.push(part);
            }
        }

        Ok(plan)
    }

    fn module_size(&self, id: &str) -> usize {
        self.graph.module(id).map(|m| m.size()).unwrap_or(0)
    }

    /// Pack modules in order into parts no larger than `maxSize`. Part names
    /// are `name-1..n`, made unique against `used`.
    fn split_by_size(&self, chunk: Chunk, used: &mut HashSet<String>) -> Vec<Chunk> {
        let limits = &self.ctx.config.split_chunks;
        let (min_size, max_size) = (limits.min_size, limits.max_size);

        for id in &chunk.modules {
            let size = self.module_size(id);
            if size > max_size {
                self.ctx.warn(BuildWarning::SizeConstraint {
                    chunk: chunk.name.clone(),
                    module: id.clone(),
                    size,
                    max_size,
                });
            }
        }

        if chunk.size <= max_size || chunk.size < min_size {
            return vec![chunk];
        }

        let mut parts: Vec<(Vec<ModuleId>, usize)> = Vec::new();
        let mut current: Vec<ModuleId> = Vec::new();
        let mut current_size = 0usize;
        for id in &chunk.modules {
            let size = self.module_size(id);
            if !current.is_empty() && current_size + size > max_size {
                parts.push((std::mem::take(&mut current), current_size));
                current_size = 0;
            }
            current.push(id.clone());
            current_size += size;
        }
        if !current.is_empty() {
            parts.push((current, current_size));
        }

        // A small trailing part borrows modules from the end of the one before it
        if parts.len() > 1 {
            let len = parts.len();
            let (head, tail) = parts.split_at_mut(len - 1);
            let (previous, last) = (&mut head[len - 2], &mut tail[0]);
            while last.1 < min_size && previous.0.len() > 1 {
                let Some(moved) = previous.0.last().cloned() else {
                    break;
                };
                let size = self.module_size(&moved);
                if last.1 + size > max_size || previous.1 - size < min_size {
                    break;
                }
                previous.0.pop();
                previous.1 -= size;
                last.0.insert(0, moved);
                last.1 += size;
            }
        }

        if parts.len() == 1 {
            return vec![chunk];
        }

        let count = parts.len();
        parts
            .into_iter()
            .enumerate()
            .map(|(i, (modules, size))| {
                let name = unique_name(&format!("{}-{}", chunk.name, i + 1), used);
                let mut part = Chunk::new(name, chunk.kind, chunk.tier);
                part.group = chunk.name.clone();
                part.modules = modules;
                part.size = size;
                if i + 1 == count {
                    part.startup = chunk.startup.clone();
                }
                part
            })
            .collect()
    }
}

fn unique_name(name: &str, used: &mut HashSet<String>) -> String {
    let mut candidate = name.to_string();
    let mut n = 2;
    while !used.insert(candidate.clone()) {
        candidate = format!("{}~{}", name, n);
        n += 1;
    }
    candidate
}
