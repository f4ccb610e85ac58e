use crate::core::models::Mode;

/// One step of a build. Each stage consumes the previous stage's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Resolve, read and transform every reachable module
    LoadGraph,
    /// Assign modules to chunks and split by size
    Chunk,
    /// Render chunks, compute content names, rewrite references, build the page
    Name,
    /// Minify named artifacts in memory
    Optimize,
    /// Budget checks against the final artifact sizes
    CheckBudgets,
    /// Clear the output directory and write every artifact
    WriteAll,
    /// Write only artifacts whose bytes changed and drop vanished ones
    WriteChanged,
    /// Composition report next to the artifacts
    Report,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::LoadGraph => "load graph",
            Stage::Chunk => "chunk",
            Stage::Name => "name",
            Stage::Optimize => "optimize",
            Stage::CheckBudgets => "check budgets",
            Stage::WriteAll => "write",
            Stage::WriteChanged => "write changes",
            Stage::Report => "report",
        }
    }

    /// Stages that touch the output directory must not run for a stale generation
    pub fn commits_output(&self) -> bool {
        matches!(self, Stage::WriteAll | Stage::WriteChanged | Stage::Report)
    }
}

/// Declarative stage list, picked once per build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn for_mode(mode: Mode, minify: bool) -> Self {
        let stages = match mode {
            Mode::Production => {
                let mut stages = vec![Stage::LoadGraph, Stage::Chunk, Stage::Name];
                if minify {
                    stages.push(Stage::Optimize);
                }
                stages.extend([Stage::CheckBudgets, Stage::WriteAll, Stage::Report]);
                stages
            }
            Mode::Development => vec![Stage::LoadGraph, Stage::Chunk, Stage::Name, Stage::WriteAll],
        };
        Self { stages }
    }

    /// Later dev generations: same stages, but writes are diffed against the previous output
    pub fn incremental() -> Self {
        Self {
            stages: vec![Stage::LoadGraph, Stage::Chunk, Stage::Name, Stage::WriteChanged],
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }
}
