// Composition report and performance budgets for production builds

use crate::core::graph::ModuleGraph;
use crate::core::models::{Artifact, ArtifactKind, BuildWarning, Mode, OutputManifest, PerformanceBudget};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;

/// Share of one module inside an artifact
#[derive(Debug, Clone, Serialize)]
pub struct ModuleStats {
    pub id: String,
    /// Rendered size before minification
    pub size: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactStats {
    pub filename: String,
    pub kind: ArtifactKind,
    pub size: usize,
    pub gzip_size: usize,
    pub modules: Vec<ModuleStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BundleAnalysis {
    pub total_size: usize,
    pub total_gzip_size: usize,
    pub total_modules: usize,
    /// Sorted by size, descending
    pub artifacts: Vec<ArtifactStats>,
}

impl BundleAnalysis {
    pub fn analyze(artifacts: &[Artifact], graph: &ModuleGraph) -> Self {
        let mut stats: Vec<ArtifactStats> = artifacts
            .iter()
            .map(|artifact| {
                let module_total: usize = artifact
                    .modules
                    .iter()
                    .filter_map(|id| graph.module(id))
                    .map(|m| m.size())
                    .sum();
                let mut modules: Vec<ModuleStats> = artifact
                    .modules
                    .iter()
                    .filter_map(|id| graph.module(id))
                    .map(|m| ModuleStats {
                        id: m.id.clone(),
                        size: m.size(),
                        percentage: percentage(m.size(), module_total),
                    })
                    .collect();
                modules.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.id.cmp(&b.id)));

                ArtifactStats {
                    filename: artifact.filename.clone(),
                    kind: artifact.kind,
                    size: artifact.size(),
                    gzip_size: gzip_size(&artifact.content),
                    modules,
                }
            })
            .collect();
        stats.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.filename.cmp(&b.filename)));

        Self {
            total_size: stats.iter().map(|a| a.size).sum(),
            total_gzip_size: stats.iter().map(|a| a.gzip_size).sum(),
            total_modules: graph.modules.len(),
            artifacts: stats,
        }
    }

    pub fn report_filename(timestamp_ms: i64) -> String {
        format!("report_{}.html", timestamp_ms)
    }

    /// Self-contained HTML page
    pub fn generate_html(&self, build_date: &str) -> String {
        let mut html = String::new();
        html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
        html.push_str("<title>kiln bundle report</title>\n<style>\n");
        html.push_str("body{font-family:system-ui,sans-serif;margin:2rem;color:#222}\n");
        html.push_str("table{border-collapse:collapse;width:100%;margin-bottom:1.5rem}\n");
        html.push_str("th,td{text-align:left;padding:.25rem .5rem;border-bottom:1px solid #ddd}\n");
        html.push_str("td.num{text-align:right;font-variant-numeric:tabular-nums}\n");
        html.push_str(".bar{background:#4a90d9;height:.6rem}\n");
        html.push_str("</style>\n</head>\n<body>\n");
        html.push_str(&format!("<h1>Bundle report</h1>\n<p>{}</p>\n", escape(build_date)));
        html.push_str(&format!(
            "<p>{} artifacts, {} modules, {} total ({} gzip)</p>\n",
            self.artifacts.len(),
            self.total_modules,
            format_size(self.total_size),
            format_size(self.total_gzip_size)
        ));

        html.push_str("<table>\n<tr><th>Artifact</th><th>Kind</th><th>Size</th><th>Gzip</th><th></th></tr>\n");
        for artifact in &self.artifacts {
            html.push_str(&format!(
                "<tr><td>{}</td><td>{:?}</td><td class=\"num\">{}</td><td class=\"num\">{}</td><td><div class=\"bar\" style=\"width:{:.1}%\"></div></td></tr>\n",
                escape(&artifact.filename),
                artifact.kind,
                format_size(artifact.size),
                format_size(artifact.gzip_size),
                percentage(artifact.size, self.total_size)
            ));
        }
        html.push_str("</table>\n");

        for artifact in self.artifacts.iter().filter(|a| !a.modules.is_empty()) {
            html.push_str(&format!("<h2>{}</h2>\n<table>\n", escape(&artifact.filename)));
            for module in &artifact.modules {
                html.push_str(&format!(
                    "<tr><td>{}</td><td class=\"num\">{}</td><td class=\"num\">{:.1}%</td></tr>\n",
                    escape(&module.id),
                    format_size(module.size),
                    module.percentage
                ));
            }
            html.push_str("</table>\n");
        }

        html.push_str("</body>\n</html>\n");
        html
    }
}

/// Asset and entrypoint budget warnings over the final artifacts
pub fn check_budgets(
    artifacts: &[Artifact],
    manifest: &OutputManifest,
    budget: &PerformanceBudget,
    public_path: &str,
    mode: Mode,
) -> Vec<BuildWarning> {
    let mut warnings = Vec::new();

    for artifact in artifacts.iter().filter(|a| a.size() > budget.max_asset_size) {
        warnings.push(BuildWarning::AssetSize {
            artifact: artifact.filename.clone(),
            size: artifact.size(),
            limit: budget.max_asset_size,
        });
    }

    let sizes: HashMap<String, usize> = artifacts
        .iter()
        .map(|a| (a.reference(public_path, mode), a.size()))
        .collect();
    for (entry, files) in &manifest.entrypoints {
        let size: usize = files
            .scripts
            .iter()
            .chain(files.styles.iter())
            .filter_map(|reference| sizes.get(reference))
            .sum();
        if size > budget.max_entrypoint_size {
            warnings.push(BuildWarning::EntrypointSize {
                entry: entry.clone(),
                size,
                limit: budget.max_entrypoint_size,
            });
        }
    }

    warnings
}

pub fn gzip_size(bytes: &[u8]) -> usize {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    if encoder.write_all(bytes).is_err() {
        return bytes.len();
    }
    encoder.finish().map(|out| out.len()).unwrap_or(bytes.len())
}

/// Format bytes as human-readable size
pub fn format_size(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;

    if bytes < KB as usize {
        format!("{} B", bytes)
    } else if bytes < MB as usize {
        format!("{:.2} KB", bytes as f64 / KB)
    } else {
        format!("{:.2} MB", bytes as f64 / MB)
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
