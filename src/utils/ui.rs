use crate::core::models::{ArtifactKind, BuildResult};
use crate::utils::bundle_analysis::format_size;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Terminal output for the CLI: a spinner while building, a summary after
pub struct KilnUI {
    spinner: Option<ProgressBar>,
}

impl KilnUI {
    pub fn new() -> Self {
        Self { spinner: None }
    }

    pub fn show_banner(&self, mode: &str) {
        println!(
            "\n  {} {} {}",
            "KILN".bright_cyan().bold(),
            env!("CARGO_PKG_VERSION").bright_white(),
            format!("({})", mode).bright_black()
        );
        println!();
    }

    /// Drawn only on interactive terminals; indicatif hides it otherwise
    pub fn start_spinner(&mut self, message: &str) {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("  {spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(80));
        self.spinner = Some(spinner);
    }

    pub fn stop_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    pub fn show_summary(&self, result: &BuildResult, outdir: &str) {
        println!();
        let mut artifacts: Vec<_> = result.artifacts.iter().collect();
        artifacts.sort_by(|a, b| a.filename.cmp(&b.filename));

        for artifact in artifacts {
            let name = match artifact.kind {
                ArtifactKind::Script => artifact.filename.bright_cyan(),
                ArtifactKind::Style => artifact.filename.bright_magenta(),
                ArtifactKind::Asset => artifact.filename.bright_green(),
            };
            println!(
                "  {} {} {}",
                format!("{}/", outdir).bright_black(),
                name,
                format!("({})", format_size(artifact.size())).bright_black()
            );
        }

        for warning in &result.warnings {
            println!("  {} {}", "⚠".bright_yellow(), warning.to_string().yellow());
        }

        if let Some(report) = &result.report_path {
            println!("  {} {}", "📊".bright_white(), report.display().to_string().bright_black());
        }

        println!();
        println!(
            "  {} {} modules built in {}",
            "✓".bright_green(),
            result.module_count.to_string().bright_white(),
            format!("{:.0}ms", result.build_time.as_secs_f64() * 1000.0)
                .bright_white()
                .bold()
        );
    }
}

impl Default for KilnUI {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for KilnUI {
    fn drop(&mut self) {
        self.stop_spinner();
    }
}
