use crate::core::models::{Artifact, ArtifactKind};
use crate::utils::{KilnError, Logger, Result};
use lightningcss::printer::PrinterOptions;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, StyleSheet};
use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{CompressOptions, MangleOptions, Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_span::SourceType;
use rayon::prelude::*;

/// JavaScript minification using oxc
pub struct OxcMinifier {
    options: MinifierOptions,
}

impl OxcMinifier {
    pub fn new() -> Self {
        Self {
            options: MinifierOptions {
                mangle: Some(MangleOptions::default()),
                compress: Some(CompressOptions::default()),
            },
        }
    }

    /// Minify a script; comments are dropped
    pub fn minify(&self, source_code: &str, filename: &str) -> Result<String> {
        let allocator = Allocator::default();
        let parsed = Parser::new(&allocator, source_code, SourceType::cjs()).parse();

        if !parsed.errors.is_empty() {
            let errors: Vec<String> = parsed
                .errors
                .iter()
                .map(|e| format!("Parse error: {}", e))
                .collect();
            return Err(KilnError::optimization(filename, errors.join("\n")));
        }

        let mut program = parsed.program;
        let minified = Minifier::new(self.options.clone()).minify(&allocator, &mut program);

        let code = Codegen::new()
            .with_options(CodegenOptions::minify())
            .with_scoping(minified.scoping)
            .build(&program)
            .code;
        Ok(code)
    }
}

impl Default for OxcMinifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Stylesheet minification using lightningcss; all comments go
pub fn minify_css(source: &str, filename: &str) -> Result<String> {
    let mut stylesheet = StyleSheet::parse(source, ParserOptions::default())
        .map_err(|e| KilnError::optimization(filename, e.to_string()))?;
    stylesheet
        .minify(MinifyOptions::default())
        .map_err(|e| KilnError::optimization(filename, e.to_string()))?;
    stylesheet.license_comments.clear();

    let printed = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            ..PrinterOptions::default()
        })
        .map_err(|e| KilnError::optimization(filename, e.to_string()))?;
    Ok(printed.code)
}

/// Production optimization over named artifacts. Filenames are never recomputed.
pub struct ArtifactOptimizer {
    minifier: OxcMinifier,
    banner: String,
    exclude: Vec<String>,
    threads: usize,
}

impl ArtifactOptimizer {
    pub fn new(banner: String, exclude: Vec<String>) -> Self {
        Self {
            minifier: OxcMinifier::new(),
            banner,
            exclude,
            threads: num_cpus::get(),
        }
    }

    pub fn is_excluded(&self, filename: &str) -> bool {
        self.exclude.iter().any(|pattern| filename.contains(pattern.as_str()))
    }

    fn optimize_one(&self, artifact: &mut Artifact) -> Result<()> {
        if self.is_excluded(&artifact.filename) {
            Logger::debug(&format!("Skipping minification of {}", artifact.filename));
            return Ok(());
        }

        let content = match artifact.kind {
            ArtifactKind::Asset => return Ok(()),
            ArtifactKind::Script => {
                let source = String::from_utf8_lossy(&artifact.content);
                let minified = self.minifier.minify(&source, &artifact.filename)?;
                format!("{}\n{}", self.banner, minified)
            }
            ArtifactKind::Style => {
                let source = String::from_utf8_lossy(&artifact.content);
                minify_css(&source, &artifact.filename)?
            }
        };

        artifact.content = content.into_bytes();
        Ok(())
    }

    /// Minify every artifact in parallel; the first failure (in artifact order) wins
    pub fn optimize(&self, artifacts: &mut [Artifact]) -> Result<()> {
        let _timer = crate::utils::Timer::start("Optimizing artifacts");

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|e| KilnError::optimization("thread pool", e.to_string()))?;

        let results: Vec<Result<()>> = pool.install(|| {
            artifacts
                .par_iter_mut()
                .map(|artifact| self.optimize_one(artifact))
                .collect()
        });

        results.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::NamingTier;

    fn artifact(filename: &str, kind: ArtifactKind, content: &str) -> Artifact {
        Artifact {
            filename: filename.to_string(),
            chunk: None,
            kind,
            tier: NamingTier::Named,
            content: content.as_bytes().to_vec(),
            digest: "00000000".to_string(),
            modules: Vec::new(),
        }
    }

    #[test]
    fn test_minified_script_starts_with_banner() {
        let optimizer = ArtifactOptimizer::new("/* Build Date :: 1/1/2024 */".into(), vec![]);
        let mut artifacts = vec![artifact(
            "app.js",
            ArtifactKind::Script,
            "// comment\nfunction add(first, second) {\n  return first + second;\n}\nwindow.add = add;\n",
        )];
        optimizer.optimize(&mut artifacts).unwrap();

        let code = String::from_utf8(artifacts[0].content.clone()).unwrap();
        assert!(code.starts_with("/* Build Date :: 1/1/2024 */\n"));
        assert!(!code.contains("// comment"));
        assert!(!code.contains("second"));
    }

    #[test]
    fn test_css_comments_removed() {
        let mut artifacts = vec![artifact(
            "app.css",
            ArtifactKind::Style,
            "/*! license */\n.a {\n  color: red;\n}\n/* note */\n",
        )];
        ArtifactOptimizer::new(String::new(), vec![])
            .optimize(&mut artifacts)
            .unwrap();
        let css = String::from_utf8(artifacts[0].content.clone()).unwrap();
        assert!(!css.contains("license"));
        assert!(!css.contains("note"));
        assert!(css.contains(".a{color:red}"));
    }

    #[test]
    fn test_excluded_artifacts_are_untouched() {
        let source = "var config = { apiUrl: \"https://example.com\" };\n";
        let mut artifacts = vec![artifact("config/settings.js", ArtifactKind::Script, source)];
        ArtifactOptimizer::new("/* banner */".into(), vec!["config/".into()])
            .optimize(&mut artifacts)
            .unwrap();
        assert_eq!(artifacts[0].content, source.as_bytes());
    }

    #[test]
    fn test_parse_failure_is_optimization_error() {
        let mut artifacts = vec![artifact("app.js", ArtifactKind::Script, "function (")];
        let err = ArtifactOptimizer::new(String::new(), vec![])
            .optimize(&mut artifacts)
            .unwrap_err();
        assert!(matches!(err, KilnError::Optimization { .. }));
    }
}
