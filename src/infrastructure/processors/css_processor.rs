use crate::core::interfaces::{ModuleTransformer, TransformSettings};
use crate::core::models::*;
use crate::utils::{KilnError, Logger, Result};
use lightningcss::printer::PrinterOptions;
use lightningcss::stylesheet::{ParserOptions, StyleSheet};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

static IMPORT_RULE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"@import\s+(?:url\(\s*)?["']?([^"')\s;]+)["']?\s*\)?\s*([^;]*);"#)
        .unwrap_or_else(|e| panic!("invalid @import pattern: {e}"))
});

static URL_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"url\(\s*["']?([^"')]+?)["']?\s*\)"#)
        .unwrap_or_else(|e| panic!("invalid url() pattern: {e}"))
});

/// Stylesheets: SCSS/Sass through grass, local `@import`s lifted into graph
/// edges, local `url()`s recorded for rewriting, then printed by lightningcss.
pub struct LightningCssProcessor;

impl LightningCssProcessor {
    pub fn new() -> Self {
        Self
    }

    fn compile_scss(&self, content: &str, path: &Path) -> Result<String> {
        let _timer = crate::utils::Timer::start(&format!(
            "Compiling SCSS {}",
            path.file_name().and_then(|s| s.to_str()).unwrap_or("unknown")
        ));

        let syntax = if path.extension().and_then(|s| s.to_str()) == Some("sass") {
            grass::InputSyntax::Sass
        } else {
            grass::InputSyntax::Scss
        };
        let mut options = grass::Options::default()
            .input_syntax(syntax)
            .style(grass::OutputStyle::Expanded);
        if let Some(dir) = path.parent() {
            options = options.load_path(dir);
        }

        grass::from_string(content.to_string(), &options)
            .map_err(|e| KilnError::transform(path, format!("SCSS compilation failed: {}", e)))
    }

    /// Remote and data URLs, fragments and root-absolute paths stay as written
    pub fn is_local_reference(reference: &str) -> bool {
        !(reference.is_empty()
            || reference.starts_with("data:")
            || reference.starts_with("http://")
            || reference.starts_with("https://")
            || reference.starts_with("//")
            || reference.starts_with('#')
            || reference.starts_with('/'))
    }

    /// Drop local `@import` rules, returning them in source order
    fn lift_imports(css: &str) -> (String, Vec<String>) {
        let mut imports = Vec::new();
        let stripped = IMPORT_RULE.replace_all(css, |caps: &regex::Captures| {
            let target = caps[1].to_string();
            if Self::is_local_reference(&target) && caps[2].trim().is_empty() {
                imports.push(target);
                String::new()
            } else {
                caps[0].to_string()
            }
        });
        (stripped.into_owned(), imports)
    }

    pub fn url_references(css: &str) -> Vec<String> {
        let mut references: Vec<String> = Vec::new();
        for caps in URL_REFERENCE.captures_iter(css) {
            let reference = caps[1].trim().to_string();
            if Self::is_local_reference(&reference) && !references.contains(&reference) {
                references.push(reference);
            }
        }
        references
    }

    /// Replace local `url()` references through `lookup`; unknown ones stay as written
    pub fn rewrite_urls<F>(css: &str, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        URL_REFERENCE
            .replace_all(css, |caps: &regex::Captures| match lookup(caps[1].trim()) {
                Some(url) => format!("url(\"{}\")", url),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    fn normalize(css: &str, path: &Path) -> Result<String> {
        let stylesheet = StyleSheet::parse(css, ParserOptions::default())
            .map_err(|e| KilnError::transform(path, e.to_string()))?;
        let printed = stylesheet
            .to_css(PrinterOptions::default())
            .map_err(|e| KilnError::transform(path, e.to_string()))?;
        Ok(printed.code)
    }
}

impl Default for LightningCssProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleTransformer for LightningCssProcessor {
    fn supports(&self, module_type: ModuleType) -> bool {
        matches!(module_type, ModuleType::Css | ModuleType::Scss)
    }

    fn transform(
        &self,
        path: &Path,
        source: &[u8],
        _settings: &TransformSettings,
    ) -> Result<TransformedModule> {
        Logger::processing_css(path.file_name().and_then(|s| s.to_str()).unwrap_or("unknown"));

        let source = std::str::from_utf8(source)
            .map_err(|e| KilnError::transform(path, format!("not valid UTF-8: {}", e)))?;
        let css = if ModuleType::from_path(path) == ModuleType::Scss {
            self.compile_scss(source, path)?
        } else {
            source.to_string()
        };

        let (css, lifted) = Self::lift_imports(&css);
        let css = Self::normalize(&css, path)?;

        let imports = lifted
            .into_iter()
            .chain(Self::url_references(&css))
            .map(|specifier| ImportRecord::new(specifier, ImportKind::Static))
            .collect();

        Ok(TransformedModule {
            output: ModuleOutput::Style(css),
            imports,
        })
    }
}
