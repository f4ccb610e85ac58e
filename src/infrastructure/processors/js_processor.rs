use crate::core::interfaces::{ModuleTransformer, TransformSettings};
use crate::core::models::*;
use crate::infrastructure::processors::ModuleLinker;
use crate::utils::{ErrorContext, KilnError, Logger, Result};
use oxc_allocator::Allocator;
use oxc_codegen::Codegen;
use oxc_diagnostics::OxcDiagnostic;
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{TransformOptions, Transformer};
use std::path::Path;

/// Scripts: oxc parse, lower to the target, print, then link into a factory body
pub struct OxcJsProcessor;

impl OxcJsProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Parse and lower `source` to plain JavaScript for `target`
    pub fn transpile(path: &Path, source: &str, target: &str) -> Result<String> {
        let _timer = crate::utils::Timer::start(&format!("Transpiling {}", path.display()));
        let allocator = Allocator::default();
        let source_type = SourceType::from_path(path).unwrap_or_else(|_| SourceType::mjs());

        let parsed = Parser::new(&allocator, source, source_type).parse();
        if let Some(error) = parsed.errors.first() {
            return Err(Self::diagnostic_error(path, source, error));
        }

        let mut program = parsed.program;
        let scoping = SemanticBuilder::new()
            .build(&program)
            .semantic
            .into_scoping();

        let options = TransformOptions::from_target(target)
            .map_err(|message| KilnError::config(format!("invalid target '{}': {}", target, message)))?;
        let transformed = Transformer::new(&allocator, path, &options)
            .build_with_scoping(scoping, &mut program);
        if let Some(error) = transformed.errors.first() {
            return Err(Self::diagnostic_error(path, source, error));
        }

        Ok(Codegen::new().build(&program).code)
    }

    fn diagnostic_error(path: &Path, source: &str, error: &OxcDiagnostic) -> KilnError {
        let offset = error
            .labels
            .as_ref()
            .and_then(|labels| labels.first())
            .map(|label| label.offset())
            .unwrap_or(0);
        KilnError::transform_with_context(
            path,
            error.to_string(),
            ErrorContext::new()
                .with_file(path.to_path_buf())
                .at_offset(source, offset),
        )
    }

    /// Environment plugin: `process.env.NODE_ENV` is a compile-time constant
    pub fn replace_node_env(code: &str, mode: Mode) -> String {
        code.replace("process.env.NODE_ENV", &format!("\"{}\"", mode.as_str()))
    }
}

impl Default for OxcJsProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleTransformer for OxcJsProcessor {
    fn supports(&self, module_type: ModuleType) -> bool {
        matches!(module_type, ModuleType::JavaScript | ModuleType::TypeScript)
    }

    fn transform(
        &self,
        path: &Path,
        source: &[u8],
        settings: &TransformSettings,
    ) -> Result<TransformedModule> {
        let file_name = path.file_name().and_then(|s| s.to_str()).unwrap_or("unknown");
        Logger::processing_file(file_name, settings.mode.as_str());

        let source = std::str::from_utf8(source)
            .map_err(|e| KilnError::transform(path, format!("not valid UTF-8: {}", e)))?;
        let code = Self::transpile(path, source, &settings.target)?;
        let code = Self::replace_node_env(&code, settings.mode);
        let (linked, imports) = ModuleLinker::link(path, &code, source)?;

        Ok(TransformedModule {
            output: ModuleOutput::Script(linked),
            imports,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(mode: Mode) -> TransformSettings {
        TransformSettings {
            mode,
            target: "es2020".to_string(),
        }
    }

    #[test]
    fn test_typescript_is_stripped_and_linked() {
        let source = "import type { Props } from './types';\nimport { greet } from './greet';\nexport const hello = (name: string): string => greet(name);\n";
        let module = OxcJsProcessor::new()
            .transform(Path::new("/project/src/hello.ts"), source.as_bytes(), &settings(Mode::Development))
            .unwrap();

        let code = module.output.text().unwrap();
        assert!(!code.contains(": string"));
        assert!(code.contains("require(\"./greet\")"));
        assert!(!code.contains("./types"));
        let specifiers: Vec<&str> = module.imports.iter().map(|i| i.specifier.as_str()).collect();
        assert_eq!(specifiers, vec!["./greet"]);
    }

    #[test]
    fn test_node_env_replaced_with_mode() {
        let source = "if (process.env.NODE_ENV === 'production') { module.exports = 1; }\n";
        let module = OxcJsProcessor::new()
            .transform(Path::new("/project/index.js"), source.as_bytes(), &settings(Mode::Production))
            .unwrap();
        assert!(module.output.text().unwrap().contains("\"production\" === \"production\""));
    }

    #[test]
    fn test_syntax_error_is_transform_error() {
        let err = OxcJsProcessor::new()
            .transform(Path::new("/project/src/bad.ts"), b"const x = ;", &settings(Mode::Production))
            .unwrap_err();
        match err {
            KilnError::Transform { path, context, .. } => {
                assert_eq!(path, Path::new("/project/src/bad.ts"));
                assert_eq!(context.and_then(|c| c.line), Some(1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
