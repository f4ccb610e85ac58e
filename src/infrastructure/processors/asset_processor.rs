use crate::core::interfaces::{ModuleTransformer, TransformSettings};
use crate::core::models::*;
use crate::core::naming;
use crate::utils::{KilnError, Logger, Result};
use std::path::Path;
use std::sync::Arc;

/// JSON documents become CommonJS modules
pub struct JsonProcessor;

impl JsonProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleTransformer for JsonProcessor {
    fn supports(&self, module_type: ModuleType) -> bool {
        module_type == ModuleType::Json
    }

    fn transform(
        &self,
        path: &Path,
        source: &[u8],
        _settings: &TransformSettings,
    ) -> Result<TransformedModule> {
        let value: serde_json::Value = serde_json::from_slice(source)
            .map_err(|e| KilnError::transform(path, format!("Invalid JSON: {}", e)))?;
        let json = serde_json::to_string(&value)
            .map_err(|e| KilnError::transform(path, e.to_string()))?;

        Logger::debug(&format!("📦 Processing JSON asset: {}", path.display()));

        Ok(TransformedModule {
            output: ModuleOutput::Script(format!("module.exports = {};", json)),
            imports: Vec::new(),
        })
    }
}

/// Images, fonts and anything else unknown: bytes pass through untouched
/// under a content-addressed name
pub struct BinaryAssetProcessor;

impl BinaryAssetProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BinaryAssetProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleTransformer for BinaryAssetProcessor {
    fn supports(&self, module_type: ModuleType) -> bool {
        matches!(
            module_type,
            ModuleType::Image | ModuleType::Font | ModuleType::Unknown
        )
    }

    fn transform(
        &self,
        path: &Path,
        source: &[u8],
        settings: &TransformSettings,
    ) -> Result<TransformedModule> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();
        let digest = naming::content_digest(source);
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("asset");
        let filename = naming::artifact_filename(
            ArtifactKind::Asset,
            NamingTier::Named,
            settings.mode,
            stem,
            &digest,
            &ext,
        );

        Ok(TransformedModule {
            output: ModuleOutput::Binary {
                filename,
                bytes: Arc::new(source.to_vec()),
            },
            imports: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> TransformSettings {
        TransformSettings {
            mode: Mode::Production,
            target: "es2020".into(),
        }
    }

    #[test]
    fn test_json_becomes_module_exports() {
        let module = JsonProcessor::new()
            .transform(Path::new("/p/data.json"), br#"{ "name": "kiln", "n": [1, 2] }"#, &settings())
            .unwrap();
        assert_eq!(
            module.output.text(),
            Some(r#"module.exports = {"name":"kiln","n":[1,2]};"#)
        );
    }

    #[test]
    fn test_invalid_json_fails() {
        let err = JsonProcessor::new()
            .transform(Path::new("/p/bad.json"), b"{ nope", &settings())
            .unwrap_err();
        assert!(err.to_string().contains("Invalid JSON"));
    }

    #[test]
    fn test_binary_named_by_content() {
        let bytes = b"\x89PNG fake image";
        let module = BinaryAssetProcessor::new()
            .transform(Path::new("/p/img/logo.png"), bytes, &settings())
            .unwrap();
        match module.output {
            ModuleOutput::Binary { filename, bytes: payload } => {
                assert_eq!(filename, format!("assets/{}.png", naming::content_digest(bytes)));
                assert_eq!(payload.as_slice(), bytes);
            }
            other => panic!("unexpected output: {other:?}"),
        }
    }
}
