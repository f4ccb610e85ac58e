// Processors module
pub mod asset_processor;
pub mod css_processor;
pub mod js_processor;
pub mod minifier;
pub mod module_linker;

pub use asset_processor::*;
pub use css_processor::*;
pub use js_processor::*;
pub use minifier::*;
pub use module_linker::*;

use crate::core::interfaces::ModuleTransformer;
use crate::core::models::ModuleType;
use std::sync::Arc;

/// Transformers consulted in order; the first that supports a module type wins
#[derive(Clone)]
pub struct ProcessorSet {
    transformers: Vec<Arc<dyn ModuleTransformer>>,
}

impl ProcessorSet {
    pub fn new(transformers: Vec<Arc<dyn ModuleTransformer>>) -> Self {
        Self { transformers }
    }

    pub fn for_type(&self, module_type: ModuleType) -> Option<Arc<dyn ModuleTransformer>> {
        self.transformers
            .iter()
            .find(|t| t.supports(module_type))
            .cloned()
    }
}

impl Default for ProcessorSet {
    fn default() -> Self {
        Self::new(vec![
            Arc::new(OxcJsProcessor::new()),
            Arc::new(JsonProcessor::new()),
            Arc::new(LightningCssProcessor::new()),
            Arc::new(BinaryAssetProcessor::new()),
        ])
    }
}
