use kiln::core::interfaces::{BuildService, FileSystemService};
use kiln::core::models::{Artifact, ArtifactKind, BuildConfig, BuildResult, Entry, Mode};
use kiln::core::services::KilnBuildService;
use kiln::infrastructure::TokioFileSystemService;
use std::path::Path;
use std::sync::Arc;

pub const PINNED_TIMESTAMP: i64 = 1_700_000_000;

pub fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// An app entry depending on a react-vendors entry, with a stylesheet and an
/// on-demand settings page
pub fn write_react_app(root: &Path) {
    write(root, "node_modules/react/package.json", r#"{"name": "react", "main": "index.js"}"#);
    write(
        root,
        "node_modules/react/index.js",
        "module.exports = { createElement: function (tag) { return { tag: tag }; } };\n",
    );
    write(root, "node_modules/react-dom/package.json", r#"{"name": "react-dom", "main": "index.js"}"#);
    write(
        root,
        "node_modules/react-dom/index.js",
        "var React = require(\"react\");\nmodule.exports = { render: function (el) { return React.createElement(el); } };\n",
    );
    write(
        root,
        "src/index.ts",
        r#"import { createElement } from "react";
import { render } from "react-dom";
import "./styles.css";

const label: string = "app";
render(createElement(label));

export function openSettings() {
  return import(/* chunkName: "settings" */ "./Settings");
}
"#,
    );
    write(root, "src/Settings.ts", "export const title: string = \"settings\";\n");
    write(root, "src/styles.css", "body { color: red; }\n");
}

pub fn react_app_config(root: &Path, mode: Mode) -> BuildConfig {
    BuildConfig {
        root: root.to_path_buf(),
        mode,
        entries: vec![
            Entry::new("app", vec!["./src/index.ts".to_string()]).depending_on("react-vendors"),
            Entry::new("react-vendors", vec!["react".to_string(), "react-dom".to_string()]),
        ],
        minify: false,
        build_timestamp: Some(PINNED_TIMESTAMP),
        ..Default::default()
    }
}

pub fn service() -> KilnBuildService {
    let fs_service: Arc<dyn FileSystemService> = Arc::new(TokioFileSystemService);
    KilnBuildService::new(fs_service)
}

pub async fn build(config: &BuildConfig) -> BuildResult {
    match service().build(config).await {
        Ok(result) => result,
        Err(e) => panic!("build failed: {}", e.format_detailed()),
    }
}

/// `name.<8 hex>.js`
pub fn is_named(filename: &str, name: &str, ext: &str) -> bool {
    let Some(rest) = filename.strip_prefix(&format!("{}.", name)) else {
        return false;
    };
    let Some(digest) = rest.strip_suffix(ext) else {
        return false;
    };
    digest.len() == 8 && digest.chars().all(|c| c.is_ascii_hexdigit())
}

pub fn scripts(result: &BuildResult) -> Vec<&Artifact> {
    result
        .artifacts
        .iter()
        .filter(|a| a.kind == ArtifactKind::Script)
        .collect()
}

pub fn text(artifact: &Artifact) -> String {
    String::from_utf8_lossy(&artifact.content).into_owned()
}
