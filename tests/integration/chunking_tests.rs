use crate::support::*;
use kiln::core::models::{BuildConfig, BuildWarning, Entry, Mode, SplitChunksConfig};

fn big_string_module(name: &str, bytes: usize) -> String {
    format!("export const {} = \"{}\";\n", name, "a".repeat(bytes))
}

#[tokio::test]
async fn test_single_oversized_module_stays_whole() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    write(root, "src/big.js", &big_string_module("payload", 5 * 1024 * 1024));

    let config = BuildConfig {
        root: root.to_path_buf(),
        entries: vec![Entry::new("app", vec!["./src/big.js".to_string()])],
        minify: false,
        build_timestamp: Some(PINNED_TIMESTAMP),
        ..Default::default()
    };
    assert_eq!(config.split_chunks.max_size, 512_000);
    let result = build(&config).await;

    let size_warnings: Vec<_> = result
        .warnings
        .iter()
        .filter(|w| matches!(w, BuildWarning::SizeConstraint { .. }))
        .collect();
    assert_eq!(size_warnings.len(), 1);
    assert!(matches!(
        size_warnings[0],
        BuildWarning::SizeConstraint { chunk, module, max_size: 512_000, .. }
            if chunk == "app" && module == "./src/big.js"
    ));

    let scripts = scripts(&result);
    assert_eq!(scripts.len(), 1);
    assert!(is_named(&scripts[0].filename, "app", ".js"));
    assert_eq!(scripts[0].modules, vec!["./src/big.js".to_string()]);
}

#[tokio::test]
async fn test_size_ceiling_splits_entry_into_parts() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();

    let mut index = String::new();
    for i in 0..7 {
        write(root, &format!("src/part{}.js", i), &big_string_module(&format!("part{}", i), 100_000));
        index.push_str(&format!("import {{ part{i} }} from \"./part{i}.js\";\n", i = i));
    }
    index.push_str("console.log(part0, part1, part2, part3, part4, part5, part6);\n");
    write(root, "src/index.js", &index);

    let config = BuildConfig {
        root: root.to_path_buf(),
        mode: Mode::Production,
        entries: vec![Entry::new("app", vec!["./src/index.js".to_string()])],
        minify: false,
        build_timestamp: Some(PINNED_TIMESTAMP),
        ..Default::default()
    };
    let result = build(&config).await;

    assert!(result
        .warnings
        .iter()
        .all(|w| !matches!(w, BuildWarning::SizeConstraint { .. })));
    assert!(result.manifest.chunks.contains_key("app-1"));
    assert!(result.manifest.chunks.contains_key("app-2"));
    assert!(!result.manifest.chunks.contains_key("app"));

    let first = result.chunk_artifact("app-1").unwrap();
    let last = result.chunk_artifact("app-2").unwrap();
    // Module payload stays under the ceiling; the runtime rides along in the last part
    assert!(first.size() <= 512_000);
    assert!(last.size() < 512_000 + 8 * 1024);
    assert_eq!(first.modules.len() + last.modules.len(), 8);
    assert!(last.modules.contains(&"./src/index.js".to_string()));

    let entry = &result.manifest.entrypoints["app"];
    assert_eq!(entry.scripts.len(), 2);
    assert!(entry.scripts[0].starts_with("/app-1."));
    assert!(entry.scripts[1].starts_with("/app-2."));
}

#[tokio::test]
async fn test_shared_modules_go_to_the_split_chunk() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    write(root, "src/shared.js", "export const shared = 1;\n");
    write(root, "src/a.js", "import { shared } from \"./shared.js\";\nconsole.log(\"a\", shared);\n");
    write(root, "src/b.js", "import { shared } from \"./shared.js\";\nconsole.log(\"b\", shared);\n");

    let config = BuildConfig {
        root: root.to_path_buf(),
        entries: vec![
            Entry::new("a", vec!["./src/a.js".to_string()]),
            Entry::new("b", vec!["./src/b.js".to_string()]),
        ],
        minify: false,
        build_timestamp: Some(PINNED_TIMESTAMP),
        ..Default::default()
    };
    let result = build(&config).await;

    let vendors = result.chunk_artifact("vendors").unwrap();
    assert_eq!(vendors.filename, "vendors/vendors.js");
    assert_eq!(vendors.modules, vec!["./src/shared.js".to_string()]);
    assert_eq!(result.chunk_artifact("a").unwrap().modules, vec!["./src/a.js".to_string()]);
    assert_eq!(result.chunk_artifact("b").unwrap().modules, vec!["./src/b.js".to_string()]);

    let page = result.page.unwrap();
    assert_eq!(page.matches("/vendors/vendors.js?v=").count(), 1);
}

#[tokio::test]
async fn test_style_chunk_splits_at_the_ceiling() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();

    let mut index = String::new();
    for i in 0..3 {
        let rules: String = (0..60)
            .map(|j| format!(".c{i}-{j} {{ margin-left: {j}px; }}\n", i = i, j = j))
            .collect();
        write(root, &format!("src/s{}.css", i), &rules);
        index.push_str(&format!("import \"./s{}.css\";\n", i));
    }
    index.push_str("console.log(\"styled\");\n");
    write(root, "src/index.js", &index);

    let config = BuildConfig {
        root: root.to_path_buf(),
        mode: Mode::Production,
        entries: vec![Entry::new("app", vec!["./src/index.js".to_string()])],
        minify: false,
        build_timestamp: Some(PINNED_TIMESTAMP),
        split_chunks: SplitChunksConfig {
            name: "vendors".to_string(),
            min_size: 100,
            max_size: 3000,
        },
        ..Default::default()
    };
    let result = build(&config).await;

    assert!(result
        .warnings
        .iter()
        .all(|w| !matches!(w, BuildWarning::SizeConstraint { .. })));

    let styles = &result.manifest.entrypoints["app"].styles;
    assert_eq!(styles.len(), 3);
    for (i, href) in styles.iter().enumerate() {
        assert!(href.starts_with(&format!("/app-{}.", i + 1)), "got {}", href);
        assert!(href.ends_with(".css"));
    }
    for artifact in result.artifacts.iter().filter(|a| a.filename.ends_with(".css")) {
        assert!(artifact.size() <= 3000, "{} is {} bytes", artifact.filename, artifact.size());
        assert_eq!(artifact.modules.len(), 1);
    }

    let page = result.page.unwrap();
    let positions: Vec<usize> = styles.iter().map(|href| page.find(href.as_str()).unwrap()).collect();
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
}

#[tokio::test]
async fn test_split_part_never_overwrites_a_declared_entry() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    write(root, "src/a.js", &big_string_module("first", 2000));
    write(root, "src/b.js", &big_string_module("second", 2000));
    write(
        root,
        "src/index.js",
        "import { first } from \"./a.js\";\nimport { second } from \"./b.js\";\nconsole.log(first, second);\n",
    );
    write(root, "src/other.js", "console.log(\"other entry\");\n");

    let config = BuildConfig {
        root: root.to_path_buf(),
        mode: Mode::Development,
        entries: vec![
            Entry::new("app", vec!["./src/index.js".to_string()]),
            Entry::new("app-1", vec!["./src/other.js".to_string()]),
        ],
        build_timestamp: Some(PINNED_TIMESTAMP),
        split_chunks: SplitChunksConfig {
            name: "vendors".to_string(),
            min_size: 100,
            max_size: 3000,
        },
        ..Default::default()
    };
    let result = build(&config).await;

    let mut filenames: Vec<&str> = scripts(&result).into_iter().map(|a| a.filename.as_str()).collect();
    let total = filenames.len();
    filenames.sort_unstable();
    filenames.dedup();
    assert_eq!(filenames.len(), total, "duplicate filenames: {:?}", filenames);

    assert_eq!(result.chunk_artifact("app-1").unwrap().modules, vec!["./src/other.js".to_string()]);
    let written = std::fs::read_to_string(root.join("dist/app-1.js")).unwrap();
    assert!(written.contains("other entry"));
    assert!(!written.contains("\"./src/a.js\""));
    assert!(result.manifest.entrypoints["app"].scripts.len() >= 2);
}
