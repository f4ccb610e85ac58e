use crate::support::*;
use kiln::core::models::{BuildWarning, Mode};
use kiln::infrastructure::{HmrMessage, HmrService};
use kiln::utils::DevSession;

fn session(root: &std::path::Path, hmr: &HmrService) -> DevSession {
    let mut config = react_app_config(root, Mode::Development);
    config.root = root.canonicalize().unwrap();
    DevSession::new(config, service(), hmr.clone())
}

#[tokio::test]
async fn test_dev_build_uses_plain_names() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    write_react_app(root);

    let hmr = HmrService::new();
    let dev = session(root, &hmr);
    let result = dev.rebuild(&[]).await.unwrap();

    assert_eq!(result.generation, 1);
    assert_eq!(result.chunk_artifact("app").unwrap().filename, "app.js");
    assert_eq!(result.chunk_artifact("react-vendors").unwrap().filename, "react-vendors.js");
    assert!(result.artifact("app.css").is_some());
    assert!(result.report_path.is_none());

    let page = result.page.unwrap();
    assert!(page.contains("<script defer src=\"/react-vendors.js\"></script>"));
    assert!(!page.contains("?v="));
}

#[tokio::test]
async fn test_incremental_generation_writes_only_changes() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    write_react_app(root);

    let hmr = HmrService::new();
    let mut updates = hmr.subscribe();
    let dev = session(root, &hmr);

    let first = dev.rebuild(&[]).await.unwrap();
    assert!(first.written.contains(&"index.html".to_string()));
    std::fs::write(root.join("dist/stray.txt"), "kept").unwrap();

    write(root, "src/styles.css", "body { color: blue; }\n");
    let second = dev.rebuild(&[root.join("src/styles.css")]).await.unwrap();
    assert_eq!(second.generation, 2);
    assert_eq!(second.written, vec!["app.css".to_string()]);
    assert!(std::fs::read_to_string(root.join("dist/app.css")).unwrap().contains("blue"));
    // The output directory is not cleared between generations
    assert!(root.join("dist/stray.txt").exists());

    match updates.try_recv().unwrap() {
        HmrMessage::CssUpdate { generation, files } => {
            assert_eq!(generation, 2);
            assert_eq!(files, vec!["app.css".to_string()]);
        }
        other => panic!("expected a css update, got {:?}", other),
    }

    write(root, "src/Settings.ts", "export const title: string = \"preferences\";\n");
    let third = dev.rebuild(&[root.join("src/Settings.ts")]).await.unwrap();
    assert_eq!(third.written, vec!["settings.js".to_string()]);
    assert!(matches!(updates.try_recv().unwrap(), HmrMessage::FullReload { generation: 3, .. }));
}

#[tokio::test]
async fn test_broken_module_serves_last_good_output() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    write_react_app(root);

    let hmr = HmrService::new();
    let dev = session(root, &hmr);
    dev.rebuild(&[]).await.unwrap();

    write(root, "src/Settings.ts", "export const title: string = ;\n");
    let result = dev.rebuild(&[root.join("src/Settings.ts")]).await.unwrap();

    assert!(result.written.is_empty());
    assert!(result
        .warnings
        .iter()
        .any(|w| matches!(w, BuildWarning::StaleModule { path, .. } if path.ends_with("src/Settings.ts"))));
}
