use crate::support::*;
use kiln::core::interfaces::BuildService;
use kiln::core::models::{BuildWarning, Mode};
use std::collections::HashSet;

#[tokio::test]
async fn test_app_and_react_vendors_scenario() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    write_react_app(root);

    let result = build(&react_app_config(root, Mode::Production)).await;

    let app = result.chunk_artifact("app").expect("app chunk");
    assert!(is_named(&app.filename, "app", ".js"), "got {}", app.filename);
    let vendors = result.chunk_artifact("react-vendors").expect("react-vendors chunk");
    assert_eq!(vendors.filename, "vendors/react-vendors.js");
    assert!(text(vendors).contains("\"./node_modules/react/index.js\""));
    assert!(text(vendors).contains("\"./node_modules/react-dom/index.js\""));

    let settings = result.chunk_artifact("settings").expect("on-demand chunk");
    assert_eq!(settings.filename, "vendors/settings.js");
    let style = result
        .artifacts
        .iter()
        .find(|a| a.filename.ends_with(".css"))
        .expect("style artifact");
    assert!(is_named(&style.filename, "app", ".css"), "got {}", style.filename);

    let outdir = root.join("dist");
    assert!(outdir.join(&app.filename).exists());
    assert!(outdir.join("vendors/react-vendors.js").exists());
    assert!(outdir.join("index.html").exists());
    assert!(outdir.join("report_1700000000000.html").exists());

    let entry = &result.manifest.entrypoints["app"];
    assert_eq!(
        entry.scripts,
        vec![
            format!("/vendors/react-vendors.js?v={}", vendors.digest),
            format!("/{}", app.filename),
        ]
    );
    assert_eq!(entry.styles, vec![format!("/{}", style.filename)]);
}

#[tokio::test]
async fn test_dependency_separation_and_exclusivity() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    write_react_app(root);

    let result = build(&react_app_config(root, Mode::Production)).await;

    let app = result.chunk_artifact("app").unwrap();
    assert!(app.modules.iter().all(|id| !id.starts_with("./node_modules/")));
    assert_eq!(app.modules, vec!["./src/index.ts".to_string()]);

    let mut seen = HashSet::new();
    for artifact in scripts(&result) {
        for id in &artifact.modules {
            assert!(seen.insert(id.clone()), "{} emitted twice", id);
        }
    }
    assert!(seen.contains("./src/Settings.ts"));
    assert!(!seen.contains("./src/styles.css"));
}

#[tokio::test]
async fn test_page_injection_at_markers() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    write_react_app(root);
    write(
        root,
        "public/index.html",
        "<html><head><title>t</title><!-- kiln:styles --></head><body><main></main><!-- kiln:scripts --><footer></footer></body></html>",
    );

    let mut config = react_app_config(root, Mode::Production);
    config.template = Some("public/index.html".into());
    let result = build(&config).await;

    let page = std::fs::read_to_string(root.join("dist/index.html")).unwrap();
    assert_eq!(Some(&page), result.page.as_ref());
    assert!(!page.contains("kiln:styles"));
    assert!(!page.contains("kiln:scripts"));

    let link = page.find("<link rel=\"stylesheet\" href=\"/app.").unwrap();
    assert!(link < page.find("</head>").unwrap());
    let vendors = page.find("<script defer src=\"/vendors/react-vendors.js?v=").unwrap();
    let app = page.find("<script defer src=\"/app.").unwrap();
    assert!(page.find("<main></main>").unwrap() < vendors);
    assert!(vendors < app);
    assert!(app < page.find("<footer>").unwrap());
    assert!(!page.contains("settings.js"));
}

#[tokio::test]
async fn test_determinism_across_builds_and_directories() {
    let first_dir = tempfile::tempdir().unwrap();
    let second_dir = tempfile::tempdir().unwrap();
    write_react_app(first_dir.path());
    write_react_app(second_dir.path());

    let mut config = react_app_config(first_dir.path(), Mode::Production);
    config.minify = true;
    let first = build(&config).await;
    let again = build(&config).await;
    config.root = second_dir.path().to_path_buf();
    let elsewhere = build(&config).await;

    let files = |result: &kiln::BuildResult| {
        result
            .artifacts
            .iter()
            .map(|a| (a.filename.clone(), a.content.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(files(&first), files(&again));
    assert_eq!(files(&first), files(&elsewhere));
    assert_eq!(first.page, elsewhere.page);
}

#[tokio::test]
async fn test_cache_busting_follows_content() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    write_react_app(root);
    let config = react_app_config(root, Mode::Production);

    let before = build(&config).await;
    write(root, "src/Settings.ts", "export const title: string = \"preferences\";\n");
    let after = build(&config).await;

    let vendors_before = before.chunk_artifact("react-vendors").unwrap();
    let vendors_after = after.chunk_artifact("react-vendors").unwrap();
    assert_eq!(vendors_before.digest, vendors_after.digest);

    let settings_before = before.chunk_artifact("settings").unwrap();
    let settings_after = after.chunk_artifact("settings").unwrap();
    assert_eq!(settings_before.filename, settings_after.filename);
    assert_ne!(settings_before.digest, settings_after.digest);

    // The app runtime embeds the settings reference, so its name moves too
    let app_before = before.chunk_artifact("app").unwrap();
    let app_after = after.chunk_artifact("app").unwrap();
    assert_ne!(app_before.filename, app_after.filename);
    assert!(text(app_after).contains(&format!("/vendors/settings.js?v={}", settings_after.digest)));
}

#[tokio::test]
async fn test_pinned_timestamp_in_banner_and_report() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    write_react_app(root);

    let mut config = react_app_config(root, Mode::Production);
    config.minify = true;
    let result = build(&config).await;

    for artifact in scripts(&result) {
        assert!(
            text(artifact).starts_with("/* Build Date :: 11/14/2023, 10:13:20 PM */\n"),
            "{} lacks the banner",
            artifact.filename
        );
    }
    let report = result.report_path.as_ref().unwrap();
    assert_eq!(report.file_name().unwrap(), "report_1700000000000.html");
    assert!(std::fs::read_to_string(report).unwrap().contains("11/14/2023, 10:13:20 PM"));
}

#[tokio::test]
async fn test_minify_exclusion_keeps_source() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    write_react_app(root);

    let mut config = react_app_config(root, Mode::Production);
    config.minify = true;
    config.minify_exclude = vec!["vendors/".to_string()];
    let result = build(&config).await;

    let vendors = result.chunk_artifact("react-vendors").unwrap();
    assert!(!text(vendors).starts_with("/* Build Date"));
    assert!(text(vendors).contains("function (module, exports, require)"));
}

#[tokio::test]
async fn test_unresolvable_import_fails_the_build() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    write_react_app(root);
    write(root, "src/Settings.ts", "import missing from \"./missing\";\nexport default missing;\n");

    let err = service()
        .build(&react_app_config(root, Mode::Production))
        .await
        .unwrap_err();
    assert!(matches!(err, kiln::KilnError::Resolution { ref specifier, .. } if specifier == "./missing"));
    assert!(!root.join("dist").exists());
}

#[tokio::test]
async fn test_transform_error_aborts_production_build() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    write_react_app(root);
    write(root, "src/Settings.ts", "export const title: string = ;\n");

    let err = service()
        .build(&react_app_config(root, Mode::Production))
        .await
        .unwrap_err();
    assert!(matches!(err, kiln::KilnError::Transform { ref path, .. } if path.ends_with("src/Settings.ts")));
    assert!(!root.join("dist").exists());
}

#[tokio::test]
async fn test_budget_warnings_are_collected() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    write_react_app(root);

    let mut config = react_app_config(root, Mode::Production);
    config.performance.max_asset_size = 10;
    config.performance.max_entrypoint_size = 10;
    let result = build(&config).await;

    assert!(result
        .warnings
        .iter()
        .any(|w| matches!(w, BuildWarning::AssetSize { .. })));
    assert!(result
        .warnings
        .iter()
        .any(|w| matches!(w, BuildWarning::EntrypointSize { entry, .. } if entry == "app")));
}
