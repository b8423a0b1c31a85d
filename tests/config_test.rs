//! Resource directories driving a local run.

mod common;

use common::Fixture;
use kombi::config;
use kombi::dispatcher::{Dispatcher, DispatcherOptions, LocalDispatcher};
use kombi::reporter::NullReporter;

#[test]
fn test_resource_directory_mixes_formats() {
    let fixture = Fixture::new();
    fixture.text_inputs("plate", 2);
    fixture.file(
        "resources/10_procedures.toml",
        r#"
[[procedures]]
name = "configTestDelivery"
template = "@ROOT@/outputs/{arg0}/(upper {arg1})"
minArgs = 2
maxArgs = 2
"#
        .replace("@ROOT@", &fixture.root().display().to_string())
        .as_str(),
    );
    fixture.file(
        "resources/20_vars.json",
        r#"{"vars": {"client.context": "acme"}}"#,
    );
    fixture.file(
        "resources/30_tasks.json",
        r#"{"tasks": [{"type": "copy", "target": "(configTestDelivery {client} {baseName})"}]}"#,
    );
    fixture.file("resources/_drafts/broken.json", "{");

    let resources = config::load(&fixture.root().join("resources")).unwrap();
    assert_eq!(resources.files.len(), 3);
    assert_eq!(resources.procedures, vec!["configTestDelivery"]);

    let mut dispatcher =
        LocalDispatcher::with_reporter(DispatcherOptions::default(), Box::new(NullReporter));
    let report = dispatcher
        .dispatch(&resources.holders[0], &fixture.elements())
        .unwrap();
    assert_eq!(report.outputs.len(), 2);
    assert_eq!(
        fixture.output_names("acme"),
        vec!["PLATE_01.TXT", "PLATE_02.TXT"]
    );
}

#[test]
fn test_task_kind_presets_across_files() {
    let fixture = Fixture::new();
    fixture.text_inputs("plate", 1);
    fixture.file(
        "resources/kinds.json",
        r#"{"taskKinds": [{"name": "configTestMirror", "base": "copy", "options": {"overwrite": false}}]}"#,
    );
    let tasks = fixture.config(
        "tasks.json",
        r#"{
            "include": ["resources/kinds.json"],
            "tasks": [{"type": "configTestMirror", "target": "@ROOT@/outputs/mirror/{baseName}"}]
        }"#,
    );
    let resources = config::load(&tasks).unwrap();
    assert_eq!(resources.files.len(), 2);
    assert_eq!(resources.holders[0].task().kind_name(), "configTestMirror");

    let mut dispatcher =
        LocalDispatcher::with_reporter(DispatcherOptions::default(), Box::new(NullReporter));
    dispatcher
        .dispatch(&resources.holders[0], &fixture.elements())
        .unwrap();
    assert_eq!(fixture.output_names("mirror"), vec!["plate_01.txt"]);
}
