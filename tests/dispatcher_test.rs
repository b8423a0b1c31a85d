//! Local dispatch through child-process wrappers.

mod common;

use assert_matches::assert_matches;
use common::{kombi_bin, Fixture};
use kombi::config;
use kombi::dispatcher::{Dispatcher, DispatcherOptions, LocalDispatcher};
use kombi::reporter::NullReporter;
use kombi::tools::EXECUTABLE_ENV;
use kombi::Error;
use serial_test::serial;

fn local() -> LocalDispatcher {
    LocalDispatcher::with_reporter(DispatcherOptions::default(), Box::new(NullReporter))
}

struct KombiExecutable;

impl KombiExecutable {
    fn set() -> Self {
        std::env::set_var(EXECUTABLE_ENV, kombi_bin());
        KombiExecutable
    }
}

impl Drop for KombiExecutable {
    fn drop(&mut self) {
        std::env::remove_var(EXECUTABLE_ENV);
    }
}

#[test]
#[serial]
fn test_split_dispatch_through_subprocesses() {
    let _exe = KombiExecutable::set();
    let fixture = Fixture::new();
    fixture.text_inputs("plate", 12);
    let path = fixture.config(
        "split.json",
        r#"{"tasks": [{
            "type": "copy",
            "target": "@ROOT@/outputs/split/{baseName}",
            "metadata": {"dispatch.split": true, "dispatch.splitSize": 4}
        }]}"#,
    );
    let holder = config::load(&path).unwrap().holders.remove(0);

    let report = local().dispatch(&holder, &fixture.elements()).unwrap();

    assert_eq!(report.job_ids.len(), 3);
    let names: Vec<String> = report
        .outputs
        .iter()
        .map(|e| e.path().unwrap().name())
        .collect();
    let expected: Vec<String> = (1..=12).map(|i| format!("plate_{i:02}.txt")).collect();
    assert_eq!(names, expected);
    assert_eq!(fixture.output_names("split"), expected);
}

#[test]
#[serial]
fn test_preset_kind_in_child_process() {
    let _exe = KombiExecutable::set();
    let fixture = Fixture::new();
    fixture.text_inputs("plate", 2);
    let path = fixture.config(
        "preset.json",
        r#"{
            "taskKinds": [{"name": "dispatcherTestCopy", "base": "copy", "metadata": {"wrapper.name": "subprocess"}}],
            "tasks": [{"type": "dispatcherTestCopy", "target": "@ROOT@/outputs/preset/{baseName}"}]
        }"#,
    );
    let holder = config::load(&path).unwrap().holders.remove(0);

    let report = local().dispatch(&holder, &fixture.elements()).unwrap();
    assert_eq!(report.outputs.len(), 2);
    assert_eq!(fixture.output_names("preset").len(), 2);
}

#[test]
#[serial]
fn test_child_failure_is_wrapper_failure() {
    let _exe = KombiExecutable::set();
    let fixture = Fixture::new();
    fixture.text_inputs("plate", 1);
    fixture.file("outputs/plate_01.txt", "different contents");
    let path = fixture.config(
        "checksum.json",
        r#"{"tasks": [{
            "type": "checksum",
            "target": "@ROOT@/outputs/{baseName}",
            "metadata": {"wrapper.name": "subprocess"}
        }]}"#,
    );
    let holder = config::load(&path).unwrap().holders.remove(0);

    let err = local().dispatch(&holder, &fixture.elements()).unwrap_err();
    assert_eq!(err.exit_code(), 3);
    assert_matches!(
        err,
        Error::WrapperFailed { wrapper, exit_code: Some(2), stderr }
            if wrapper == "subprocess" && stderr.contains("Checksum mismatch")
    );
}

#[test]
#[serial]
fn test_detached_children() {
    let _exe = KombiExecutable::set();
    let fixture = Fixture::new();
    fixture.text_inputs("plate", 1);
    let path = fixture.config(
        "detached.json",
        r#"{"tasks": [{
            "type": "copy",
            "target": "@ROOT@/outputs/detached/{baseName}",
            "metadata": {"wrapper.name": "subprocess"}
        }]}"#,
    );
    let holder = config::load(&path).unwrap().holders.remove(0);
    let mut dispatcher = LocalDispatcher::with_reporter(
        DispatcherOptions {
            await_execution: false,
            ..DispatcherOptions::default()
        },
        Box::new(NullReporter),
    );

    let report = dispatcher.dispatch(&holder, &fixture.elements()).unwrap();
    assert_eq!(report.job_ids.len(), 1);
    assert!(report.job_ids[0].parse::<u32>().is_ok());
    assert!(report.outputs.is_empty());
}
