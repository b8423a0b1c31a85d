//! Shared fixtures for integration tests.
//!
//! [`Fixture`] owns a temporary directory and writes input files and
//! resource files into it.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use kombi::input::collect_elements;
use kombi_element::Element;
use tempfile::TempDir;

/// Temporary tree with an `inputs/` and an `outputs/` directory.
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        fs::create_dir_all(dir.path().join("inputs")).unwrap();
        fs::create_dir_all(dir.path().join("outputs")).unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn inputs(&self) -> PathBuf {
        self.root().join("inputs")
    }

    pub fn outputs(&self) -> PathBuf {
        self.root().join("outputs")
    }

    /// Write a file below the fixture root.
    pub fn file(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    /// Write `count` input files named `<stem>_<nn>.txt`.
    pub fn text_inputs(&self, stem: &str, count: usize) -> Vec<PathBuf> {
        (1..=count)
            .map(|i| self.file(&format!("inputs/{stem}_{i:02}.txt"), &format!("{stem} {i}")))
            .collect()
    }

    /// Write a frame sequence `<name>.<frame>.<ext>` below `inputs/`.
    pub fn sequence(&self, name: &str, frames: std::ops::RangeInclusive<u32>, ext: &str) -> Vec<PathBuf> {
        frames
            .map(|frame| self.file(&format!("inputs/{name}.{frame:04}.{ext}"), ""))
            .collect()
    }

    /// Write a JSON resource file, substituting `@ROOT@` with the fixture root.
    pub fn config(&self, name: &str, json: &str) -> PathBuf {
        let contents = json.replace("@ROOT@", &self.root().display().to_string());
        self.file(name, &contents)
    }

    /// Elements for everything below `inputs/`.
    pub fn elements(&self) -> Vec<Element> {
        collect_elements(&self.inputs()).expect("failed to collect inputs")
    }

    /// Sorted file names below `outputs/<relative>`.
    pub fn output_names(&self, relative: &str) -> Vec<String> {
        let dir = self.outputs().join(relative);
        let mut names: Vec<String> = fs::read_dir(&dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

/// Path of the kombi binary built for this test run.
pub fn kombi_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_kombi"))
}
