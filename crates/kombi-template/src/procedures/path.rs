//! Path procedures: `dirname`, `parentdirname`, `basename`, `findpath`, `rfindpath`.

use std::path::Path;
use walkdir::WalkDir;

use super::Procedure;
use crate::error::{Result, TemplateError};

pub(super) fn procedures() -> Vec<Procedure> {
    vec![
        Procedure::new("dirname", 1, Some(1), |args| Ok(dirname(&args[0]))),
        Procedure::new("parentdirname", 1, Some(1), |args| {
            Ok(dirname(&dirname(&args[0])))
        }),
        Procedure::new("basename", 1, Some(1), |args| Ok(basename(&args[0]))),
        Procedure::new("findpath", 2, Some(2), |args| findpath(&args[0], &args[1])),
        Procedure::new("rfindpath", 2, Some(2), |args| rfindpath(&args[0], &args[1])),
    ]
}

fn dirname(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => trimmed[..idx].to_string(),
        None => String::new(),
    }
}

fn basename(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => trimmed[idx + 1..].to_string(),
        None => trimmed.to_string(),
    }
}

/// Depth-first search below `start` for an entry named `needle`.
fn findpath(needle: &str, start: &str) -> Result<String> {
    let root = Path::new(start);
    if !root.is_dir() {
        return Err(TemplateError::procedure(
            "findpath",
            format!("start directory does not exist: {start}"),
        ));
    }

    WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|entry| entry.file_name().to_string_lossy() == needle)
        .map(|entry| entry.path().display().to_string())
        .ok_or_else(|| {
            TemplateError::procedure("findpath", format!("{needle} not found under {start}"))
        })
}

/// Walk up from `start` looking for a sibling entry named `needle`.
fn rfindpath(needle: &str, start: &str) -> Result<String> {
    let start = Path::new(start);
    let mut current = if start.is_dir() {
        Some(start)
    } else {
        start.parent()
    };

    while let Some(dir) = current {
        let candidate = dir.join(needle);
        if candidate.exists() {
            return Ok(candidate.display().to_string());
        }
        current = dir.parent();
    }

    Err(TemplateError::procedure(
        "rfindpath",
        format!("{needle} not found above {}", start.display()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_dirname_basename() {
        assert_eq!(dirname("/a/b/c.exr"), "/a/b");
        assert_eq!(dirname("/a"), "/");
        assert_eq!(dirname("c.exr"), "");
        assert_eq!(dirname(&dirname("/a/b/c.exr")), "/a");
        assert_eq!(basename("/a/b/c.exr"), "c.exr");
        assert_eq!(basename("/a/b/"), "b");
    }

    #[test]
    fn test_find_and_rfind() {
        let dir = tempdir().unwrap();
        let deep = dir.path().join("show/seq/shot");
        std::fs::create_dir_all(&deep).unwrap();
        std::fs::write(dir.path().join("show/config.json"), b"{}").unwrap();
        std::fs::write(deep.join("plate.exr"), b"").unwrap();

        let found = findpath("plate.exr", &dir.path().display().to_string()).unwrap();
        assert_eq!(found, deep.join("plate.exr").display().to_string());

        let start = deep.join("plate.exr").display().to_string();
        let up = rfindpath("config.json", &start).unwrap();
        assert_eq!(up, dir.path().join("show/config.json").display().to_string());

        assert!(findpath("nothing", &dir.path().display().to_string()).is_err());
        assert!(rfindpath("nothing.json", &start).is_err());
    }
}
