//! Version procedures.
//!
//! A version pattern is a literal prefix, a run of `#` (one per digit) and a
//! literal suffix. The default pattern is `v###`, producing labels such as
//! `v001`.

use std::path::Path;

use super::Procedure;
use crate::error::{Result, TemplateError};

const DEFAULT_PATTERN: &str = "v###";

/// A parsed version pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPattern {
    prefix: String,
    width: usize,
    suffix: String,
}

impl VersionPattern {
    /// Parse a pattern such as `v###` or `take_##_final`.
    pub fn parse(pattern: &str) -> Result<Self> {
        let start = pattern.find('#').ok_or_else(|| {
            TemplateError::procedure("version", format!("pattern has no '#' digits: {pattern}"))
        })?;
        let width = pattern[start..].chars().take_while(|c| *c == '#').count();
        Ok(Self {
            prefix: pattern[..start].to_string(),
            width,
            suffix: pattern[start + width..].to_string(),
        })
    }

    /// Format a version number.
    pub fn label(&self, number: u64) -> String {
        format!(
            "{}{:0width$}{}",
            self.prefix,
            number,
            self.suffix,
            width = self.width
        )
    }

    /// Parse a label produced by this pattern.
    pub fn number(&self, label: &str) -> Option<u64> {
        let digits = label
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(self.suffix.as_str())?;
        if digits.len() < self.width || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Highest version present among the entries of `dir`.
    pub fn latest_in(&self, dir: &Path) -> Option<u64> {
        let entries = std::fs::read_dir(dir).ok()?;
        entries
            .filter_map(|e| e.ok())
            .filter_map(|e| self.number(&e.file_name().to_string_lossy()))
            .max()
    }
}

pub(super) fn procedures() -> Vec<Procedure> {
    vec![
        Procedure::new("labelver", 1, Some(2), |args| {
            let number: u64 = args[0].trim().parse().map_err(|_| {
                TemplateError::procedure("labelver", format!("not a version number: {}", args[0]))
            })?;
            Ok(pattern_arg(args, 1)?.label(number))
        }),
        Procedure::new("newver", 1, Some(2), |args| {
            let pattern = pattern_arg(args, 1)?;
            let next = pattern.latest_in(Path::new(&args[0])).map_or(1, |n| n + 1);
            Ok(pattern.label(next))
        }),
        Procedure::new("latestver", 1, Some(2), |args| {
            let pattern = pattern_arg(args, 1)?;
            pattern
                .latest_in(Path::new(&args[0]))
                .map(|n| pattern.label(n))
                .ok_or_else(|| {
                    TemplateError::procedure("latestver", format!("no versions in {}", args[0]))
                })
        }),
        Procedure::new("verprefix", 1, Some(1), |args| Ok(split_label(&args[0]).0)),
        Procedure::new("vernumber", 1, Some(1), |args| {
            let (_, digits, _) = split_label(&args[0]);
            digits
                .parse::<u64>()
                .map(|n| n.to_string())
                .map_err(|_| {
                    TemplateError::procedure("vernumber", format!("no number in {}", args[0]))
                })
        }),
        Procedure::new("versuffix", 1, Some(1), |args| Ok(split_label(&args[0]).2)),
    ]
}

fn pattern_arg(args: &[String], index: usize) -> Result<VersionPattern> {
    VersionPattern::parse(args.get(index).map_or(DEFAULT_PATTERN, String::as_str))
}

/// Split a label into (leading non-digits, first digit run, remainder).
fn split_label(label: &str) -> (String, String, String) {
    let start = label.find(|c: char| c.is_ascii_digit()).unwrap_or(label.len());
    let end = label[start..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(label.len(), |i| start + i);
    (
        label[..start].to_string(),
        label[start..end].to_string(),
        label[end..].to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procedures::ProcedureRegistry;
    use tempfile::tempdir;

    fn call(name: &str, args: &[&str]) -> Result<String> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        ProcedureRegistry::with_standard().call(name, &args)
    }

    #[test]
    fn test_pattern() {
        let pattern = VersionPattern::parse("take_##_final").unwrap();
        assert_eq!(pattern.label(7), "take_07_final");
        assert_eq!(pattern.number("take_12_final"), Some(12));
        assert_eq!(pattern.number("take_1_final"), None);
        assert!(VersionPattern::parse("v").is_err());
    }

    #[test]
    fn test_labelver() {
        assert_eq!(call("labelver", &["3"]).unwrap(), "v003");
        assert_eq!(call("labelver", &["12", "ver####"]).unwrap(), "ver0012");
    }

    #[test]
    fn test_newver_and_latestver() {
        let dir = tempdir().unwrap();
        let path = dir.path().display().to_string();

        assert_eq!(call("newver", &[&path]).unwrap(), "v001");
        assert!(call("latestver", &[&path]).is_err());

        for name in ["v001", "v004", "v002", "notes.txt"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        assert_eq!(call("newver", &[&path]).unwrap(), "v005");
        assert_eq!(call("latestver", &[&path]).unwrap(), "v004");
        assert_eq!(call("newver", &["/does/not/exist"]).unwrap(), "v001");
    }

    #[test]
    fn test_label_parts() {
        assert_eq!(call("verprefix", &["v003_wip"]).unwrap(), "v");
        assert_eq!(call("vernumber", &["v003_wip"]).unwrap(), "3");
        assert_eq!(call("versuffix", &["v003_wip"]).unwrap(), "_wip");
        assert!(call("vernumber", &["final"]).is_err());
    }
}
