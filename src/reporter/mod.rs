//! Reporting of task events.
//!
//! Dispatchers emit one [`TaskEvent`] per executed task invocation. A
//! [`Reporter`] turns the stream into user-facing output:
//!
//! - `columns`: one aligned row per event, written as events arrive.
//! - `detailed`: events grouped by task with per-output listings and timing,
//!   written when the run finishes.
//! - `json`: newline-delimited JSON objects.

mod columns;
mod detailed;
mod json;

use kombi_element::Element;
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::error::{Error, Result};

pub use columns::ColumnsReporter;
pub use detailed::DetailedReporter;
pub use json::JsonReporter;

/// Names accepted by [`create_reporter`].
pub const REPORTERS: &[&str] = &["columns", "detailed", "json"];

/// One executed task invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEvent {
    /// Task kind name.
    pub task: String,
    /// Number of bound input elements.
    pub inputs: usize,
    /// Produced elements.
    pub outputs: Vec<Element>,
    /// Wall-clock duration.
    pub duration_seconds: f64,
}

impl TaskEvent {
    /// Display label of one output element: its path, else its kind.
    pub fn output_label(element: &Element) -> String {
        element
            .path()
            .map(|p| p.to_string())
            .unwrap_or_else(|| format!("<{}>", element.kind()))
    }
}

/// Consumer of task events.
pub trait Reporter: Send {
    /// Record one event.
    fn report(&mut self, event: &TaskEvent) -> Result<()>;

    /// Flush anything buffered. Called once at the end of a dispatch.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Build a reporter by name, writing to `out`.
pub fn create_reporter(name: &str, out: Box<dyn Write + Send>) -> Result<Box<dyn Reporter>> {
    match name {
        "columns" => Ok(Box::new(ColumnsReporter::new(out))),
        "detailed" => Ok(Box::new(DetailedReporter::new(out))),
        "json" => Ok(Box::new(JsonReporter::new(out))),
        other => Err(Error::config(format!(
            "unknown reporter {other:?} (expected one of {})",
            REPORTERS.join(", ")
        ))),
    }
}

/// A reporter that drops every event.
#[derive(Debug, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&mut self, _event: &TaskEvent) -> Result<()> {
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::SharedBuffer;
    use super::*;

    #[test]
    fn test_unknown_reporter() {
        let err = create_reporter("fancy", Box::new(SharedBuffer::default()))
            .err()
            .unwrap();
        assert!(err.to_string().contains("columns, detailed, json"));
    }

    #[test]
    fn test_output_label_without_path() {
        let element = Element::new("hashmap", None);
        assert_eq!(TaskEvent::output_label(&element), "<hashmap>");
    }
}
