use std::io::Write;

use super::{Reporter, TaskEvent};
use crate::error::Result;

/// Newline-delimited JSON, one object per event.
pub struct JsonReporter {
    out: Box<dyn Write + Send>,
}

impl JsonReporter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out }
    }
}

impl Reporter for JsonReporter {
    fn report(&mut self, event: &TaskEvent) -> Result<()> {
        serde_json::to_writer(&mut self.out, event)?;
        writeln!(self.out)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::testing::{event, SharedBuffer};

    #[test]
    fn test_ndjson() {
        let buffer = SharedBuffer::default();
        let mut reporter = JsonReporter::new(Box::new(buffer.clone()));
        reporter.report(&event("copy", &["/out/a.exr"], 1.5)).unwrap();
        reporter.report(&event("remove", &[], 0.0)).unwrap();

        let text = buffer.contents();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["task"], "copy");
        assert_eq!(lines[0]["durationSeconds"], 1.5);
        assert_eq!(lines[0]["outputs"][0]["path"], "/out/a.exr");
        assert_eq!(lines[1]["outputs"].as_array().unwrap().len(), 0);
    }
}
