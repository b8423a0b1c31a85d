use std::io::Write;

use super::{Reporter, TaskEvent};
use crate::error::Result;

const TASK_WIDTH: usize = 18;

/// One row per event: task, input count, output count, duration, first
/// output.
pub struct ColumnsReporter {
    out: Box<dyn Write + Send>,
    header_written: bool,
}

impl ColumnsReporter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out,
            header_written: false,
        }
    }
}

impl Reporter for ColumnsReporter {
    fn report(&mut self, event: &TaskEvent) -> Result<()> {
        if !self.header_written {
            writeln!(
                self.out,
                "{:<width$} {:>6} {:>7} {:>9}  {}",
                "TASK", "INPUTS", "OUTPUTS", "SECONDS", "FIRST OUTPUT",
                width = TASK_WIDTH
            )?;
            self.header_written = true;
        }
        let first = event
            .outputs
            .first()
            .map(TaskEvent::output_label)
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            self.out,
            "{:<width$} {:>6} {:>7} {:>9.3}  {}",
            event.task,
            event.inputs,
            event.outputs.len(),
            event.duration_seconds,
            first,
            width = TASK_WIDTH
        )?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}
