use std::io::Write;
use std::time::Duration;

use super::{Reporter, TaskEvent};
use crate::error::Result;

struct Section {
    task: String,
    runs: usize,
    seconds: f64,
    outputs: Vec<String>,
}

/// Events grouped by task name in first-seen order, printed on finish.
pub struct DetailedReporter {
    out: Box<dyn Write + Send>,
    sections: Vec<Section>,
}

impl DetailedReporter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out,
            sections: Vec::new(),
        }
    }
}

fn format_duration(seconds: f64) -> String {
    let duration = Duration::from_secs_f64(seconds.max(0.0));
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.3}s", duration.as_secs_f64())
    }
}

impl Reporter for DetailedReporter {
    fn report(&mut self, event: &TaskEvent) -> Result<()> {
        let outputs = event.outputs.iter().map(TaskEvent::output_label);
        match self.sections.iter_mut().find(|s| s.task == event.task) {
            Some(section) => {
                section.runs += 1;
                section.seconds += event.duration_seconds;
                section.outputs.extend(outputs);
            }
            None => self.sections.push(Section {
                task: event.task.clone(),
                runs: 1,
                seconds: event.duration_seconds,
                outputs: outputs.collect(),
            }),
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let total: f64 = self.sections.iter().map(|s| s.seconds).sum();
        for section in self.sections.drain(..) {
            writeln!(
                self.out,
                "{} ({} run{}, {})",
                section.task,
                section.runs,
                if section.runs == 1 { "" } else { "s" },
                format_duration(section.seconds)
            )?;
            for output in &section.outputs {
                writeln!(self.out, "  {output}")?;
            }
        }
        writeln!(self.out, "Total: {}", format_duration(total))?;
        self.out.flush()?;
        Ok(())
    }
}
