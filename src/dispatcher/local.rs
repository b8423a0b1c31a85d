//! In-process dispatcher.

use kombi_element::Element;
use std::io::Write;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::{DispatchReport, Dispatcher, DispatcherOptions};
use crate::error::{Error, Result};
use crate::holder::{Skipped, TaskHolder, TaskRunner};
use crate::process::processes;
use crate::reporter::{create_reporter, Reporter, TaskEvent};
use crate::task::{retrying, Task};
use crate::wrapper::{wrappers, WrapperContext, WrapperOutcome};

/// Runs holder trees in this process, executing tasks through wrappers.
pub struct LocalDispatcher {
    options: DispatcherOptions,
    reporter: Box<dyn Reporter>,
    cancelled: Arc<AtomicBool>,
    job_ids: Vec<String>,
    skipped: Vec<Skipped>,
    invocations: usize,
}

impl LocalDispatcher {
    /// Dispatcher reporting to stdout with the configured reporter.
    pub fn new(options: DispatcherOptions) -> Result<Self> {
        Self::with_output(options, Box::new(std::io::stdout()))
    }

    /// Dispatcher reporting to `out` with the configured reporter.
    pub fn with_output(options: DispatcherOptions, out: Box<dyn Write + Send>) -> Result<Self> {
        let reporter = create_reporter(&options.default_reporter, out)?;
        Ok(Self::with_reporter(options, reporter))
    }

    /// Dispatcher using an explicit reporter.
    pub fn with_reporter(options: DispatcherOptions, reporter: Box<dyn Reporter>) -> Self {
        Self {
            options,
            reporter,
            cancelled: Arc::new(AtomicBool::new(false)),
            job_ids: Vec::new(),
            skipped: Vec::new(),
            invocations: 0,
        }
    }

    /// Flag shared with signal handlers; setting it stops further launches.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// Stop launching work and terminate running children.
    pub fn cancel(&self) -> usize {
        self.cancelled.store(true, Ordering::SeqCst);
        processes().cancel_all()
    }

    fn wrapper_name(holder: &TaskHolder, task: &Task) -> String {
        if let Some(name) = task.metadata_str("wrapper.name") {
            return name;
        }
        if let Some(name) = holder.tags().get("wrapper") {
            return name.to_string();
        }
        if task.metadata_bool("dispatch.split") {
            "subprocess".to_string()
        } else {
            "inline".to_string()
        }
    }

    fn chunks(&self, task: &Task) -> Vec<Range<usize>> {
        let len = task.len();
        let size = if task.metadata_bool("dispatch.split") {
            self.options
                .split_size
                .or_else(|| task.metadata_usize("dispatch.splitSize"))
                .filter(|size| *size > 0)
        } else {
            None
        };
        match size {
            Some(size) if len > size => (0..len)
                .step_by(size)
                .map(|start| start..(start + size).min(len))
                .collect(),
            _ => vec![0..len],
        }
    }
}

impl TaskRunner for LocalDispatcher {
    fn run_task(&mut self, holder: &TaskHolder, task: Task) -> Result<Vec<Element>> {
        let label = task.kind_name().to_string();
        let wrapper = wrappers().get(&Self::wrapper_name(holder, &task))?;
        let retries = task.metadata_usize("dispatch.retryCount").unwrap_or(0);
        let context = WrapperContext {
            verbose: self.options.enable_verbose_output,
            detach: !self.options.await_execution,
        };

        let chunks = self.chunks(&task);
        if chunks.len() > 1 {
            tracing::debug!(
                "Splitting {} ({} elements) into {} chunks",
                label,
                task.len(),
                chunks.len()
            );
        }

        let mut outputs = Vec::new();
        for (index, range) in chunks.into_iter().enumerate() {
            if self.cancelled.load(Ordering::SeqCst) {
                return Err(Error::dispatcher("dispatch cancelled"));
            }
            let chunk = task.chunk(range);
            tracing::info!(
                "Launching {} job {} ({} elements) via {}",
                label,
                index + 1,
                chunk.len(),
                wrapper.name()
            );
            let started = Instant::now();
            let outcome = retrying(&label, retries, |_| wrapper.run(&chunk, &context))?;
            match outcome {
                WrapperOutcome::Completed(produced) => {
                    self.invocations += 1;
                    self.job_ids.push(format!("local-{}", self.invocations));
                    let event = TaskEvent {
                        task: label.clone(),
                        inputs: chunk.len(),
                        outputs: produced.clone(),
                        duration_seconds: started.elapsed().as_secs_f64(),
                    };
                    self.reporter.report(&event)?;
                    outputs.extend(produced);
                }
                WrapperOutcome::Launched(pid) => {
                    self.job_ids.push(pid.to_string());
                }
            }
        }
        if !self.options.await_execution && !holder.children().is_empty() {
            tracing::warn!(
                "Not awaiting {}: its child tasks receive no inputs",
                label
            );
        }
        Ok(outputs)
    }

    fn strict(&self) -> bool {
        self.options.strict
    }

    fn skipped(&mut self, skipped: Skipped) {
        tracing::warn!(
            "Skipping {} in {}: {}",
            skipped.element,
            skipped.task,
            skipped.error
        );
        self.skipped.push(skipped);
    }
}

impl Dispatcher for LocalDispatcher {
    fn name(&self) -> &str {
        "local"
    }

    fn options(&self) -> &DispatcherOptions {
        &self.options
    }

    fn dispatch(&mut self, holder: &TaskHolder, elements: &[Element]) -> Result<DispatchReport> {
        self.job_ids.clear();
        self.skipped.clear();
        let outputs = holder.run_with(elements, self)?;
        self.reporter.finish()?;
        Ok(DispatchReport {
            job_ids: std::mem::take(&mut self.job_ids),
            outputs,
            skipped: std::mem::take(&mut self.skipped),
        })
    }
}
