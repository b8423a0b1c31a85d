//! Render farm dispatcher.
//!
//! Dispatching submits one *collapsed* job for the root holder. Executing a
//! collapsed job binds its inputs, submits an *expanded* job that performs
//! the bound task (split into ranges when `dispatch.split` is set) and one
//! collapsed job per child holder, depending on the expanded job. The
//! collapsed job then extends its own dependencies with everything it
//! submitted, so jobs waiting on it wait for the whole subtree.
//!
//! Each holder node owns a data directory. Expanded jobs write
//! `result_<start>_<end>.json` files there (zero padded, so lexical order is
//! input order) and child collapsed jobs read them back. The collapsed job's
//! `_jobProcessed` sentinel lives in the same directory and makes a resumed
//! job a no-op; it is removed again when the job fails so the farm can retry.

use kombi_element::Element;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::farm_managers;
use super::{DispatchReport, Dispatcher, DispatcherOptions};
use crate::error::{Error, Result};
use crate::holder::{HolderScope, Status, TaskHolder};
use crate::task::retrying;
use crate::wrapper::{read_result, wrappers, write_result, WrapperContext, WrapperOutcome};

/// Sentinel marking a collapsed job as processed.
pub const JOB_PROCESSED: &str = "_jobProcessed";

const INPUTS_FILE: &str = "inputs.json";
const AUX_FILE: &str = "aux.json";
const RESULT_PREFIX: &str = "result_";

/// Farm job granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    /// Evaluates a holder and submits the work below it.
    Collapsed,
    /// Performs a bound task over a range of its bindings.
    Expanded,
}

/// Contents of a farm job's auxiliary data file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuxData {
    pub job_type: JobType,
    pub task_holder: JsonValue,
    pub dispatcher: JsonValue,
    /// Element files or result directories, read in order.
    pub task_input_file_paths: Vec<PathBuf>,
    /// Data directory of the holder node.
    pub task_result_file_path: PathBuf,
}

impl AuxData {
    fn write(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(match self.job_type {
            JobType::Collapsed => AUX_FILE.to_string(),
            JobType::Expanded => format!("expanded_{AUX_FILE}"),
        });
        fs::write(&path, serde_json::to_vec_pretty(self)?)?;
        Ok(path)
    }

    fn read(path: &Path) -> Result<Self> {
        let contents = fs::read(path)
            .map_err(|e| Error::load(path.display(), e.to_string()))?;
        Ok(serde_json::from_slice(&contents)?)
    }
}

/// A job handed to a farm manager.
#[derive(Debug, Clone, PartialEq)]
pub struct FarmJob {
    pub label: String,
    pub aux_path: PathBuf,
    pub dependencies: Vec<String>,
    /// Bindings per range; `None` runs the job as a single range.
    pub chunk_size: Option<usize>,
    /// Number of bindings (expanded jobs) or 1 (collapsed jobs).
    pub total: usize,
}

impl FarmJob {
    /// Inclusive binding ranges the job is split into.
    pub fn ranges(&self) -> Vec<(usize, usize)> {
        let total = self.total.max(1);
        let size = self.chunk_size.filter(|s| *s > 0).unwrap_or(total);
        (0..total)
            .step_by(size)
            .map(|start| (start, (start + size).min(total) - 1))
            .collect()
    }
}

/// Scheduler integration used by the render farm dispatcher.
pub trait FarmManager {
    /// Registered name.
    fn name(&self) -> &str;

    /// Queue a job, returning its id.
    fn submit(&mut self, job: FarmJob) -> Result<String>;

    /// Make `job_id` additionally wait for `dependency_ids`.
    fn extend_dependency_ids(&mut self, job_id: &str, dependency_ids: &[String]) -> Result<()>;
}

/// Spool directory in `options`, defaulting below the temp dir.
pub(crate) fn spool_dir(options: &DispatcherOptions) -> PathBuf {
    options
        .spool_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("kombi-spool"))
}

/// Submits holder trees as farm jobs.
pub struct RenderFarmDispatcher {
    options: DispatcherOptions,
    manager: Box<dyn FarmManager>,
}

impl RenderFarmDispatcher {
    /// Dispatcher using the farm manager named in `options`.
    pub fn new(mut options: DispatcherOptions) -> Result<Self> {
        options.spool_dir = Some(spool_dir(&options));
        let manager = farm_managers().create(&options)?;
        Ok(Self::with_manager(options, manager))
    }

    /// Dispatcher using an explicit farm manager.
    pub fn with_manager(options: DispatcherOptions, manager: Box<dyn FarmManager>) -> Self {
        Self { options, manager }
    }

    fn data_root(&self) -> PathBuf {
        spool_dir(&self.options).join("data")
    }

    fn node_dir(&self) -> PathBuf {
        self.data_root().join(Uuid::new_v4().simple().to_string())
    }

    fn submit_collapsed(
        &mut self,
        holder: &TaskHolder,
        inputs: Vec<PathBuf>,
        dependencies: Vec<String>,
    ) -> Result<String> {
        let dir = self.node_dir();
        let aux = AuxData {
            job_type: JobType::Collapsed,
            task_holder: holder.to_json()?,
            dispatcher: self.to_json()?,
            task_input_file_paths: inputs,
            task_result_file_path: dir.clone(),
        };
        let aux_path = aux.write(&dir)?;
        let id = self.manager.submit(FarmJob {
            label: format!("{} (collapsed)", holder.task().kind_name()),
            aux_path,
            dependencies,
            chunk_size: None,
            total: 1,
        })?;
        tracing::info!("Submitted collapsed {} job {}", holder.task().kind_name(), id);
        Ok(id)
    }

    /// Body of a collapsed job.
    fn process_collapsed(&mut self, aux: &AuxData, job_id: Option<&str>) -> Result<()> {
        let dir = &aux.task_result_file_path;
        let holder = TaskHolder::from_json(&aux.task_holder)?;
        if holder.status() == Status::Ignore {
            tracing::debug!("Ignoring {} holder", holder.task().kind_name());
            return Ok(());
        }
        let elements = read_inputs(&aux.task_input_file_paths)?;
        let scope = holder.scope(&HolderScope::default());
        let (task, skipped) = holder.prepare(&elements, &scope, self.options.strict)?;
        for entry in skipped {
            tracing::warn!("Skipping {} in {}: {}", entry.element, entry.task, entry.error);
        }
        if task.is_empty() {
            tracing::debug!("No elements bound to {}", task.kind_name());
            return Ok(());
        }

        let mut submitted = Vec::new();
        if holder.status() == Status::Bypass {
            let outputs = task.default_output();
            write_result(&result_path(dir, 0, outputs.len() - 1), &outputs)?;
        } else {
            let chunk_size = if task.metadata_bool("dispatch.split") {
                self.options
                    .split_size
                    .or_else(|| task.metadata_usize("dispatch.splitSize"))
            } else {
                None
            };
            let total = task.len();
            let label = task.kind_name().to_string();
            let mut bound = holder.clone();
            *bound.task_mut() = task;
            let aux = AuxData {
                job_type: JobType::Expanded,
                task_holder: bound.to_json()?,
                dispatcher: self.to_json()?,
                task_input_file_paths: Vec::new(),
                task_result_file_path: dir.clone(),
            };
            let aux_path = aux.write(dir)?;
            let id = self.manager.submit(FarmJob {
                label: format!("{label} (expanded)"),
                aux_path,
                dependencies: Vec::new(),
                chunk_size,
                total,
            })?;
            tracing::info!("Submitted expanded {} job {}", label, id);
            submitted.push(id);
        }

        let upstream = submitted.clone();
        for child in holder.children() {
            let mut child = child.clone();
            child.inherit(&scope);
            let id = self.submit_collapsed(&child, vec![dir.clone()], upstream.clone())?;
            submitted.push(id);
        }

        match job_id {
            Some(job_id) if !submitted.is_empty() => {
                self.manager.extend_dependency_ids(job_id, &submitted)?
            }
            Some(_) => {}
            None => tracing::debug!("No farm job id; dependencies of the collapsed job left as is"),
        }
        Ok(())
    }
}

impl Dispatcher for RenderFarmDispatcher {
    fn name(&self) -> &str {
        "renderFarm"
    }

    fn options(&self) -> &DispatcherOptions {
        &self.options
    }

    fn dispatch(&mut self, holder: &TaskHolder, elements: &[Element]) -> Result<DispatchReport> {
        let dir = self.node_dir();
        fs::create_dir_all(&dir)?;
        let inputs = dir.join(INPUTS_FILE);
        write_result(&inputs, elements)?;
        let id = self.submit_collapsed(holder, vec![inputs], Vec::new())?;
        Ok(DispatchReport {
            job_ids: vec![id],
            ..DispatchReport::default()
        })
    }
}

/// Path of the result file for the inclusive range `start..=end`.
pub(crate) fn result_path(dir: &Path, start: usize, end: usize) -> PathBuf {
    dir.join(format!("{RESULT_PREFIX}{start:05}_{end:05}.json"))
}

/// Read elements from element files and result directories, in order.
fn read_inputs(paths: &[PathBuf]) -> Result<Vec<Element>> {
    let mut elements = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut files: Vec<PathBuf> = fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with(RESULT_PREFIX) && n.ends_with(".json"))
                })
                .collect();
            files.sort();
            for file in files {
                elements.extend(read_result(&file)?);
            }
        } else {
            elements.extend(read_result(path)?);
        }
    }
    Ok(elements)
}

/// Execute a farm job described by `aux_path`.
///
/// `range` selects the inclusive binding range of an expanded job (all
/// bindings when absent). `job_id` is the farm's id for this job; collapsed
/// jobs use it to extend their own dependencies.
pub fn execute_aux(aux_path: &Path, range: Option<(usize, usize)>, job_id: Option<&str>) -> Result<()> {
    let aux = AuxData::read(aux_path)?;
    match aux.job_type {
        JobType::Collapsed => execute_collapsed(&aux, job_id),
        JobType::Expanded => execute_expanded(&aux, range),
    }
}

fn farm_options(dispatcher: &JsonValue) -> Result<DispatcherOptions> {
    match dispatcher.get("type").and_then(JsonValue::as_str) {
        Some("renderFarm") => match dispatcher.get("options") {
            Some(options) => Ok(serde_json::from_value(options.clone())?),
            None => Ok(DispatcherOptions::default()),
        },
        other => Err(Error::dispatcher(format!(
            "collapsed job needs a renderFarm dispatcher, got {other:?}"
        ))),
    }
}

fn execute_collapsed(aux: &AuxData, job_id: Option<&str>) -> Result<()> {
    let sentinel = aux.task_result_file_path.join(JOB_PROCESSED);
    if sentinel.exists() {
        tracing::info!("Collapsed job already processed: {}", sentinel.display());
        return Ok(());
    }
    fs::create_dir_all(&aux.task_result_file_path)?;
    fs::write(&sentinel, b"")?;

    let result = farm_options(&aux.dispatcher)
        .and_then(RenderFarmDispatcher::new)
        .and_then(|mut farm| farm.process_collapsed(aux, job_id));
    if let Err(e) = &result {
        tracing::error!("Collapsed job failed: {}", e);
        if let Err(remove) = fs::remove_file(&sentinel) {
            tracing::warn!("Could not remove {}: {}", sentinel.display(), remove);
        }
    }
    result
}

fn execute_expanded(aux: &AuxData, range: Option<(usize, usize)>) -> Result<()> {
    let holder = TaskHolder::from_json(&aux.task_holder)?;
    let task = holder.task();
    if task.is_empty() {
        return Ok(());
    }
    let (start, end) = range.unwrap_or((0, task.len() - 1));
    if start > end || end >= task.len() {
        return Err(Error::dispatcher(format!(
            "range {start}-{end} outside of {} bindings",
            task.len()
        )));
    }
    let chunk = task.chunk(start..end + 1);
    let wrapper_name = chunk
        .metadata_str("wrapper.name")
        .unwrap_or_else(|| "inline".to_string());
    let wrapper = wrappers().get(&wrapper_name)?;
    let retries = chunk.metadata_usize("dispatch.retryCount").unwrap_or(0);
    let context = WrapperContext::default();

    tracing::info!(
        "Running {} bindings {}-{} via {}",
        chunk.kind_name(),
        start,
        end,
        wrapper_name
    );
    let outputs = match retrying(chunk.kind_name(), retries, |_| wrapper.run(&chunk, &context))? {
        WrapperOutcome::Completed(outputs) => outputs,
        WrapperOutcome::Launched(pid) => {
            return Err(Error::dispatcher(format!(
                "expanded job launched detached child {pid}"
            )))
        }
    };
    write_result(&result_path(&aux.task_result_file_path, start, end), &outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;
    use kombi_template::Template;
    use tempfile::tempdir;

    #[test]
    fn test_ranges() {
        let job = |chunk_size, total| FarmJob {
            label: String::new(),
            aux_path: PathBuf::new(),
            dependencies: Vec::new(),
            chunk_size,
            total,
        };
        assert_eq!(job(None, 1).ranges(), vec![(0, 0)]);
        assert_eq!(job(None, 7).ranges(), vec![(0, 6)]);
        assert_eq!(job(Some(3), 7).ranges(), vec![(0, 2), (3, 5), (6, 6)]);
        assert_eq!(job(Some(0), 2).ranges(), vec![(0, 1)]);
    }

    #[test]
    fn test_result_names_sort_in_input_order() {
        let dir = Path::new("/data");
        let mut names = vec![
            result_path(dir, 100, 149),
            result_path(dir, 0, 49),
            result_path(dir, 50, 99),
        ];
        names.sort();
        assert_eq!(names[0], dir.join("result_00000_00049.json"));
        assert_eq!(names[1], dir.join("result_00050_00099.json"));
        assert_eq!(names[2], dir.join("result_00100_00149.json"));
    }

    #[test]
    fn test_processed_collapsed_job_is_noop() {
        let dir = tempdir().unwrap();
        let node = dir.path().join("node");
        fs::create_dir_all(&node).unwrap();
        fs::write(node.join(JOB_PROCESSED), "").unwrap();

        let holder = TaskHolder::new(Task::create("copy").unwrap(), Template::new("").unwrap());
        let aux = AuxData {
            job_type: JobType::Collapsed,
            task_holder: holder.to_json().unwrap(),
            // Would fail if the job were evaluated.
            dispatcher: serde_json::json!({"type": "missing"}),
            task_input_file_paths: vec![dir.path().join("absent.json")],
            task_result_file_path: node.clone(),
        };
        let aux_path = aux.write(&node).unwrap();

        execute_aux(&aux_path, None, Some("000001")).unwrap();
        assert!(node.join(JOB_PROCESSED).exists());
    }

    #[test]
    fn test_failed_collapsed_job_removes_sentinel() {
        let dir = tempdir().unwrap();
        let node = dir.path().join("node");
        let holder = TaskHolder::new(Task::create("copy").unwrap(), Template::new("").unwrap());
        let aux = AuxData {
            job_type: JobType::Collapsed,
            task_holder: holder.to_json().unwrap(),
            dispatcher: serde_json::json!({"type": "renderFarm", "options": {"spoolDir": dir.path()}}),
            task_input_file_paths: vec![dir.path().join("absent.json")],
            task_result_file_path: node.clone(),
        };
        let aux_path = aux.write(&node).unwrap();

        assert!(execute_aux(&aux_path, None, None).is_err());
        assert!(!node.join(JOB_PROCESSED).exists());
    }
}
