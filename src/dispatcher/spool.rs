//! On-disk farm manager.
//!
//! Jobs are JSON files under `<dir>/jobs/`, named by a zero-padded sequence
//! number. [`SpoolFarm::drain`] runs ready jobs (all dependencies done) in id
//! order until nothing is runnable. A job whose dependencies were extended
//! while it ran goes back to the queue and runs again once they complete.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::renderfarm::{FarmJob, FarmManager};
use crate::error::{Error, Result};

const JOBS_DIR: &str = "jobs";

/// Lifecycle of a spooled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Done,
    Failed,
}

/// A job file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpoolJob {
    pub id: String,
    pub label: String,
    pub aux_path: PathBuf,
    pub dependencies: Vec<String>,
    /// Inclusive binding ranges.
    pub ranges: Vec<(usize, usize)>,
    pub state: JobState,
    /// Number of times the job has been executed.
    #[serde(default)]
    pub runs: usize,
}

/// Outcome of a drain.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainSummary {
    /// Jobs executed to completion.
    pub completed: usize,
    /// Jobs that failed or depend on a failed job.
    pub failed: usize,
    /// Job executions, resumptions included.
    pub runs: usize,
}

/// Farm manager spooling jobs to a directory.
#[derive(Debug, Clone)]
pub struct SpoolFarm {
    dir: PathBuf,
}

impl SpoolFarm {
    /// Open (creating if needed) a spool directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(dir.join(JOBS_DIR))?;
        Ok(Self { dir })
    }

    /// Spool directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn job_path(&self, id: &str) -> PathBuf {
        self.dir.join(JOBS_DIR).join(format!("{id}.json"))
    }

    /// Load one job.
    pub fn job(&self, id: &str) -> Result<SpoolJob> {
        let path = self.job_path(id);
        let contents = fs::read(&path).map_err(|e| Error::load(path.display(), e.to_string()))?;
        Ok(serde_json::from_slice(&contents)?)
    }

    fn save(&self, job: &SpoolJob) -> Result<()> {
        fs::write(self.job_path(&job.id), serde_json::to_vec_pretty(job)?)?;
        Ok(())
    }

    /// Every job, in id order.
    pub fn jobs(&self) -> Result<Vec<SpoolJob>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(self.dir.join(JOBS_DIR))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();
        paths
            .iter()
            .map(|path| {
                let contents = fs::read(path)?;
                Ok(serde_json::from_slice(&contents)?)
            })
            .collect()
    }

    fn next_id(&self) -> Result<String> {
        let last = self
            .jobs()?
            .iter()
            .filter_map(|job| job.id.parse::<usize>().ok())
            .max()
            .unwrap_or(0);
        Ok(format!("{:06}", last + 1))
    }

    /// Run ready jobs until none is left. `executor` runs one range of a job.
    pub fn drain(
        &self,
        mut executor: impl FnMut(&SpoolJob, (usize, usize)) -> Result<()>,
    ) -> Result<DrainSummary> {
        let mut summary = DrainSummary::default();
        loop {
            let jobs = self.jobs()?;
            let state_of = |id: &String| jobs.iter().find(|j| &j.id == id).map(|j| j.state);

            // Jobs depending on a failed job can never run.
            let mut blocked = false;
            for job in jobs.iter().filter(|j| j.state == JobState::Pending) {
                if job
                    .dependencies
                    .iter()
                    .any(|d| matches!(state_of(d), Some(JobState::Failed) | None))
                {
                    let mut job = job.clone();
                    tracing::error!("Job {} ({}) has failed dependencies", job.id, job.label);
                    job.state = JobState::Failed;
                    self.save(&job)?;
                    summary.failed += 1;
                    blocked = true;
                }
            }
            if blocked {
                continue;
            }

            let ready = jobs.iter().find(|job| {
                job.state == JobState::Pending
                    && job
                        .dependencies
                        .iter()
                        .all(|d| state_of(d) == Some(JobState::Done))
            });
            let Some(job) = ready.cloned() else {
                break;
            };

            tracing::info!("Running job {} ({})", job.id, job.label);
            summary.runs += 1;
            let outcome = job.ranges.iter().try_for_each(|range| executor(&job, *range));

            // The job may have extended its own dependencies while running.
            let mut current = self.job(&job.id)?;
            current.runs += 1;
            match outcome {
                Err(e) => {
                    tracing::error!("Job {} failed: {}", job.id, e);
                    current.state = JobState::Failed;
                    summary.failed += 1;
                }
                Ok(()) if current.dependencies.len() > job.dependencies.len() => {
                    tracing::debug!("Job {} waits for {} new dependencies", job.id,
                        current.dependencies.len() - job.dependencies.len());
                }
                Ok(()) => {
                    current.state = JobState::Done;
                    summary.completed += 1;
                }
            }
            self.save(&current)?;
        }
        let pending = self
            .jobs()?
            .iter()
            .filter(|j| j.state == JobState::Pending)
            .count();
        if pending > 0 {
            return Err(Error::dispatcher(format!(
                "{pending} job(s) in {} can never become ready",
                self.dir.display()
            )));
        }
        Ok(summary)
    }
}

impl FarmManager for SpoolFarm {
    fn name(&self) -> &str {
        "spool"
    }

    fn submit(&mut self, job: FarmJob) -> Result<String> {
        let spooled = SpoolJob {
            id: self.next_id()?,
            ranges: job.ranges(),
            label: job.label,
            aux_path: job.aux_path,
            dependencies: job.dependencies,
            state: JobState::Pending,
            runs: 0,
        };
        self.save(&spooled)?;
        tracing::debug!("Spooled job {} ({})", spooled.id, spooled.label);
        Ok(spooled.id)
    }

    fn extend_dependency_ids(&mut self, job_id: &str, dependency_ids: &[String]) -> Result<()> {
        let mut job = self.job(job_id)?;
        for id in dependency_ids {
            if !job.dependencies.contains(id) && id != job_id {
                job.dependencies.push(id.clone());
            }
        }
        self.save(&job)
    }
}
