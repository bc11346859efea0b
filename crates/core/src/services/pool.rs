//! Bounded worker pools for extraction and decompilation jobs.
//!
//! A [`PoolTask`] is a fixed batch of independent jobs plus the function that
//! runs one job. It can be run on its own ([`PoolTask::run`]) or handed to a
//! [`PoolCoordinator`] together with a [`ResultSink`], which drives several
//! tasks side by side under one progress display and returns once all of
//! them are drained.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use parking_lot::Mutex;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Max workers must be a positive integer (got {0})")]
    InvalidWorkerCount(usize),

    #[error("Failed to start worker pool: {0}")]
    Spawn(#[from] rayon::ThreadPoolBuildError),

    /// A job failed; `input` identifies which one.
    #[error("Job {input} failed: {source:#}")]
    Job {
        input: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Worker for {0} panicked")]
    Panicked(String),
}

/// Something a job can be scheduled for. `identity` is attached to job errors.
pub trait JobInput: Send + Sync {
    fn identity(&self) -> String;
}

impl JobInput for PathBuf {
    fn identity(&self) -> String {
        self.display().to_string()
    }
}

/// Worker-count and progress settings for one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    /// `None` lets the platform pick.
    pub max_workers: Option<usize>,
    pub show_progress: bool,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self { max_workers: None, show_progress: true }
    }
}

/// Results of a best-effort run: everything that succeeded plus the failures.
#[derive(Debug)]
pub struct BatchOutcome<T> {
    pub results: Vec<T>,
    pub failures: Vec<PoolError>,
}

/// Concurrency-safe, append-only result sequence filled by a coordinated pool.
#[derive(Debug)]
pub struct ResultSink<T> {
    inner: Arc<Mutex<Vec<T>>>,
}

impl<T> ResultSink<T> {
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(Vec::new())) }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the collected items. Other handles to this sink see it empty afterwards.
    pub fn into_vec(self) -> Vec<T> {
        match Arc::try_unwrap(self.inner) {
            Ok(items) => items.into_inner(),
            Err(shared) => std::mem::take(&mut *shared.lock()),
        }
    }

    fn extend(&self, items: Vec<T>) {
        self.inner.lock().extend(items);
    }
}

impl<T> Clone for ResultSink<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T> Default for ResultSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

type JobFn<I, T> = Arc<dyn Fn(&I) -> anyhow::Result<Vec<T>> + Send + Sync>;

/// A batch of independent jobs that has not been started yet.
pub struct PoolTask<I, T> {
    label: String,
    jobs: Vec<I>,
    job: JobFn<I, T>,
    max_workers: Option<usize>,
    progress: ProgressBar,
}

impl<I: JobInput, T: Send> PoolTask<I, T> {
    /// Build a task. A worker count of zero is rejected here, before anything runs.
    pub fn new<F>(
        label: impl Into<String>,
        jobs: Vec<I>,
        options: PoolOptions,
        job: F,
    ) -> Result<Self, PoolError>
    where
        F: Fn(&I) -> anyhow::Result<Vec<T>> + Send + Sync + 'static,
    {
        if let Some(0) = options.max_workers {
            return Err(PoolError::InvalidWorkerCount(0));
        }
        let label = label.into();
        let progress = if options.show_progress {
            ProgressBar::new(jobs.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        progress.set_length(jobs.len() as u64);
        if let Ok(style) = ProgressStyle::with_template("{msg:24} [{bar:32}] {pos}/{len} ({elapsed})")
        {
            progress.set_style(style.progress_chars("=> "));
        }
        progress.set_message(label.clone());

        Ok(Self { label, jobs, job: Arc::new(job), max_workers: options.max_workers, progress })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of jobs in the batch.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Run every job and return the flattened results in submission order.
    ///
    /// The first failing job aborts the batch; its error is returned and no
    /// partial results are.
    pub fn run(self) -> Result<Vec<T>, PoolError> {
        let pool = self.thread_pool()?;
        debug!(task = %self.label, jobs = self.jobs.len(), "running pool");
        let batches: Result<Vec<Vec<T>>, PoolError> =
            pool.install(|| self.jobs.par_iter().map(|input| self.run_job(input)).collect());
        self.finish(batches.is_ok());
        Ok(batches?.into_iter().flatten().collect())
    }

    /// Run every job, keeping the successes and collecting failures instead
    /// of aborting.
    pub fn run_best_effort(self) -> Result<BatchOutcome<T>, PoolError> {
        let pool = self.thread_pool()?;
        debug!(task = %self.label, jobs = self.jobs.len(), "running pool (best effort)");
        let outcomes: Vec<Result<Vec<T>, PoolError>> =
            pool.install(|| self.jobs.par_iter().map(|input| self.run_job(input)).collect());
        self.finish(true);

        let mut batch = BatchOutcome { results: Vec::new(), failures: Vec::new() };
        for outcome in outcomes {
            match outcome {
                Ok(items) => batch.results.extend(items),
                Err(err) => {
                    warn!(task = %self.label, error = %err, "job failed; continuing");
                    batch.failures.push(err);
                }
            }
        }
        Ok(batch)
    }

    fn drain_into(&self, sink: &ResultSink<T>) -> Result<(), PoolError> {
        let pool = self.thread_pool()?;
        debug!(task = %self.label, jobs = self.jobs.len(), "draining pool");
        let drained = pool.install(|| {
            self.jobs.par_iter().try_for_each(|input| {
                sink.extend(self.run_job(input)?);
                Ok(())
            })
        });
        self.finish(drained.is_ok());
        drained
    }

    fn run_job(&self, input: &I) -> Result<Vec<T>, PoolError> {
        let result = (self.job)(input)
            .map_err(|source| PoolError::Job { input: input.identity(), source });
        self.progress.inc(1);
        result
    }

    fn thread_pool(&self) -> Result<rayon::ThreadPool, PoolError> {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(workers) = self.max_workers {
            builder = builder.num_threads(workers);
        }
        Ok(builder.build()?)
    }

    fn finish(&self, ok: bool) {
        if ok {
            self.progress.finish();
        } else {
            self.progress.abandon();
        }
    }
}

trait Drain: Send + Sync {
    fn label(&self) -> &str;
    fn drain(&self) -> Result<(), PoolError>;
}

struct BoundTask<I, T> {
    task: PoolTask<I, T>,
    sink: ResultSink<T>,
}

impl<I: JobInput, T: Send> Drain for BoundTask<I, T> {
    fn label(&self) -> &str {
        self.task.label()
    }

    fn drain(&self) -> Result<(), PoolError> {
        self.task.drain_into(&self.sink)
    }
}

/// Runs several pool tasks concurrently under one combined progress view.
///
/// Each task appends its job results to its own sink as jobs finish.
/// [`PoolCoordinator::run`] blocks until every task is drained. No ordering
/// is guaranteed inside a sink or across sinks, only joint completion.
pub struct PoolCoordinator {
    multi: MultiProgress,
    tasks: Vec<Box<dyn Drain>>,
}

impl PoolCoordinator {
    pub fn new(show_progress: bool) -> Self {
        let multi = if show_progress {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };
        Self { multi, tasks: Vec::new() }
    }

    /// Attach a task and the sink its results are drained into.
    pub fn add<I, T>(mut self, mut task: PoolTask<I, T>, sink: &ResultSink<T>) -> Self
    where
        I: JobInput + 'static,
        T: Send + 'static,
    {
        task.progress = self.multi.add(task.progress.clone());
        self.tasks.push(Box::new(BoundTask { task, sink: sink.clone() }));
        self
    }

    /// Start every task and wait for all of them.
    ///
    /// Returns the first failure in registration order; tasks that were
    /// already running are still waited for.
    pub fn run(self) -> Result<(), PoolError> {
        let outcomes: Vec<Result<(), PoolError>> = thread::scope(|scope| {
            let handles: Vec<_> = self
                .tasks
                .iter()
                .map(|task| (task.label().to_string(), scope.spawn(move || task.drain())))
                .collect();
            handles
                .into_iter()
                .map(|(label, handle)| handle.join().unwrap_or(Err(PoolError::Panicked(label))))
                .collect()
        });
        outcomes.into_iter().collect()
    }
}
