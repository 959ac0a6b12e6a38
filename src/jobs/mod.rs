
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::database::sqlite::Database;
use crate::database::sqlite::models::Message;
use crate::providers::CompletionProvider;
use crate::{MailError, Result};

/// Lifecycle of a summarization job. Transitions are strictly forward:
/// pending to running, running to succeeded or failed. Terminal states
/// never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for JobState {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone)]
struct JobRecord {
    message_id: i64,
    state: JobState,
    result: Option<String>,
    error: Option<String>,
    created_at: NaiveDateTime,
    completed_at: Option<NaiveDateTime>,
    submitted_seq: u64,
}

/// Snapshot of a job as seen by a poller. `result` is set only for
/// succeeded jobs, `error` only for failed ones.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub job_id: Uuid,
    #[serde(rename = "status")]
    pub state: JobState,
    pub result: Option<String>,
    pub error: Option<String>,
    pub created_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone)]
pub struct JobQueueConfig {
    pub workers: usize,
    pub completion_timeout: Duration,
    pub max_retained_jobs: usize,
}

impl JobQueueConfig {
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.jobs.workers,
            completion_timeout: Duration::from_secs(config.ollama.completion_timeout_seconds),
            max_retained_jobs: config.jobs.max_retained_jobs,
        }
    }
}

impl Default for JobQueueConfig {
    #[inline]
    fn default() -> Self {
        Self {
            workers: 2,
            completion_timeout: Duration::from_secs(120),
            max_retained_jobs: 1024,
        }
    }
}

#[derive(Debug, Default)]
struct JobTable {
    jobs: HashMap<Uuid, JobRecord>,
    next_seq: u64,
}

/// In-process asynchronous job queue for message summarization. Submission
/// records the job and returns immediately; a fixed pool of workers drains
/// the queue and writes each outcome back to the job table.
pub struct JobQueue {
    table: Arc<Mutex<JobTable>>,
    tx: mpsc::UnboundedSender<Uuid>,
    workers: Vec<JoinHandle<()>>,
    max_retained_jobs: usize,
}

impl JobQueue {
    /// Spawn the worker pool and return the running queue.
    #[inline]
    pub fn start(
        config: JobQueueConfig,
        database: Database,
        completer: Arc<dyn CompletionProvider>,
    ) -> Self {
        let table = Arc::new(Mutex::new(JobTable::default()));
        let (tx, rx) = mpsc::unbounded_channel();
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let worker_count = config.workers.max(1);
        info!("Starting job queue with {worker_count} workers");

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let table = Arc::clone(&table);
            let rx = Arc::clone(&rx);
            let database = database.clone();
            let completer = Arc::clone(&completer);
            let timeout = config.completion_timeout;
            workers.push(tokio::spawn(async move {
                worker_loop(worker_id, table, rx, database, completer, timeout).await;
            }));
        }

        Self {
            table,
            tx,
            workers,
            max_retained_jobs: config.max_retained_jobs,
        }
    }

    /// Register a summarization job for `message_id` and hand it to the
    /// worker pool. The message is not validated here; a missing message
    /// fails the job during execution.
    #[inline]
    pub fn submit(&self, message_id: i64) -> Uuid {
        let job_id = Uuid::new_v4();

        let mut table = self.table.lock().expect("job table lock poisoned");
        let seq = table.next_seq;
        table.next_seq += 1;
        table.jobs.insert(
            job_id,
            JobRecord {
                message_id,
                state: JobState::Pending,
                result: None,
                error: None,
                created_at: chrono::Utc::now().naive_utc(),
                completed_at: None,
                submitted_seq: seq,
            },
        );
        evict_terminal_overflow(&mut table, self.max_retained_jobs);
        drop(table);

        debug!("Submitted job {job_id} for message {message_id}");

        if self.tx.send(job_id).is_err() {
            // Workers are gone; fail the job immediately so pollers are not
            // left with a pending job that will never run.
            let mut table = self.table.lock().expect("job table lock poisoned");
            finish(&mut table, job_id, Err("job queue is stopped".to_string()));
        }

        job_id
    }

    /// Non-blocking status lookup. Unknown ids are an error so pollers can
    /// distinguish "never submitted" from "not finished yet".
    #[inline]
    pub fn poll(&self, job_id: Uuid) -> Result<JobStatus> {
        let table = self.table.lock().expect("job table lock poisoned");
        let record = table
            .jobs
            .get(&job_id)
            .ok_or_else(|| MailError::NotFound(format!("job {job_id} not found")))?;

        Ok(JobStatus {
            job_id,
            state: record.state,
            result: record.result.clone(),
            error: record.error.clone(),
            created_at: record.created_at,
            completed_at: record.completed_at,
        })
    }

    #[inline]
    pub fn job_count(&self) -> usize {
        let table = self.table.lock().expect("job table lock poisoned");
        table.jobs.len()
    }

    #[cfg(test)]
    pub(crate) async fn stop_workers_for_test(&mut self) {
        for worker in self.workers.drain(..) {
            worker.abort();
            let _ = worker.await;
        }
    }

    /// Stop accepting work and wait for in-flight jobs to finish.
    #[inline]
    pub async fn shutdown(mut self) {
        drop(self.tx);
        for worker in self.workers.drain(..) {
            if let Err(error) = worker.await {
                warn!("Job worker exited abnormally: {error}");
            }
        }
        info!("Job queue stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    table: Arc<Mutex<JobTable>>,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Uuid>>>,
    database: Database,
    completer: Arc<dyn CompletionProvider>,
    timeout: Duration,
) {
    debug!("Job worker {worker_id} started");

    loop {
        let job_id = {
            let mut rx = rx.lock().await;
            match rx.recv().await {
                Some(job_id) => job_id,
                None => break,
            }
        };

        // Claim the job: only a pending job may move to running. Anything
        // else was already handled and is skipped.
        let message_id = {
            let mut table = table.lock().expect("job table lock poisoned");
            let record = match table.jobs.get_mut(&job_id) {
                Some(record) if record.state == JobState::Pending => record,
                Some(_) | None => {
                    debug!("Worker {worker_id} skipping already-claimed job {job_id}");
                    continue;
                }
            };
            record.state = JobState::Running;
            record.message_id
        };

        debug!("Worker {worker_id} running job {job_id} for message {message_id}");

        let outcome = run_summarization(
            &database,
            Arc::clone(&completer),
            message_id,
            timeout,
        )
        .await;

        let mut table = table.lock().expect("job table lock poisoned");
        finish(&mut table, job_id, outcome);
    }

    debug!("Job worker {worker_id} stopped");
}

/// Fetch the message and run the completion call, bounded by `timeout`.
async fn run_summarization(
    database: &Database,
    completer: Arc<dyn CompletionProvider>,
    message_id: i64,
    timeout: Duration,
) -> std::result::Result<String, String> {
    let message = database
        .get_message_by_id(message_id)
        .await
        .map_err(|e| format!("failed to load message {message_id}: {e:#}"))?
        .ok_or_else(|| format!("message {message_id} not found"))?;

    let prompt = summary_prompt(&message);
    let completion = tokio::time::timeout(
        timeout,
        tokio::task::spawn_blocking(move || completer.complete(&prompt)),
    )
    .await
    .map_err(|_| format!("summarization timed out after {}s", timeout.as_secs()))?
    .map_err(|e| format!("summarization task panicked: {e}"))?
    .map_err(|e| format!("completion failed: {e:#}"))?;

    let summary = completion.trim().to_string();
    if summary.is_empty() {
        return Err("completion returned an empty summary".to_string());
    }
    Ok(summary)
}

fn summary_prompt(message: &Message) -> String {
    format!(
        "Provide a concise, one-sentence summary of the following email.\n\n\
         ---\nSubject: {}\n\nBody: {}\n---",
        message.subject, message.body
    )
}

/// Record a terminal outcome. Jobs that already reached a terminal state
/// keep their first outcome.
fn finish(table: &mut JobTable, job_id: Uuid, outcome: std::result::Result<String, String>) {
    let Some(record) = table.jobs.get_mut(&job_id) else {
        warn!("Finished job {job_id} is no longer in the table");
        return;
    };
    if record.state.is_terminal() {
        warn!("Job {job_id} already terminal, ignoring late outcome");
        return;
    }

    match outcome {
        Ok(summary) => {
            record.state = JobState::Succeeded;
            record.result = Some(summary);
        }
        Err(reason) => {
            warn!("Job {job_id} failed: {reason}");
            record.state = JobState::Failed;
            record.error = Some(reason);
        }
    }
    record.completed_at = Some(chrono::Utc::now().naive_utc());
}

/// Keep the table bounded by dropping the oldest terminal jobs once the
/// total exceeds `max_retained_jobs`. Pending and running jobs are never
/// evicted.
fn evict_terminal_overflow(table: &mut JobTable, max_retained_jobs: usize) {
    if table.jobs.len() <= max_retained_jobs {
        return;
    }

    let overflow = table.jobs.len() - max_retained_jobs;
    let mut terminal: Vec<(Uuid, u64)> = table
        .jobs
        .iter()
        .filter(|(_, record)| record.state.is_terminal())
        .map(|(id, record)| (*id, record.submitted_seq))
        .collect();
    terminal.sort_by_key(|(_, seq)| *seq);

    for (job_id, _) in terminal.into_iter().take(overflow) {
        table.jobs.remove(&job_id);
    }
}
