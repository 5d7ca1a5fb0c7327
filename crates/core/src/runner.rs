// Job execution: command splitting, subprocess supervision, cancellation and
// per-batch aggregation

use crate::jobs::{create_job, update_job_status, Job, JobStatus, QueueEntry};
use crate::progress::{ProgressParser, ProgressRecord};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, Notify, Semaphore};
use tracing::{debug, error, info, warn};

/// Exit code reported for a process stopped by a cancel request
pub const CANCELLED_EXIT_CODE: i32 = 255;

/// Events streamed from running jobs, keyed by job id
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    Started { id: String },
    Progress { id: String, record: ProgressRecord },
    Stderr { id: String, line: String },
    Exit { id: String, code: i32 },
}

pub type EventSender = mpsc::UnboundedSender<ProcessEvent>;

/// Cooperative cancellation shared by every job of a batch.
///
/// The request is delivered once to each running process; there is no
/// timeout and no escalation.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelState>,
}

#[derive(Debug, Default)]
struct CancelState {
    requested: AtomicBool,
    notify: Notify,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.requested.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Resolves once [`CancelHandle::cancel`] has been called
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Surfaces job outcomes to the user
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);

    /// Show the log of a failed job
    fn open_log(&self, path: &Path);
}

/// Notifier that reports through `tracing`, optionally opening failure logs
/// with the desktop's default application
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier {
    pub open_logs: bool,
}

impl Notifier for TracingNotifier {
    fn notify(&self, title: &str, body: &str) {
        info!("{}: {}", title, body);
    }

    fn open_log(&self, path: &Path) {
        info!("Log written to {}", path.display());
        if self.open_logs {
            if let Err(e) = open_path(path) {
                warn!("Could not open {}: {:#}", path.display(), e);
            }
        }
    }
}

/// Open `path` with the platform's default handler without waiting for it
pub fn open_path(path: &Path) -> Result<()> {
    let opener = if cfg!(target_os = "windows") {
        "explorer"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };

    std::process::Command::new(opener)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("Failed to spawn {}", opener))?;
    Ok(())
}

/// Play `path` with `ffplay` and wait for the player to close, or hand it
/// to the platform's default player when no ffplay binary is given
pub async fn play_file(ffplay: Option<&str>, path: &Path) -> Result<()> {
    if !path.is_file() {
        anyhow::bail!("{} is not a file", path.display());
    }

    let Some(ffplay) = ffplay else {
        return open_path(path);
    };

    debug!("Playing {} with {}", path.display(), ffplay);
    let status = Command::new(ffplay)
        .arg(path)
        .stdin(Stdio::null())
        .status()
        .await
        .with_context(|| format!("Failed to spawn {}", ffplay))?;
    if !status.success() {
        anyhow::bail!("{} exited with {}", ffplay, status);
    }
    Ok(())
}

/// JobExecutor bounds how many jobs run at once
pub struct JobExecutor {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl JobExecutor {
    pub fn new(max_concurrent_jobs: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent_jobs)),
            max_concurrent: max_concurrent_jobs,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Run `job_fn` once a slot is free, holding the slot until it finishes
    pub async fn execute_job<F, Fut, T>(&self, job_fn: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to acquire semaphore permit: {}", e))?;

        job_fn().await
    }
}

/// Split a generated command into invocations, each an argument vector.
///
/// Words follow POSIX shell quoting; invocations are separated by `&&`
/// words. A `&&` word is always a separator, quoted or not.
pub fn split_command(command: &str) -> Result<Vec<Vec<String>>> {
    let words = shell_words::split(command)
        .with_context(|| format!("Failed to tokenize command {:?}", command))?;

    let invocations: Vec<Vec<String>> = words
        .split(|word| word == "&&")
        .map(<[String]>::to_vec)
        .collect();

    if invocations.iter().any(Vec::is_empty) {
        anyhow::bail!("Empty invocation in command {:?}", command);
    }
    Ok(invocations)
}

/// Result of running every invocation of one command
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub code: i32,
    pub stderr: Vec<String>,
}

/// Run `command` for job `id`, streaming progress and stderr as events.
///
/// Invocations run in order and the first non-zero exit stops the chain. A
/// cancel request kills the running invocation once and the job reports
/// [`CANCELLED_EXIT_CODE`].
pub async fn run_command(
    id: &str,
    command: &str,
    input: &Path,
    length_us: u64,
    events: &EventSender,
    cancel: &CancelHandle,
) -> Result<RunOutput> {
    let invocations = split_command(command)?;
    let mut stderr = Vec::new();

    for argv in invocations {
        if cancel.is_cancelled() {
            return Ok(RunOutput {
                code: CANCELLED_EXIT_CODE,
                stderr,
            });
        }

        let code = run_invocation(id, &argv, input, length_us, events, cancel, &mut stderr).await?;
        if code != 0 {
            return Ok(RunOutput { code, stderr });
        }
    }

    Ok(RunOutput { code: 0, stderr })
}

async fn run_invocation(
    id: &str,
    argv: &[String],
    input: &Path,
    length_us: u64,
    events: &EventSender,
    cancel: &CancelHandle,
    stderr_lines: &mut Vec<String>,
) -> Result<i32> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("Empty invocation"))?;
    debug!("[{}] Spawning {} with {} arguments", id, program, args.len());

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| anyhow::anyhow!("Failed to spawn {}: {}", program, e))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow::anyhow!("Failed to capture stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow::anyhow!("Failed to capture stderr"))?;

    // Forward stderr as it arrives and keep it for the failure log
    let stderr_events = events.clone();
    let stderr_id = id.to_string();
    let stderr_task = tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        let mut output = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            let _ = stderr_events.send(ProcessEvent::Stderr {
                id: stderr_id.clone(),
                line: line.clone(),
            });
            output.push(line);
        }
        output
    });

    let mut reader = BufReader::new(stdout).lines();
    let mut parser = ProgressParser::new();
    let mut record = ProgressRecord::new(input.to_path_buf(), length_us);
    let mut kill_sent = false;

    loop {
        tokio::select! {
            line = reader.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if let Some(info) = parser.push_line(&line) {
                            record.update(&info);
                            let _ = events.send(ProcessEvent::Progress {
                                id: id.to_string(),
                                record: record.clone(),
                            });
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("[{}] Failed to read stdout: {}", id, e);
                        break;
                    }
                }
            }
            _ = cancel.cancelled(), if !kill_sent => {
                info!("[{}] Cancel requested, stopping {}", id, program);
                kill_sent = true;
                if let Err(e) = child.start_kill() {
                    warn!("[{}] Failed to signal {}: {}", id, program, e);
                }
            }
        }
    }

    let status = child
        .wait()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for {}: {}", program, e))?;

    let lines = stderr_task
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read stderr: {}", e))?;
    stderr_lines.extend(lines);

    if kill_sent && !status.success() {
        return Ok(CANCELLED_EXIT_CODE);
    }
    // Killed by a signal nobody here sent
    Ok(status.code().unwrap_or(-1))
}

/// Settings shared by every job of a batch
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub max_concurrent_jobs: usize,
    pub log_dir: PathBuf,
}

/// Tallies of one batch run, created by [`run_batch`] and returned from it
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub jobs: Vec<Job>,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchSummary {
    pub fn record(&mut self, job: Job) {
        match job.status {
            JobStatus::Success => self.succeeded += 1,
            JobStatus::Cancelled => self.cancelled += 1,
            JobStatus::Failed | JobStatus::Pending | JobStatus::Running => self.failed += 1,
        }
        self.jobs.push(job);
    }

    pub fn total(&self) -> usize {
        self.jobs.len()
    }

    /// Jobs that did not succeed, cancelled ones included
    pub fn unsuccessful(&self) -> usize {
        self.failed + self.cancelled
    }

    pub fn all_succeeded(&self) -> bool {
        self.unsuccessful() == 0
    }
}

/// Path of the stderr log written for a failed job
pub fn failure_log_path(log_dir: &Path, id: &str) -> PathBuf {
    log_dir.join(format!("vencoder-{}.log", id))
}

/// Run one queued conversion to completion and return its job record
pub async fn run_job(
    entry: &QueueEntry,
    log_dir: &Path,
    notifier: &dyn Notifier,
    events: &EventSender,
    cancel: &CancelHandle,
) -> Job {
    let mut job = create_job(entry);

    if cancel.is_cancelled() {
        job.exit_code = Some(CANCELLED_EXIT_CODE);
        job.reason = Some("cancelled before start".to_string());
        update_job_status(&mut job, JobStatus::Cancelled);
        let _ = events.send(ProcessEvent::Exit {
            id: job.id.clone(),
            code: CANCELLED_EXIT_CODE,
        });
        return job;
    }

    update_job_status(&mut job, JobStatus::Running);
    let _ = events.send(ProcessEvent::Started { id: job.id.clone() });
    info!("[{}] Converting {}", job.id, entry.input.display());

    let outcome = run_command(
        &job.id,
        &entry.command,
        &entry.input,
        entry.length_us,
        events,
        cancel,
    )
    .await;

    let (code, stderr) = match outcome {
        Ok(output) => (Some(output.code), output.stderr),
        Err(e) => {
            error!("[{}] {:#}", job.id, e);
            job.reason = Some(format!("{:#}", e));
            (None, vec![format!("{:#}", e)])
        }
    };
    job.exit_code = code;

    match code {
        Some(0) => {
            info!("[{}] Finished {}", job.id, entry.output.display());
            update_job_status(&mut job, JobStatus::Success);
        }
        Some(CANCELLED_EXIT_CODE) => {
            info!("[{}] Cancelled", job.id);
            job.reason.get_or_insert_with(|| "cancelled".to_string());
            update_job_status(&mut job, JobStatus::Cancelled);
        }
        _ => {
            warn!("[{}] Failed with exit code {:?}", job.id, code);
            if job.reason.is_none() {
                job.reason = code.map(|c| format!("exit code {}", c));
            }
            update_job_status(&mut job, JobStatus::Failed);

            match write_failure_log(log_dir, entry, &job.id, &stderr).await {
                Ok(path) => {
                    notifier.notify(
                        "Conversion failed",
                        &format!("{} could not be converted", entry.input.display()),
                    );
                    notifier.open_log(&path);
                    job.log_path = Some(path);
                }
                Err(e) => error!("[{}] Failed to write log: {:#}", job.id, e),
            }
        }
    }

    let _ = events.send(ProcessEvent::Exit {
        id: job.id.clone(),
        code: code.unwrap_or(-1),
    });
    job
}

async fn write_failure_log(
    log_dir: &Path,
    entry: &QueueEntry,
    id: &str,
    stderr: &[String],
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(log_dir)
        .await
        .with_context(|| format!("Failed to create {:?}", log_dir))?;

    let path = failure_log_path(log_dir, id);
    let contents = format!(
        "input: {}\noutput: {}\ncommand: {}\n\n{}\n",
        entry.input.display(),
        entry.output.display(),
        entry.command,
        stderr.join("\n")
    );
    tokio::fs::write(&path, contents)
        .await
        .with_context(|| format!("Failed to write {:?}", path))?;
    Ok(path)
}

/// Run every entry, at most `max_concurrent_jobs` at a time.
///
/// A failed or cancelled job never stops its siblings. Jobs are reported in
/// queue order.
pub async fn run_batch(
    entries: Vec<QueueEntry>,
    options: &RunOptions,
    notifier: Arc<dyn Notifier>,
    events: EventSender,
    cancel: CancelHandle,
) -> Result<BatchSummary> {
    let executor = Arc::new(JobExecutor::new(options.max_concurrent_jobs.max(1)));
    let mut handles = Vec::with_capacity(entries.len());

    for entry in entries {
        let executor = executor.clone();
        let notifier = notifier.clone();
        let events = events.clone();
        let cancel = cancel.clone();
        let log_dir = options.log_dir.clone();

        handles.push(tokio::spawn(async move {
            executor
                .execute_job(move || async move {
                    Ok(run_job(&entry, &log_dir, notifier.as_ref(), &events, &cancel).await)
                })
                .await
        }));
    }

    let mut summary = BatchSummary::default();
    for handle in handles {
        let job = handle.await.context("Job task panicked")??;
        summary.record(job);
    }

    notifier.notify(
        "Conversions finished",
        &format!(
            "{} of {} succeeded ({} failed, {} cancelled)",
            summary.succeeded,
            summary.total(),
            summary.failed,
            summary.cancelled
        ),
    );
    Ok(summary)
}
