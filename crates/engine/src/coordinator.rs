//! Submission coordinator: the only writer of [`ProgressState`].
//!
//! [`SubmissionCoordinator::spawn`] starts a single long-lived task that
//! owns the state and processes, in arrival order:
//!
//! * start commands from the handle;
//! * upload progress and the provider acknowledgement from the upload task;
//! * simulated ticks from the [`Ticker`];
//! * completion events from the relay.
//!
//! Events from upload tasks and tickers are tagged with the job they
//! belong to and dropped when that job is no longer active, so a
//! superseded job can never move the state again.
//!
//! ```text
//! start ──► Uploading ──ack──► Enhancing ──completion──► Complete
//!               │                  │
//!               └──upload error──► Failed ◄──decode error
//! ```
//!
//! The provider may fire its webhook before the upload request returns.
//! A completion for the active job that arrives while it is still
//! uploading is held and applied right after the acknowledgement.

use std::sync::Arc;
use std::time::Duration;

use enhance_core::artifact::{decode_artifact, RawCompletion};
use enhance_core::estimator::estimated_duration;
use enhance_core::job::{Job, MediaFile};
use enhance_core::progress::{ErrorInfo, Phase, ProgressState};
use enhance_core::session::Session;
use enhance_core::types::{JobId, Percent};
use enhance_relay::events::{CompletionEvent, Subscription};
use enhance_relay::session::ChannelSession;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::provider::{EnhancementProvider, ProviderApiError, SubmissionAck};
use crate::ticker::Ticker;
use crate::upload::{UploadObserver, UploadProgress};

/// Capacity of the command queue between handle and task.
const COMMAND_CHANNEL_CAPACITY: usize = 16;

/// How long shutdown waits for the coordinator task to exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a [`SubmissionCoordinator::start`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new job was submitted.
    Started(JobId),
    /// A job is already uploading or enhancing.
    Busy,
    MissingFile,
    MissingTitle,
    /// The relay has not assigned a session id (or is reconnecting).
    NoSession,
    /// The coordinator has been shut down.
    Closed,
}

impl StartOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started(_))
    }
}

enum Command {
    Start {
        file: Option<MediaFile>,
        title: String,
        reply: oneshot::Sender<StartOutcome>,
    },
}

/// Events produced by tasks the coordinator spawned itself.
#[derive(Debug)]
enum JobEvent {
    UploadProgress {
        job_id: JobId,
        percent: Percent,
    },
    UploadFinished {
        job_id: JobId,
        result: Result<SubmissionAck, ProviderApiError>,
    },
    Tick {
        job_id: JobId,
        percent: Percent,
    },
}

impl JobEvent {
    fn job_id(&self) -> JobId {
        match self {
            Self::UploadProgress { job_id, .. }
            | Self::UploadFinished { job_id, .. }
            | Self::Tick { job_id, .. } => *job_id,
        }
    }
}

/// Handle to the coordinator task.
pub struct SubmissionCoordinator {
    commands: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ProgressState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SubmissionCoordinator {
    /// Spawn the coordinator task.
    ///
    /// `session` is read at each start to obtain the current session id;
    /// `completions` delivers the relay's completion events.
    pub fn spawn(
        provider: Arc<dyn EnhancementProvider>,
        session: watch::Receiver<Session>,
        completions: Subscription<CompletionEvent>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ProgressState::default());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let worker = Worker {
            provider,
            session,
            state: ProgressState::default(),
            state_tx,
            events_tx,
            active: None,
        };
        let handle = tokio::spawn(worker.run(commands_rx, events_rx, completions, cancel.clone()));

        Self {
            commands: commands_tx,
            state_rx,
            cancel,
            task: Mutex::new(Some(handle)),
        }
    }

    /// Spawn a coordinator wired to a live [`ChannelSession`].
    pub fn attach(provider: Arc<dyn EnhancementProvider>, channel: &ChannelSession) -> Self {
        Self::spawn(provider, channel.watch_session(), channel.on_completion())
    }

    /// Start a new job.
    ///
    /// Refused without any state change when a precondition is missing or
    /// a job is already in flight.
    pub async fn start(&self, file: Option<MediaFile>, title: impl Into<String>) -> StartOutcome {
        let (reply, rx) = oneshot::channel();
        let command = Command::Start {
            file,
            title: title.into(),
            reply,
        };
        if self.commands.send(command).await.is_err() {
            return StartOutcome::Closed;
        }
        rx.await.unwrap_or(StartOutcome::Closed)
    }

    /// Current progress snapshot.
    pub fn state(&self) -> ProgressState {
        self.state_rx.borrow().clone()
    }

    /// Receiver that observes every published state.
    pub fn watch(&self) -> watch::Receiver<ProgressState> {
        self.state_rx.clone()
    }

    /// Stop the task, abandoning any job in flight.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.task.lock().await.take() {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await.is_err() {
                tracing::warn!("Coordinator task did not stop in time");
            }
        }
    }
}

impl Drop for SubmissionCoordinator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// The job currently owned by the coordinator.
struct ActiveJob {
    job: Arc<Job>,
    production_id: Option<String>,
    upload: JoinHandle<()>,
    ticker: Option<Ticker>,
    /// Completion that arrived before the acknowledgement.
    held: Option<CompletionEvent>,
}

impl ActiveJob {
    /// Whether a completion payload addresses this job.
    ///
    /// A production uuid wins over the publisher; an untagged payload is
    /// taken to be ours.
    fn owns(&self, raw: &RawCompletion) -> bool {
        if let (Some(production), Some(ours)) = (raw.production(), self.production_id.as_deref()) {
            return production == ours;
        }
        match raw.publisher() {
            Some(publisher) => publisher == self.job.session_id,
            None => true,
        }
    }

    /// Stop everything this job started.
    fn abandon(mut self) {
        self.upload.abort();
        if let Some(mut ticker) = self.ticker.take() {
            ticker.stop();
        }
    }
}

struct Worker {
    provider: Arc<dyn EnhancementProvider>,
    session: watch::Receiver<Session>,
    state: ProgressState,
    state_tx: watch::Sender<ProgressState>,
    events_tx: mpsc::UnboundedSender<JobEvent>,
    active: Option<ActiveJob>,
}

impl Worker {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<JobEvent>,
        mut completions: Subscription<CompletionEvent>,
        cancel: CancellationToken,
    ) {
        tracing::info!("Submission coordinator started");
        let mut completions_open = true;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                Some(event) = events.recv() => self.on_job_event(event),

                completion = completions.recv(), if completions_open => match completion {
                    Some(event) => self.on_completion(event),
                    None => {
                        tracing::warn!("Completion source closed, jobs can no longer complete");
                        completions_open = false;
                    }
                },

                command = commands.recv() => match command {
                    Some(Command::Start { file, title, reply }) => {
                        let outcome = self.start(file, title);
                        let _ = reply.send(outcome);
                    }
                    None => break,
                },
            }
        }

        if let Some(active) = self.active.take() {
            tracing::info!(job_id = %active.job.id, "Abandoning in-flight job");
            active.abandon();
        }
        tracing::info!("Submission coordinator stopped");
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state.clone());
    }

    fn is_active(&self, job_id: JobId) -> bool {
        self.active.as_ref().is_some_and(|a| a.job.id == job_id)
    }

    // ---- commands ----

    fn start(&mut self, file: Option<MediaFile>, title: String) -> StartOutcome {
        if self.state.is_processing() {
            tracing::info!(phase = ?self.state.phase, "Start ignored, a job is already running");
            return StartOutcome::Busy;
        }
        let Some(file) = file else {
            tracing::info!("Start ignored, no file selected");
            return StartOutcome::MissingFile;
        };
        if title.trim().is_empty() {
            tracing::info!("Start ignored, no title given");
            return StartOutcome::MissingTitle;
        }
        let Some(session_id) = self.session.borrow().current_id().map(str::to_string) else {
            tracing::info!("Start ignored, no relay session");
            return StartOutcome::NoSession;
        };

        if let Some(previous) = self.active.take() {
            previous.abandon();
        }

        let job = Arc::new(Job::new(file, title, session_id));
        self.state.reset();
        if let Err(e) = self.state.begin_upload() {
            tracing::error!(error = %e, "Could not enter upload phase");
            return StartOutcome::Busy;
        }
        self.publish();

        tracing::info!(
            job_id = %job.id,
            file = %job.file.name,
            bytes = job.file.size(),
            session_id = %job.session_id,
            "Job started",
        );

        let upload = self.spawn_upload(Arc::clone(&job));
        self.active = Some(ActiveJob {
            job: Arc::clone(&job),
            production_id: None,
            upload,
            ticker: None,
            held: None,
        });
        StartOutcome::Started(job.id)
    }

    fn spawn_upload(&self, job: Arc<Job>) -> JoinHandle<()> {
        let provider = Arc::clone(&self.provider);
        let events = self.events_tx.clone();
        let job_id = job.id;

        let progress_tx = events.clone();
        let observer: UploadObserver = Arc::new(move |progress: UploadProgress| {
            let _ = progress_tx.send(JobEvent::UploadProgress {
                job_id,
                percent: progress.percent(),
            });
        });

        tokio::spawn(async move {
            let result = provider.submit(&job, observer).await;
            let _ = events.send(JobEvent::UploadFinished { job_id, result });
        })
    }

    // ---- job events ----

    fn on_job_event(&mut self, event: JobEvent) {
        if !self.is_active(event.job_id()) {
            tracing::debug!(job_id = %event.job_id(), "Dropping event for inactive job");
            return;
        }

        match event {
            JobEvent::UploadProgress { percent, .. } => match self.state.record_upload(percent) {
                Ok(true) => self.publish(),
                Ok(false) => {}
                Err(e) => tracing::debug!(error = %e, "Upload progress ignored"),
            },
            JobEvent::UploadFinished { result: Ok(ack), .. } => self.on_acknowledged(ack),
            JobEvent::UploadFinished { result: Err(e), .. } => self.on_upload_failed(e),
            JobEvent::Tick { percent, .. } => match self.state.record_simulated(percent) {
                Ok(true) => self.publish(),
                Ok(false) => {}
                Err(e) => tracing::debug!(error = %e, "Simulated tick ignored"),
            },
        }
    }

    fn on_acknowledged(&mut self, ack: SubmissionAck) {
        if let Err(e) = self.state.acknowledge_upload() {
            tracing::warn!(error = %e, "Acknowledgement ignored");
            return;
        }
        self.publish();

        let events = self.events_tx.clone();
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let job_id = active.job.id;
        let duration = estimated_duration(active.job.file.size());

        tracing::info!(
            %job_id,
            production_id = %ack.production_id,
            estimate_ms = duration.as_millis() as u64,
            "Upload acknowledged, enhancing",
        );

        active.production_id = Some(ack.production_id);
        active.ticker = Some(Ticker::start(
            job_id,
            duration,
            self.state.enhance_percent,
            move |percent| {
                let _ = events.send(JobEvent::Tick { job_id, percent });
            },
        ));

        if let Some(held) = active.held.take() {
            tracing::info!(%job_id, "Applying completion received during upload");
            self.on_completion(held);
        }
    }

    fn on_upload_failed(&mut self, error: ProviderApiError) {
        let Some(active) = self.active.take() else {
            return;
        };
        tracing::error!(
            job_id = %active.job.id,
            upload_percent = self.state.upload_percent,
            error = %error,
            "Upload failed",
        );
        active.abandon();

        if let Err(e) = self.state.fail(ErrorInfo::upload(error.to_string())) {
            tracing::warn!(error = %e, "Could not record upload failure");
        }
        self.publish();
    }

    // ---- relay ----

    fn on_completion(&mut self, event: CompletionEvent) {
        let Some(active) = self.active.as_mut() else {
            tracing::info!(session_id = %event.session_id, "Completion with no active job, discarding");
            return;
        };
        if self.state.phase == Phase::Uploading && active.owns(&event.raw) {
            tracing::info!(job_id = %active.job.id, "Completion arrived before the acknowledgement, holding");
            active.held = Some(event);
            return;
        }
        if self.state.phase != Phase::Enhancing {
            tracing::warn!(
                job_id = %active.job.id,
                phase = ?self.state.phase,
                "Completion arrived outside the enhancing phase, discarding",
            );
            return;
        }
        if !active.owns(&event.raw) {
            tracing::info!(
                job_id = %active.job.id,
                publisher = event.raw.publisher().unwrap_or_default(),
                production = event.raw.production().unwrap_or_default(),
                "Completion for another job, discarding",
            );
            return;
        }

        let Some(active) = self.active.take() else {
            return;
        };
        let job_id = active.job.id;
        active.abandon();

        let result = match decode_artifact(&event.raw) {
            Ok(artifact) => {
                tracing::info!(%job_id, bytes = artifact.len(), "Job complete");
                self.state.complete(artifact)
            }
            Err(e) => {
                tracing::error!(%job_id, error = %e, "Completion payload could not be decoded");
                self.state.fail(ErrorInfo::decode(e.to_string()))
            }
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Completion could not be applied");
        }
        self.publish();
    }
}
