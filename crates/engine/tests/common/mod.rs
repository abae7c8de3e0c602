//! Test doubles for the engine: a scripted provider and a hand-driven
//! relay feed.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use enhance_core::artifact::RawCompletion;
use enhance_core::estimator::BYTES_PER_MB;
use enhance_core::job::{Job, MediaFile};
use enhance_core::session::Session;
use enhance_engine::coordinator::SubmissionCoordinator;
use enhance_engine::provider::{EnhancementProvider, ProviderApiError, SubmissionAck};
use enhance_engine::upload::{UploadObserver, UploadProgress};
use enhance_relay::events::{CompletionEvent, Subscription};
use tokio::sync::{broadcast, watch, Notify};

/// What the fake provider answers once the scripted upload is done.
#[derive(Clone)]
pub enum Answer {
    /// Acknowledge with `<prefix>-<n>` for the n-th submission.
    Ack(String),
    Fail { status: u16, body: String },
}

/// Provider that reports scripted upload progress and then answers.
pub struct FakeProvider {
    /// Percentages reported to the observer, in order.
    steps: Vec<u8>,
    answer: Answer,
    /// When set, the answer waits until the gate is opened.
    gate: Option<Arc<Notify>>,
    submissions: AtomicUsize,
    seen: Mutex<Vec<Job>>,
}

impl FakeProvider {
    pub fn acking(prefix: &str) -> Self {
        Self {
            steps: vec![25, 50, 100],
            answer: Answer::Ack(prefix.to_string()),
            gate: None,
            submissions: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_at(percent: u8) -> Self {
        Self {
            steps: (1..=percent).filter(|p| p % 10 == 0 || *p == percent).collect(),
            answer: Answer::Fail {
                status: 502,
                body: "connection reset".into(),
            },
            gate: None,
            submissions: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_steps(mut self, steps: Vec<u8>) -> Self {
        self.steps = steps;
        self
    }

    /// Hold the answer back until the returned gate is notified.
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    pub fn submitted_jobs(&self) -> Vec<Job> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl EnhancementProvider for FakeProvider {
    async fn submit(
        &self,
        job: &Job,
        observer: UploadObserver,
    ) -> Result<SubmissionAck, ProviderApiError> {
        let n = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen.lock().unwrap().push(job.clone());

        for percent in &self.steps {
            observer(UploadProgress {
                sent: u64::from(*percent),
                total: 100,
            });
        }

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        match &self.answer {
            Answer::Ack(prefix) => Ok(SubmissionAck {
                production_id: format!("{prefix}-{n}"),
            }),
            Answer::Fail { status, body } => Err(ProviderApiError::ApiError {
                status: *status,
                body: body.clone(),
            }),
        }
    }
}

/// Stand-in for the relay side: a session watch and a completion feed.
pub struct FakeChannel {
    pub session: watch::Sender<Session>,
    pub completions: broadcast::Sender<CompletionEvent>,
}

impl FakeChannel {
    pub fn connected(id: &str) -> Self {
        let (session, _) = watch::channel(Session::connected(id));
        let (completions, _) = broadcast::channel(16);
        Self {
            session,
            completions,
        }
    }

    pub fn disconnected() -> Self {
        let (session, _) = watch::channel(Session::disconnected());
        let (completions, _) = broadcast::channel(16);
        Self {
            session,
            completions,
        }
    }

    pub fn coordinator(&self, provider: Arc<FakeProvider>) -> SubmissionCoordinator {
        SubmissionCoordinator::spawn(
            provider,
            self.session.subscribe(),
            Subscription::new(self.completions.subscribe()),
        )
    }

    /// Deliver a completion event on the current session.
    pub fn complete(&self, data: serde_json::Value) {
        let session_id = self
            .session
            .borrow()
            .id
            .clone()
            .unwrap_or_default();
        self.completions
            .send(CompletionEvent::new(session_id, RawCompletion::new(data, vec![])))
            .expect("coordinator should be subscribed");
    }
}

/// An in-memory audio file of `megabytes` MB.
pub fn audio_file(megabytes: u64) -> MediaFile {
    MediaFile::new(
        "take.wav",
        "audio/wav",
        vec![0u8; (megabytes * BYTES_PER_MB) as usize],
    )
}
