//! One enhancement run, start to finish.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use enhance_core::job::MediaFile;
use enhance_core::progress::{Phase, ProgressState};
use enhance_engine::coordinator::{StartOutcome, SubmissionCoordinator};
use enhance_engine::provider::ProviderApi;
use enhance_relay::events::ChannelEvent;
use enhance_relay::session::ChannelSession;
use tokio::task::JoinHandle;

use crate::config::ClientConfig;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Could not read {path}: {source}")]
    Input {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Could not write {path}: {source}")]
    Output {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("No relay session after {0:?}")]
    NoSession(Duration),

    #[error("Job was not started: {0:?}")]
    NotStarted(StartOutcome),
}

/// One-line description of a progress snapshot.
pub fn render(state: &ProgressState) -> String {
    match state.phase {
        Phase::Uploading | Phase::Enhancing => {
            format!("{} {}%", state.phase_label(), state.display_percent())
        }
        Phase::Failed => match &state.error {
            Some(error) => format!("Failed: {}", error.message),
            None => "Failed".to_string(),
        },
        _ => state.phase_label().to_string(),
    }
}

/// Connect to the relay, submit the configured file and wait for the
/// job to end. Returns the terminal state; the artifact has been saved
/// when it is `Complete`.
pub async fn run(config: &ClientConfig) -> Result<ProgressState, ClientError> {
    let file = MediaFile::from_path(&config.input_file)
        .await
        .map_err(|source| ClientError::Input {
            path: config.input_file.clone(),
            source,
        })?;

    let channel = ChannelSession::connect(config.relay_config());
    let lifecycle = spawn_lifecycle_logger(&channel);

    let result = drive(&channel, config, file).await;

    lifecycle.abort();
    channel.teardown().await;
    result
}

async fn drive(
    channel: &ChannelSession,
    config: &ClientConfig,
    file: MediaFile,
) -> Result<ProgressState, ClientError> {
    let session_id = channel
        .wait_for_session_id(config.session_wait)
        .await
        .ok_or(ClientError::NoSession(config.session_wait))?;
    tracing::info!(%session_id, "Relay session ready");

    let provider = Arc::new(ProviderApi::new(config.provider.clone()));
    let coordinator = SubmissionCoordinator::attach(provider, channel);
    let mut states = coordinator.watch();

    let outcome = coordinator.start(Some(file), config.track_title.clone()).await;
    let StartOutcome::Started(job_id) = outcome else {
        coordinator.shutdown().await;
        return Err(ClientError::NotStarted(outcome));
    };
    tracing::info!(%job_id, title = %config.track_title, "Enhancement started");

    let mut last_line = String::new();
    let mut state = coordinator.state();
    loop {
        let line = render(&state);
        if line != last_line {
            tracing::info!(%job_id, progress = %line);
            last_line = line;
        }
        if state.is_terminal() || states.changed().await.is_err() {
            break;
        }
        state = states.borrow_and_update().clone();
    }
    coordinator.shutdown().await;

    if let Some(artifact) = state.artifact.as_ref() {
        artifact
            .save_to(&config.output_file)
            .await
            .map_err(|source| ClientError::Output {
                path: config.output_file.clone(),
                source,
            })?;
        tracing::info!(
            path = %config.output_file.display(),
            bytes = artifact.len(),
            "Enhanced audio saved",
        );
    }
    Ok(state)
}

/// Log connection lifecycle signals for as long as the session lives.
fn spawn_lifecycle_logger(channel: &ChannelSession) -> JoinHandle<()> {
    let mut lifecycle = channel.lifecycle();
    tokio::spawn(async move {
        while let Some(event) = lifecycle.recv().await {
            match &event {
                ChannelEvent::ConnectError { .. }
                | ChannelEvent::Disconnected { .. }
                | ChannelEvent::ReconnectFailed { .. } => {
                    tracing::warn!(?event, "Relay lifecycle");
                }
                _ => tracing::info!(?event, "Relay lifecycle"),
            }
        }
    })
}
