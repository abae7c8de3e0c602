//! Externally observable progress of the current job.
//!
//! ```text
//! Idle -> Uploading -> Enhancing -> Complete
//!            |             |
//!            +--> Failed <-+
//! ```
//!
//! Both percentages only move forward within a job. The simulated
//! enhancement value is capped at [`MAX_SIMULATED_PERCENT`]; reaching 100
//! and entering `Complete` requires [`ProgressState::complete`].

use serde::Serialize;

use crate::artifact::ArtifactRef;
use crate::error::CoreError;
use crate::estimator::MAX_SIMULATED_PERCENT;
use crate::types::Percent;

/// Phase of the current job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Uploading,
    Enhancing,
    Complete,
    Failed,
}

/// Where a job failure originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Upload,
    Decode,
}

/// Failure recorded on a terminal `Failed` state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorInfo {
    pub fn upload(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Upload,
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Decode,
            message: message.into(),
        }
    }
}

/// Snapshot of job progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressState {
    pub phase: Phase,
    pub upload_percent: Percent,
    pub enhance_percent: Percent,
    pub artifact: Option<ArtifactRef>,
    pub error: Option<ErrorInfo>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            upload_percent: 0,
            enhance_percent: 0,
            artifact: None,
            error: None,
        }
    }
}

impl ProgressState {
    /// A job is in flight; new starts must be refused.
    pub fn is_processing(&self) -> bool {
        matches!(self.phase, Phase::Uploading | Phase::Enhancing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, Phase::Complete | Phase::Failed)
    }

    /// The single percentage a progress bar should show.
    pub fn display_percent(&self) -> Percent {
        match self.phase {
            Phase::Uploading => self.upload_percent,
            _ => self.enhance_percent,
        }
    }

    /// Short heading for the current phase.
    pub fn phase_label(&self) -> &'static str {
        match self.phase {
            Phase::Idle => "Idle",
            Phase::Uploading => "Uploading...",
            Phase::Enhancing => "Enhancing...",
            Phase::Complete => "Complete",
            Phase::Failed => "Failed",
        }
    }

    /// Return to `Idle`, discarding everything from the previous job.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// `Idle -> Uploading`.
    pub fn begin_upload(&mut self) -> Result<(), CoreError> {
        self.require(Phase::Idle, "begin upload")?;
        self.phase = Phase::Uploading;
        self.upload_percent = 0;
        self.enhance_percent = 0;
        Ok(())
    }

    /// Record real upload progress. Returns whether the value moved.
    pub fn record_upload(&mut self, percent: Percent) -> Result<bool, CoreError> {
        self.require(Phase::Uploading, "record upload progress")?;
        let percent = percent.min(100);
        if percent > self.upload_percent {
            self.upload_percent = percent;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// `Uploading -> Enhancing` once the provider acknowledged the upload.
    pub fn acknowledge_upload(&mut self) -> Result<(), CoreError> {
        self.require(Phase::Uploading, "acknowledge upload")?;
        self.upload_percent = 100;
        self.phase = Phase::Enhancing;
        Ok(())
    }

    /// Record a simulated enhancement tick. Returns whether the value moved.
    pub fn record_simulated(&mut self, percent: Percent) -> Result<bool, CoreError> {
        self.require(Phase::Enhancing, "record simulated progress")?;
        let percent = percent.min(MAX_SIMULATED_PERCENT);
        if percent > self.enhance_percent {
            self.enhance_percent = percent;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// `Enhancing -> Complete` on the completion event.
    pub fn complete(&mut self, artifact: ArtifactRef) -> Result<(), CoreError> {
        self.require(Phase::Enhancing, "complete")?;
        self.enhance_percent = 100;
        self.artifact = Some(artifact);
        self.phase = Phase::Complete;
        Ok(())
    }

    /// `Uploading | Enhancing -> Failed`. Percentages are left where they were.
    pub fn fail(&mut self, error: ErrorInfo) -> Result<(), CoreError> {
        if !self.is_processing() {
            return Err(CoreError::InvalidTransition {
                from: self.phase,
                action: "fail",
            });
        }
        self.error = Some(error);
        self.phase = Phase::Failed;
        Ok(())
    }

    fn require(&self, phase: Phase, action: &'static str) -> Result<(), CoreError> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition {
                from: self.phase,
                action,
            })
        }
    }
}
