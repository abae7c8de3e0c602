//! Remote enhancement provider.
//!
//! [`EnhancementProvider`] is the seam the coordinator talks to;
//! [`ProviderApi`] implements it over HTTP with a single multipart
//! submission using [`reqwest`]. Only success, failure and decodability
//! of the acknowledgement matter here; the provider's own job status
//! arrives later through the relay.

use std::time::Duration;

use async_trait::async_trait;
use enhance_core::job::Job;
use enhance_core::wire::{
    ACTION_START, FORM_ACTION, FORM_INPUT_FILE, FORM_PRESET, FORM_PUBLISHER, FORM_TITLE,
    FORM_WEBHOOK,
};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::upload::{progress_stream, UploadObserver, UPLOAD_CHUNK_SIZE};

/// Default production endpoint.
pub const DEFAULT_PROVIDER_URL: &str = "https://auphonic.com/api/simple/productions.json";

/// Default preset applied to every submission.
pub const DEFAULT_PRESET: &str = "ZAoTrRzrkYUQMwAAqjm6JR";

/// Default callback the provider notifies on completion.
pub const DEFAULT_WEBHOOK_URL: &str = "https://socket-server-lcbd.onrender.com/auphonic-enhance-audio";

/// Accepts a job submission and acknowledges it.
#[async_trait]
pub trait EnhancementProvider: Send + Sync {
    /// Upload the job's file and start remote processing.
    ///
    /// `observer` is called as the file body is transferred.
    async fn submit(
        &self,
        job: &Job,
        observer: UploadObserver,
    ) -> Result<SubmissionAck, ProviderApiError>;
}

/// A successful acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionAck {
    /// Provider-side identifier of the created production.
    pub production_id: String,
}

/// Endpoint and fixed form values.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub url: String,
    pub preset: String,
    pub webhook_url: String,
    /// Whole-request timeout; `None` leaves large uploads unbounded.
    pub request_timeout: Option<Duration>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_PROVIDER_URL.to_string(),
            preset: DEFAULT_PRESET.to_string(),
            webhook_url: DEFAULT_WEBHOOK_URL.to_string(),
            request_timeout: None,
        }
    }
}

/// Acknowledgement body returned by the provider.
#[derive(Debug, Deserialize)]
pub struct ProductionAck {
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub data: Option<ProductionData>,
}

/// The `data` object of an acknowledgement.
#[derive(Debug, Deserialize)]
pub struct ProductionData {
    pub uuid: String,
    #[serde(default)]
    pub status_string: Option<String>,
}

/// Errors from the provider HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum ProviderApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Provider API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The acknowledgement reported a failure.
    #[error("Submission rejected ({status_code}): {message}")]
    Rejected { status_code: u16, message: String },

    /// The acknowledgement could not be understood.
    #[error("Malformed acknowledgement: {0}")]
    MalformedAck(String),
}

/// HTTP client for the provider.
pub struct ProviderApi {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl ProviderApi {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Build the multipart form for a job.
    fn build_form(&self, job: &Job, observer: UploadObserver) -> Result<Form, ProviderApiError> {
        let body = reqwest::Body::wrap_stream(progress_stream(
            job.file.shared_bytes(),
            UPLOAD_CHUNK_SIZE,
            observer,
        ));
        let file_part = Part::stream_with_length(body, job.file.size())
            .file_name(job.file.name.clone())
            .mime_str(&job.file.mime_type)?;

        Ok(Form::new()
            .text(FORM_PRESET, self.config.preset.clone())
            .text(FORM_TITLE, job.title.clone())
            .part(FORM_INPUT_FILE, file_part)
            .text(FORM_ACTION, ACTION_START)
            .text(FORM_WEBHOOK, self.config.webhook_url.clone())
            .text(FORM_PUBLISHER, job.session_id.clone()))
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ProviderApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ProviderApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Decode and validate the acknowledgement body.
    async fn parse_ack(response: reqwest::Response) -> Result<SubmissionAck, ProviderApiError> {
        let response = Self::ensure_success(response).await?;
        let text = response.text().await?;
        ack_from_body(&text)
    }
}

#[async_trait]
impl EnhancementProvider for ProviderApi {
    async fn submit(
        &self,
        job: &Job,
        observer: UploadObserver,
    ) -> Result<SubmissionAck, ProviderApiError> {
        let form = self.build_form(job, observer)?;

        let mut request = self.client.post(&self.config.url).multipart(form);
        if let Some(timeout) = self.config.request_timeout {
            request = request.timeout(timeout);
        }

        tracing::info!(
            job_id = %job.id,
            bytes = job.file.size(),
            session_id = %job.session_id,
            "Submitting job to provider",
        );

        let response = request.send().await?;
        Self::parse_ack(response).await
    }
}

/// Validate an acknowledgement body.
pub fn ack_from_body(body: &str) -> Result<SubmissionAck, ProviderApiError> {
    let ack: ProductionAck = serde_json::from_str(body)
        .map_err(|e| ProviderApiError::MalformedAck(format!("{e}: {body}")))?;

    if let Some(code) = ack.status_code.filter(|c| *c != 200) {
        return Err(ProviderApiError::Rejected {
            status_code: code,
            message: ack.error_message.unwrap_or_default(),
        });
    }

    let data = ack
        .data
        .ok_or_else(|| ProviderApiError::MalformedAck("missing `data` object".into()))?;
    if data.uuid.is_empty() {
        return Err(ProviderApiError::MalformedAck("empty production uuid".into()));
    }

    tracing::debug!(
        production_id = %data.uuid,
        status = data.status_string.as_deref().unwrap_or("unknown"),
        "Provider acknowledged submission",
    );

    Ok(SubmissionAck {
        production_id: data.uuid,
    })
}
