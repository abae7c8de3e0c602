//! Names shared with the remote provider and the push relay.
//!
//! Used by `enhance-engine` when building the multipart submission and
//! by `enhance-relay` / [`crate::artifact`] when reading the completion
//! event.

/// Event the relay emits once the provider's webhook has fired.
pub const DEFAULT_COMPLETION_EVENT: &str = "enhanceAudioComplete";

/// Completion payload field carrying the finished audio.
pub const FIELD_AUDIO_FILE: &str = "audioFile";

/// Completion payload field echoing the session id the job was submitted with.
pub const FIELD_PUBLISHER: &str = "publisher";

/// Completion payload field carrying the provider's production uuid.
pub const FIELD_PRODUCTION: &str = "production";

/// Multipart form field: provider preset identifier.
pub const FORM_PRESET: &str = "preset";

/// Multipart form field: track title.
pub const FORM_TITLE: &str = "title";

/// Multipart form field: the media file itself.
pub const FORM_INPUT_FILE: &str = "input_file";

/// Multipart form field: processing directive.
pub const FORM_ACTION: &str = "action";

/// Multipart form field: completion callback URL.
pub const FORM_WEBHOOK: &str = "webhook";

/// Multipart form field: correlation key (the relay session id).
pub const FORM_PUBLISHER: &str = "publisher";

/// Directive asking the provider to start processing immediately.
pub const ACTION_START: &str = "start";

/// Mime type given to decoded artifacts.
pub const ARTIFACT_MIME_TYPE: &str = "audio/mp3";
