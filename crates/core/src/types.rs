/// Identifier of a single enhancement attempt (UUID v4).
pub type JobId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// A whole percentage in `0..=100`.
pub type Percent = u8;
