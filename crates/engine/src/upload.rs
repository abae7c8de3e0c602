//! Upload body that reports how many bytes have been handed to the transport.

use std::sync::Arc;

use enhance_core::types::Percent;

/// Size of each body chunk.
pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Bytes transferred so far out of the file total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub sent: u64,
    pub total: u64,
}

impl UploadProgress {
    /// Rounded transferred/total ratio in `0..=100`.
    pub fn percent(&self) -> Percent {
        if self.total == 0 {
            return 100;
        }
        let sent = self.sent.min(self.total);
        ((sent * 100 + self.total / 2) / self.total) as Percent
    }
}

/// Callback invoked for every chunk handed to the transport.
pub type UploadObserver = Arc<dyn Fn(UploadProgress) + Send + Sync>;

/// Split `bytes` into chunks, notifying `observer` as each one is pulled.
pub fn progress_stream(
    bytes: Arc<[u8]>,
    chunk_size: usize,
    observer: UploadObserver,
) -> impl futures::Stream<Item = Result<Vec<u8>, std::io::Error>> + Send + Sync + 'static {
    let total = bytes.len();
    let chunk_size = chunk_size.max(1);

    let chunks = (0..total).step_by(chunk_size).map(move |offset| {
        let end = (offset + chunk_size).min(total);
        observer(UploadProgress {
            sent: end as u64,
            total: total as u64,
        });
        Ok(bytes[offset..end].to_vec())
    });

    futures::stream::iter(chunks)
}
