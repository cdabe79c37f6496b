use thiserror::Error;

/// Failures the engine can actually raise.
///
/// Absent data and failed preconditions are reported through flag returns,
/// never through this type; the variants here cover I/O and log integrity
/// only.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Checksum, framing, or decode failure mid-stream during replay.
    /// Truncated trailing records are not errors; they are discarded.
    #[error("log corruption in {segment} at offset {offset}: {reason}")]
    Corrupt {
        segment: String,
        offset: u64,
        reason: String,
    },

    #[error("no operation log attached")]
    NoLog,

    #[error("a replay is already in progress")]
    ReplayActive,

    #[error("log is still recording; stop it before replaying")]
    StillRecording,

    #[error("operation log writer is closed")]
    LogClosed,
}
