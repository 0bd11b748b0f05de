//! Error taxonomy for image building and guest boot.

use thiserror::Error;

/// All failure kinds across the build and boot pipeline.
///
/// Build-time variants (`CapacityExceeded`, `Format`, `Population`,
/// `Storage`, `Config`) are recoverable at the orchestration level: the
/// builder leaves no artifact behind and the caller may retry after fixing
/// inputs. Boot-time variants (`Mount`, `Exec`) are fatal - there is no
/// process above PID 1 to catch them.
#[derive(Debug, Error)]
pub enum TradeboxError {
    /// Staged content does not fit the declared image capacity.
    #[error("content footprint {content} bytes exceeds image capacity {capacity} bytes")]
    CapacityExceeded { content: u64, capacity: u64 },

    /// Formatting the backing file as ext4 failed.
    #[error("failed to format image: {0}")]
    Format(String),

    /// Mounting, copying into, or unmounting the image failed.
    #[error("failed to populate image: {0}")]
    Population(String),

    /// A boot-time pseudo-filesystem mount was rejected.
    #[error("failed to mount {kind}: {detail}")]
    Mount { kind: &'static str, detail: String },

    /// Replacing init with the payload process failed.
    #[error("failed to exec payload: {0}")]
    Exec(String),

    /// Host-side filesystem or subprocess failure while staging.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid or incomplete build plan.
    #[error("config error: {0}")]
    Config(String),
}

pub type TradeboxResult<T> = Result<T, TradeboxError>;
