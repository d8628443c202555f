use std::path::PathBuf;
use thiserror::Error;

// ── Errors ──────────────────────────────────────────────────────────

/// Failure of any stage of a campaign. Every variant aborts the
/// enclosing campaign; nothing is retried.
#[derive(Debug, Error)]
pub enum CampaignError {
    /// Malformed or out-of-domain input, detected before any side effect.
    #[error("invalid input: {0}")]
    Validation(String),
    /// Environment provisioning or remote command failure.
    #[error("execution failed: {0}")]
    Execution(String),
    /// Measurement output does not match the two-column integer format.
    #[error("malformed measurement output: {0}")]
    Parse(String),
    #[error("cannot sample: {0}")]
    Sampling(String),
    #[error("cannot write report {}: {source}", .path.display())]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = CampaignError> = std::result::Result<T, E>;
