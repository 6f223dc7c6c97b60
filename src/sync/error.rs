//! Error taxonomy shared by the sync jobs and their capabilities

/// Failure classes surfaced by `ChainReader`, `RecordStore` and `ProgressStore`
///
/// - `RemoteUnavailable` / `InvalidResponse`: retryable on the next cycle
/// - `StorageUnavailable`: aborts the current cycle
/// - `LockContention`: another points cycle owns the cursor (no-op signal)
#[derive(Debug, Clone, PartialEq)]
pub enum SyncError {
    RemoteUnavailable(String),
    InvalidResponse(String),
    StorageUnavailable(String),
    LockContention,
}

impl SyncError {
    pub fn remote(msg: impl Into<String>) -> Self {
        SyncError::RemoteUnavailable(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        SyncError::InvalidResponse(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        SyncError::StorageUnavailable(msg.into())
    }

    /// True for chain-side failures that the next scheduled cycle retries
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::RemoteUnavailable(_) | SyncError::InvalidResponse(_)
        )
    }

    pub fn is_contention(&self) -> bool {
        matches!(self, SyncError::LockContention)
    }
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::RemoteUnavailable(e) => write!(f, "Remote unavailable: {}", e),
            SyncError::InvalidResponse(e) => write!(f, "Invalid response: {}", e),
            SyncError::StorageUnavailable(e) => write!(f, "Storage unavailable: {}", e),
            SyncError::LockContention => write!(f, "Points lock held by another cycle"),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        SyncError::StorageUnavailable(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::InvalidResponse(err.to_string())
        } else {
            SyncError::RemoteUnavailable(err.to_string())
        }
    }
}
