use crate::models::job::RenderJob;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("Unable to access queue file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Queue file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Queue file must hold a list of jobs")]
    InvalidLayout,
}

/// Saves and restores the whole queue.
#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    /// Replace the stored queue. Jobs are written as given; callers normalise them first.
    async fn save(&self, jobs: &[RenderJob]) -> Result<(), JobStoreError>;
    /// An absent queue loads as empty.
    async fn load(&self) -> Result<Vec<RenderJob>, JobStoreError>;
}
