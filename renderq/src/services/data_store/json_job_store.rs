use crate::{
    domains::job_store::{JobStore, JobStoreError},
    models::job::RenderJob,
};
use serde_json::Value;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::fs;

/// Queue kept as one JSON array on disk.
#[derive(Debug, Clone)]
pub struct JsonJobStore {
    path: PathBuf,
}

impl JsonJobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Write through a sibling temp file so a crash never leaves a half written file behind.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents).await?;
    fs::rename(&tmp, path).await
}

#[async_trait::async_trait]
impl JobStore for JsonJobStore {
    async fn save(&self, jobs: &[RenderJob]) -> Result<(), JobStoreError> {
        let data = serde_json::to_vec_pretty(jobs)?;
        write_atomic(&self.path, &data).await?;
        tracing::debug!(path = %self.path.display(), jobs = jobs.len(), "queue saved");
        Ok(())
    }

    async fn load(&self) -> Result<Vec<RenderJob>, JobStoreError> {
        let data = match fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no queue file yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        if data.trim().is_empty() {
            return Ok(Vec::new());
        }

        let entries = match serde_json::from_str::<Value>(&data)? {
            Value::Array(entries) => entries,
            // older files wrapped the list: { "jobs": [...] }
            Value::Object(mut map) => match map.remove("jobs") {
                Some(Value::Array(entries)) => entries,
                _ => return Err(JobStoreError::InvalidLayout),
            },
            _ => return Err(JobStoreError::InvalidLayout),
        };

        let mut jobs = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            match RenderJob::from_stored(entry) {
                Ok(job) => jobs.push(job),
                Err(e) => tracing::warn!(index, "skipping unreadable queue entry: {e}"),
            }
        }
        tracing::info!(path = %self.path.display(), jobs = jobs.len(), "queue loaded");
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::JobStatus;
    use dcc::ApplicationType;

    #[tokio::test]
    async fn missing_file_is_an_empty_queue() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonJobStore::new(dir.path().join("nested/queue.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonJobStore::new(dir.path().join("nested/queue.json"));
        let mut job = RenderJob::new("/work/a.nk", ApplicationType::Nuke).with_frame_ranges("1-5");
        job.status = JobStatus::Complete;
        store.save(&[job.clone()]).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, vec![job]);
        assert!(!dir.path().join("nested/queue.json.tmp").exists());
    }

    #[tokio::test]
    async fn bad_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(
            &path,
            r#"[{"id":"ok","filePath":"/a.blend"},{"id":"bad","applicationType":"word"}]"#,
        )
        .unwrap();
        let jobs = JsonJobStore::new(&path).load().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "ok");
    }

    #[tokio::test]
    async fn scalar_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(&path, "42").unwrap();
        assert!(matches!(
            JsonJobStore::new(&path).load().await,
            Err(JobStoreError::InvalidLayout)
        ));
    }
}
