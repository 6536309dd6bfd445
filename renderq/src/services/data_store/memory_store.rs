use crate::{
    domains::{
        job_store::{JobStore, JobStoreError},
        settings_store::SettingsStore,
    },
    models::{
        job::RenderJob,
        settings::{Settings, SettingsError},
    },
};
use tokio::sync::RwLock;

/// Queue held in memory, for tests and sessions without a queue file.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<Vec<RenderJob>>,
}

impl MemoryJobStore {
    pub fn new(jobs: Vec<RenderJob>) -> Self {
        Self {
            jobs: RwLock::new(jobs),
        }
    }
}

#[async_trait::async_trait]
impl JobStore for MemoryJobStore {
    async fn save(&self, jobs: &[RenderJob]) -> Result<(), JobStoreError> {
        *self.jobs.write().await = jobs.to_vec();
        Ok(())
    }

    async fn load(&self) -> Result<Vec<RenderJob>, JobStoreError> {
        Ok(self.jobs.read().await.clone())
    }
}

#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    settings: RwLock<Settings>,
}

impl MemorySettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }
}

#[async_trait::async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get(&self) -> Result<Settings, SettingsError> {
        Ok(self.settings.read().await.clone())
    }

    async fn set(&self, settings: &Settings) -> Result<(), SettingsError> {
        *self.settings.write().await = settings.clone();
        Ok(())
    }
}
