use super::json_job_store::write_atomic;
use crate::{
    domains::settings_store::SettingsStore,
    models::settings::{Settings, SettingsError},
};
use std::{io::ErrorKind, path::PathBuf};
use tokio::fs;

#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the user's config directory.
    pub fn at_default_location() -> Result<Self, SettingsError> {
        Ok(Self::new(Settings::settings_path()?))
    }
}

#[async_trait::async_trait]
impl SettingsStore for JsonSettingsStore {
    /// Missing or unreadable settings fall back to defaults.
    async fn get(&self) -> Result<Settings, SettingsError> {
        let data = match fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Settings::default()),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "unable to read settings, using defaults: {e}");
                return Ok(Settings::default());
            }
        };
        match serde_json::from_str::<Settings>(&data) {
            Ok(settings) => Ok(settings.migrate()),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "invalid settings file, using defaults: {e}");
                Ok(Settings::default())
            }
        }
    }

    async fn set(&self, settings: &Settings) -> Result<(), SettingsError> {
        let data = serde_json::to_vec_pretty(settings)?;
        write_atomic(&self.path, &data).await?;
        tracing::debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcc::ApplicationType;

    #[tokio::test]
    async fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        let settings = JsonSettingsStore::new(&path).get().await.unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[tokio::test]
    async fn set_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSettingsStore::new(dir.path().join("RenderQ/settings.json"));
        let mut settings = Settings::default();
        settings.auto_save = false;
        settings.set_executable(ApplicationType::Houdini, "/opt/hfs20.5/bin/hython");
        store.set(&settings).await.unwrap();
        assert_eq!(store.get().await.unwrap(), settings);
    }
}
