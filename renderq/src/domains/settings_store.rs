use crate::models::settings::{Settings, SettingsError};

#[async_trait::async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self) -> Result<Settings, SettingsError>;
    async fn set(&self, settings: &Settings) -> Result<(), SettingsError>;
}
