use dcc::{
    models::settings::{
        AfterEffectsSettings, BlenderSettings, Cinema4dSettings, HoudiniSettings, MayaSettings,
        NukeSettings,
    },
    models::engine::Engine,
    AppSettings, ApplicationType,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, env, path::PathBuf};
use thiserror::Error;

// path to config folder and file names.
const SETTINGS_DIR: &str = "RenderQ";
const SETTINGS_FILE_NAME: &str = "settings.json";
const QUEUE_FILE_NAME: &str = "queue.json";
/// Overrides the config directory for portable installs and tests.
pub const CONFIG_DIR_ENV: &str = "RENDERQ_CONFIG_DIR";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("No configuration directory available on this platform")]
    NoConfigDir,
    #[error("Settings file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Settings are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Default render options per application, applied under every job's own settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppDefaults {
    pub blender: BlenderSettings,
    pub cinema4d: Cinema4dSettings,
    pub houdini: HoudiniSettings,
    pub aftereffects: AfterEffectsSettings,
    pub nuke: NukeSettings,
    pub maya: MayaSettings,
}

impl Default for AppDefaults {
    fn default() -> Self {
        Self {
            blender: BlenderSettings {
                engine: Some(Engine::Cycles),
                threads: Some(0),
                ..Default::default()
            },
            cinema4d: Cinema4dSettings {
                threads: Some(0),
                no_gui: Some(true),
                ..Default::default()
            },
            houdini: HoudiniSettings {
                verbose: Some(1),
                threads: Some(0),
                ..Default::default()
            },
            aftereffects: AfterEffectsSettings {
                multi_frame_rendering: Some(true),
                max_cpu_percent: Some(100),
                ..Default::default()
            },
            nuke: NukeSettings {
                continue_on_error: Some(false),
                verbose: Some(1),
                threads: Some(0),
                ..Default::default()
            },
            maya: MayaSettings::default(),
        }
    }
}

impl AppDefaults {
    pub fn for_app(&self, application: ApplicationType) -> AppSettings {
        match application {
            ApplicationType::Blender => AppSettings::Blender(self.blender.clone()),
            ApplicationType::Cinema4d => AppSettings::Cinema4d(self.cinema4d.clone()),
            ApplicationType::Houdini => AppSettings::Houdini(self.houdini.clone()),
            ApplicationType::AfterEffects => AppSettings::AfterEffects(self.aftereffects.clone()),
            ApplicationType::Nuke => AppSettings::Nuke(self.nuke.clone()),
            ApplicationType::Maya => AppSettings::Maya(self.maya.clone()),
        }
    }
}

/// User preferences that the queue reads on every render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Executable chosen by the user, preferred over discovery.
    pub application_paths: BTreeMap<ApplicationType, PathBuf>,
    pub app_settings: AppDefaults,
    pub auto_save: bool,
    pub notifications: bool,
    /// Where the queue is auto-saved. Defaults to the config directory.
    pub queue_file: Option<PathBuf>,

    // single path setting from before multi-application support
    #[serde(skip_serializing)]
    blender_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            application_paths: BTreeMap::new(),
            app_settings: AppDefaults::default(),
            auto_save: true,
            notifications: true,
            queue_file: None,
            blender_path: None,
        }
    }
}

impl Settings {
    /// `$RENDERQ_CONFIG_DIR`, else the platform config dir joined with `RenderQ`.
    pub fn config_dir() -> Result<PathBuf, SettingsError> {
        if let Some(dir) = env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
            return Ok(PathBuf::from(dir));
        }
        dirs::config_dir()
            .map(|dir| dir.join(SETTINGS_DIR))
            .ok_or(SettingsError::NoConfigDir)
    }

    pub fn settings_path() -> Result<PathBuf, SettingsError> {
        Ok(Self::config_dir()?.join(SETTINGS_FILE_NAME))
    }

    pub fn queue_path(&self) -> Result<PathBuf, SettingsError> {
        match &self.queue_file {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join(QUEUE_FILE_NAME)),
        }
    }

    pub fn executable_for(&self, application: ApplicationType) -> Option<&PathBuf> {
        self.application_paths
            .get(&application)
            .filter(|p| !p.as_os_str().is_empty())
    }

    pub fn set_executable(&mut self, application: ApplicationType, path: impl Into<PathBuf>) {
        self.application_paths.insert(application, path.into());
    }

    /// Move fields from older settings files into their current place.
    pub(crate) fn migrate(mut self) -> Self {
        if let Some(path) = self.blender_path.take() {
            self.application_paths
                .entry(ApplicationType::Blender)
                .or_insert(path);
        }
        self
    }
}
