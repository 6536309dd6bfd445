use super::application::ApplicationType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// An application binary found on this machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Installation {
    #[serde(rename = "type")]
    pub application: ApplicationType,
    /// Best effort, derived from folder or file naming.
    pub version: String,
    /// Primary (interactive) executable.
    pub path: PathBuf,
    /// Separate non-interactive executable when the tool ships one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_line_path: Option<PathBuf>,
    pub folder: PathBuf,
}

impl Installation {
    pub fn new(
        application: ApplicationType,
        version: impl Into<String>,
        path: impl AsRef<Path>,
        folder: impl AsRef<Path>,
    ) -> Self {
        Self {
            application,
            version: version.into(),
            path: path.as_ref().to_path_buf(),
            command_line_path: None,
            folder: folder.as_ref().to_path_buf(),
        }
    }

    pub fn with_command_line(mut self, path: impl AsRef<Path>) -> Self {
        self.command_line_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// The binary to launch for batch rendering.
    pub fn batch_executable(&self) -> &Path {
        self.command_line_path.as_deref().unwrap_or(&self.path)
    }
}
