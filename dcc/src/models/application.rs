use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, str::FromStr};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Unknown application type: {0}")]
pub struct UnknownApplication(pub String);

/// Every digital content creation tool the queue knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationType {
    Blender,
    Cinema4d,
    Houdini,
    AfterEffects,
    Nuke,
    Maya,
}

impl ApplicationType {
    pub const ALL: [ApplicationType; 6] = [
        ApplicationType::Blender,
        ApplicationType::Cinema4d,
        ApplicationType::Houdini,
        ApplicationType::AfterEffects,
        ApplicationType::Nuke,
        ApplicationType::Maya,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ApplicationType::Blender => "Blender",
            ApplicationType::Cinema4d => "Cinema 4D",
            ApplicationType::Houdini => "Houdini",
            ApplicationType::AfterEffects => "After Effects",
            ApplicationType::Nuke => "Nuke",
            ApplicationType::Maya => "Maya",
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            ApplicationType::Cinema4d => "C4D",
            ApplicationType::AfterEffects => "AE",
            other => other.name(),
        }
    }

    /// Identifier used in persisted files and on the command line.
    pub fn id(&self) -> &'static str {
        match self {
            ApplicationType::Blender => "blender",
            ApplicationType::Cinema4d => "cinema4d",
            ApplicationType::Houdini => "houdini",
            ApplicationType::AfterEffects => "aftereffects",
            ApplicationType::Nuke => "nuke",
            ApplicationType::Maya => "maya",
        }
    }

    /// Scene file extensions, lowercase and without the leading dot.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            ApplicationType::Blender => &["blend"],
            ApplicationType::Cinema4d => &["c4d"],
            ApplicationType::Houdini => &["hip", "hiplc", "hipnc"],
            ApplicationType::AfterEffects => &["aep", "aepx"],
            ApplicationType::Nuke => &["nk", "nknc"],
            ApplicationType::Maya => &["ma", "mb"],
        }
    }

    /// Infer the application from a scene file's extension.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|app| app.extensions().contains(&ext.as_str()))
    }
}

impl fmt::Display for ApplicationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ApplicationType {
    type Err = UnknownApplication;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match key.as_str() {
            "blender" => Ok(ApplicationType::Blender),
            "cinema4d" | "c4d" => Ok(ApplicationType::Cinema4d),
            "houdini" => Ok(ApplicationType::Houdini),
            "aftereffects" | "ae" => Ok(ApplicationType::AfterEffects),
            "nuke" => Ok(ApplicationType::Nuke),
            "maya" => Ok(ApplicationType::Maya),
            _ => Err(UnknownApplication(s.to_owned())),
        }
    }
}
