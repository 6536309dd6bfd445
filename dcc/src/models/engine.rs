use serde::{Deserialize, Serialize};
use std::fmt;

/// Blender render engine, serialized with Blender's own identifiers.
#[derive(Debug, Copy, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Engine {
    #[default]
    #[serde(rename = "CYCLES")]
    Cycles,
    #[serde(rename = "BLENDER_EEVEE")]
    Eevee,
    #[serde(rename = "BLENDER_EEVEE_NEXT")]
    EeveeNext,
    #[serde(rename = "BLENDER_WORKBENCH")]
    Workbench,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Cycles => "CYCLES",
            Engine::Eevee => "BLENDER_EEVEE",
            Engine::EeveeNext => "BLENDER_EEVEE_NEXT",
            Engine::Workbench => "BLENDER_WORKBENCH",
        }
    }

    /// Accepts Blender identifiers as well as the short names artists type.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_uppercase().as_str() {
            "CYCLES" => Some(Engine::Cycles),
            "EEVEE" | "BLENDER_EEVEE" => Some(Engine::Eevee),
            "EEVEE_NEXT" | "BLENDER_EEVEE_NEXT" => Some(Engine::EeveeNext),
            "WORKBENCH" | "BLENDER_WORKBENCH" => Some(Engine::Workbench),
            _ => None,
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
