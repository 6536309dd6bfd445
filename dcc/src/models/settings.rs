/*
    Each application only understands its own handful of options, so settings are a tagged union
    keyed by application rather than an open bag of fields. Every option is optional: an unset
    option never produces a command line flag.
*/
use super::{application::ApplicationType, device::Device, engine::Engine, format::Format};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlenderSettings {
    pub engine: Option<Engine>,
    pub cycles_device: Option<Device>,
    pub samples: Option<u32>,
    /// 0 lets Blender pick.
    pub threads: Option<u32>,
    pub output_path: Option<PathBuf>,
    pub format: Option<Format>,
}

impl BlenderSettings {
    pub fn layered_over(&self, base: &Self) -> Self {
        Self {
            engine: self.engine.or(base.engine),
            cycles_device: self.cycles_device.or(base.cycles_device),
            samples: self.samples.or(base.samples),
            threads: self.threads.or(base.threads),
            output_path: self.output_path.clone().or_else(|| base.output_path.clone()),
            format: self.format.or(base.format),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Cinema4dSettings {
    pub take: Option<String>,
    pub threads: Option<u32>,
    /// `-nogui` is passed unless this is explicitly `false`.
    pub no_gui: Option<bool>,
}

impl Cinema4dSettings {
    pub fn layered_over(&self, base: &Self) -> Self {
        Self {
            take: self.take.clone().or_else(|| base.take.clone()),
            threads: self.threads.or(base.threads),
            no_gui: self.no_gui.or(base.no_gui),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HoudiniSettings {
    /// Output driver node path, e.g. `/out/mantra1`.
    pub render_node: Option<String>,
    pub verbose: Option<u32>,
    pub threads: Option<u32>,
}

impl HoudiniSettings {
    pub fn layered_over(&self, base: &Self) -> Self {
        Self {
            render_node: self
                .render_node
                .clone()
                .or_else(|| base.render_node.clone()),
            verbose: self.verbose.or(base.verbose),
            threads: self.threads.or(base.threads),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AfterEffectsSettings {
    pub composition: Option<String>,
    pub render_settings: Option<String>,
    pub output_module: Option<String>,
    pub multi_frame_rendering: Option<bool>,
    pub max_cpu_percent: Option<u32>,
}

impl AfterEffectsSettings {
    pub fn layered_over(&self, base: &Self) -> Self {
        Self {
            composition: self
                .composition
                .clone()
                .or_else(|| base.composition.clone()),
            render_settings: self
                .render_settings
                .clone()
                .or_else(|| base.render_settings.clone()),
            output_module: self
                .output_module
                .clone()
                .or_else(|| base.output_module.clone()),
            multi_frame_rendering: self.multi_frame_rendering.or(base.multi_frame_rendering),
            max_cpu_percent: self.max_cpu_percent.or(base.max_cpu_percent),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NukeSettings {
    pub write_node: Option<String>,
    pub continue_on_error: Option<bool>,
    pub verbose: Option<u32>,
    pub threads: Option<u32>,
    /// Passed through untouched, e.g. `4G`.
    pub cache_size: Option<String>,
}

impl NukeSettings {
    pub fn layered_over(&self, base: &Self) -> Self {
        Self {
            write_node: self.write_node.clone().or_else(|| base.write_node.clone()),
            continue_on_error: self.continue_on_error.or(base.continue_on_error),
            verbose: self.verbose.or(base.verbose),
            threads: self.threads.or(base.threads),
            cache_size: self.cache_size.clone().or_else(|| base.cache_size.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MayaSettings {
    /// Renderer name as `Render -r` expects it: arnold, vray, redshift, mayaSoftware...
    pub renderer: Option<String>,
    pub camera: Option<String>,
    pub render_layer: Option<String>,
    pub verbose: Option<u32>,
    pub threads: Option<u32>,
}

impl MayaSettings {
    pub fn layered_over(&self, base: &Self) -> Self {
        Self {
            renderer: self.renderer.clone().or_else(|| base.renderer.clone()),
            camera: self.camera.clone().or_else(|| base.camera.clone()),
            render_layer: self
                .render_layer
                .clone()
                .or_else(|| base.render_layer.clone()),
            verbose: self.verbose.or(base.verbose),
            threads: self.threads.or(base.threads),
        }
    }
}

// JSON: {"application": "nuke", "writeNode": "Write1", "threads": 8}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "application", rename_all = "lowercase")]
pub enum AppSettings {
    Blender(BlenderSettings),
    Cinema4d(Cinema4dSettings),
    Houdini(HoudiniSettings),
    AfterEffects(AfterEffectsSettings),
    Nuke(NukeSettings),
    Maya(MayaSettings),
}

impl AppSettings {
    /// Empty settings for the application: no optional flags.
    pub fn empty(application: ApplicationType) -> Self {
        match application {
            ApplicationType::Blender => AppSettings::Blender(Default::default()),
            ApplicationType::Cinema4d => AppSettings::Cinema4d(Default::default()),
            ApplicationType::Houdini => AppSettings::Houdini(Default::default()),
            ApplicationType::AfterEffects => AppSettings::AfterEffects(Default::default()),
            ApplicationType::Nuke => AppSettings::Nuke(Default::default()),
            ApplicationType::Maya => AppSettings::Maya(Default::default()),
        }
    }

    pub fn application(&self) -> ApplicationType {
        match self {
            AppSettings::Blender(_) => ApplicationType::Blender,
            AppSettings::Cinema4d(_) => ApplicationType::Cinema4d,
            AppSettings::Houdini(_) => ApplicationType::Houdini,
            AppSettings::AfterEffects(_) => ApplicationType::AfterEffects,
            AppSettings::Nuke(_) => ApplicationType::Nuke,
            AppSettings::Maya(_) => ApplicationType::Maya,
        }
    }

    /// Fill every option left unset here from `base`. Settings for a different application are
    /// returned unchanged.
    pub fn layered_over(&self, base: &AppSettings) -> AppSettings {
        match (self, base) {
            (AppSettings::Blender(s), AppSettings::Blender(b)) => {
                AppSettings::Blender(s.layered_over(b))
            }
            (AppSettings::Cinema4d(s), AppSettings::Cinema4d(b)) => {
                AppSettings::Cinema4d(s.layered_over(b))
            }
            (AppSettings::Houdini(s), AppSettings::Houdini(b)) => {
                AppSettings::Houdini(s.layered_over(b))
            }
            (AppSettings::AfterEffects(s), AppSettings::AfterEffects(b)) => {
                AppSettings::AfterEffects(s.layered_over(b))
            }
            (AppSettings::Nuke(s), AppSettings::Nuke(b)) => AppSettings::Nuke(s.layered_over(b)),
            (AppSettings::Maya(s), AppSettings::Maya(b)) => AppSettings::Maya(s.layered_over(b)),
            _ => self.clone(),
        }
    }
}
