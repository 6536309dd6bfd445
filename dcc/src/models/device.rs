use serde::{Deserialize, Serialize};
use std::fmt;

/// Cycles compute backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[allow(clippy::upper_case_acronyms)]
pub enum Device {
    #[default]
    CPU,
    CUDA,
    OPTIX,
    HIP,
    ONEAPI,
    METAL,
}

impl Device {
    pub fn is_gpu(&self) -> bool {
        !matches!(self, Device::CPU)
    }

    // value for `preferences.addons['cycles'].preferences.compute_device_type`
    pub(crate) fn compute_device_type(&self) -> &'static str {
        match self {
            Device::CPU => "NONE",
            other => other.as_str(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Device::CPU => "CPU",
            Device::CUDA => "CUDA",
            Device::OPTIX => "OPTIX",
            Device::HIP => "HIP",
            Device::ONEAPI => "ONEAPI",
            Device::METAL => "METAL",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
