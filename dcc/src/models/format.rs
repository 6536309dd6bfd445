use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Unknown output format: {0}")]
pub struct FormatError(String);

// More context: https://docs.blender.org/manual/en/latest/advanced/command_line/arguments.html#format-options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms)]
pub enum Format {
    TGA,
    RAWTGA,
    JPEG,
    IRIS,
    AVIRAW,
    AVIJPEG,
    #[default]
    PNG,
    BMP,
    HDR,
    TIFF,
    #[serde(rename = "OPEN_EXR")]
    OpenExr,
    #[serde(rename = "OPEN_EXR_MULTILAYER")]
    OpenExrMultilayer,
    WEBP,
    FFMPEG,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::TGA => "TGA",
            Format::RAWTGA => "RAWTGA",
            Format::JPEG => "JPEG",
            Format::IRIS => "IRIS",
            Format::AVIRAW => "AVIRAW",
            Format::AVIJPEG => "AVIJPEG",
            Format::PNG => "PNG",
            Format::BMP => "BMP",
            Format::HDR => "HDR",
            Format::TIFF => "TIFF",
            Format::OpenExr => "OPEN_EXR",
            Format::OpenExrMultilayer => "OPEN_EXR_MULTILAYER",
            Format::WEBP => "WEBP",
            Format::FFMPEG => "FFMPEG",
        }
    }

    /// Single muxed file rather than a frame sequence.
    pub fn is_video(&self) -> bool {
        matches!(self, Format::FFMPEG | Format::AVIJPEG | Format::AVIRAW)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace(['-', ' '], "_").as_str() {
            "TGA" | "TARGA" => Ok(Format::TGA),
            "RAWTGA" | "RAWTARGA" => Ok(Format::RAWTGA),
            "JPEG" | "JPG" => Ok(Format::JPEG),
            "IRIS" => Ok(Format::IRIS),
            "AVIRAW" | "AVI_RAW" => Ok(Format::AVIRAW),
            "AVIJPEG" | "AVI_JPEG" => Ok(Format::AVIJPEG),
            "PNG" => Ok(Format::PNG),
            "BMP" => Ok(Format::BMP),
            "HDR" => Ok(Format::HDR),
            "TIFF" | "TIF" => Ok(Format::TIFF),
            "OPEN_EXR" | "EXR" => Ok(Format::OpenExr),
            "OPEN_EXR_MULTILAYER" => Ok(Format::OpenExrMultilayer),
            "WEBP" => Ok(Format::WEBP),
            "FFMPEG" => Ok(Format::FFMPEG),
            _ => Err(FormatError(s.to_owned())),
        }
    }
}
