/*
    Best effort search for installed applications. Nothing here launches a process: every
    candidate comes from walking a few well known install roots per platform and checking that
    the expected executable layout exists. Versions are read from folder or file names.
*/
use crate::models::{application::ApplicationType, installation::Installation};
use regex::Regex;
use std::{
    cmp::Ordering,
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("No {0} installation found. Install it or set an executable path in settings")]
    NotFound(ApplicationType),
}

/// Source of installations for the queue. Implemented by filesystem discovery and by fixed lists.
pub trait InstallationProvider: Send + Sync {
    /// Installations of `application`, newest version first.
    fn installations(&self, application: ApplicationType) -> Vec<Installation>;

    fn latest(&self, application: ApplicationType) -> Result<Installation, DiscoveryError> {
        self.installations(application)
            .into_iter()
            .next()
            .ok_or(DiscoveryError::NotFound(application))
    }
}

/// Compare version strings by their numeric components, newest first.
/// `"4.2.1"` sorts before `"4.2"`, and `"15.0v4"` before `"15.0v2"`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    fn parts(version: &str) -> Vec<u64> {
        version
            .split(['.', '-', 'v'])
            .filter_map(|p| p.parse().ok())
            .collect()
    }
    let (a, b) = (parts(a), parts(b));
    for i in 0..a.len().max(b.len()) {
        let left = a.get(i).copied().unwrap_or(0);
        let right = b.get(i).copied().unwrap_or(0);
        if left != right {
            return right.cmp(&left);
        }
    }
    Ordering::Equal
}

static BLENDER_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)blender[\-_ ]?([\d.]+\d)").unwrap());
#[cfg(any(target_os = "windows", target_os = "macos"))]
static CINEMA4D_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Cinema\s*4D\s*(?:R|S)?(\d+(?:\.\d+)?)").unwrap());
static HOUDINI_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:houdini|hfs)[\-_ ]?([\d.]+\d)").unwrap());
#[cfg(any(target_os = "windows", target_os = "macos"))]
static AFTER_EFFECTS_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)After\s*Effects\s*(?:CC\s*)?(\d{4}|\d+(?:\.\d+)?)").unwrap()
});
static NUKE_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Nuke([\d.]+\d(?:v\d+)?)").unwrap());
static MAYA_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Maya\s*(\d{4}(?:\.\d+)?)").unwrap());

#[cfg(windows)]
static NUKE_BINARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^Nuke\d+(?:\.\d+)*(?:v\d+)?\.exe$").unwrap());
#[cfg(not(windows))]
static NUKE_BINARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Nuke\d+(?:\.\d+)*(?:v\d+)?$").unwrap());

enum Probe {
    /// Executables at fixed paths relative to the install folder.
    Fixed {
        primary: &'static [&'static str],
        batch: &'static [&'static str],
    },
    /// Executable named by a pattern inside `subdir`, e.g. `Nuke15.0`.
    Named {
        subdir: &'static str,
        pattern: &'static LazyLock<Regex>,
    },
}

struct Layout {
    /// An install folder's name contains one of these, lowercase.
    keywords: &'static [&'static str],
    probe: Probe,
    version: &'static LazyLock<Regex>,
}

#[cfg(target_os = "windows")]
fn layout(application: ApplicationType) -> Option<Layout> {
    let layout = match application {
        ApplicationType::Blender => Layout {
            keywords: &["blender"],
            probe: Probe::Fixed {
                primary: &["blender.exe"],
                batch: &[],
            },
            version: &BLENDER_VERSION,
        },
        ApplicationType::Cinema4d => Layout {
            keywords: &["cinema", "maxon"],
            probe: Probe::Fixed {
                primary: &["Cinema 4D.exe"],
                batch: &["Commandline.exe"],
            },
            version: &CINEMA4D_VERSION,
        },
        ApplicationType::Houdini => Layout {
            keywords: &["houdini", "side effects"],
            probe: Probe::Fixed {
                primary: &["bin\\houdini.exe"],
                batch: &["bin\\hbatch.exe"],
            },
            version: &HOUDINI_VERSION,
        },
        ApplicationType::AfterEffects => Layout {
            keywords: &["after effects"],
            probe: Probe::Fixed {
                primary: &["Support Files\\AfterFX.exe"],
                batch: &["Support Files\\aerender.exe"],
            },
            version: &AFTER_EFFECTS_VERSION,
        },
        ApplicationType::Nuke => Layout {
            keywords: &["nuke"],
            probe: Probe::Named {
                subdir: "",
                pattern: &NUKE_BINARY,
            },
            version: &NUKE_VERSION,
        },
        ApplicationType::Maya => Layout {
            keywords: &["maya"],
            probe: Probe::Fixed {
                primary: &["bin\\maya.exe"],
                batch: &["bin\\Render.exe"],
            },
            version: &MAYA_VERSION,
        },
    };
    Some(layout)
}

#[cfg(target_os = "macos")]
fn layout(application: ApplicationType) -> Option<Layout> {
    let layout = match application {
        ApplicationType::Blender => Layout {
            keywords: &["blender"],
            probe: Probe::Fixed {
                primary: &["Contents/MacOS/Blender"],
                batch: &[],
            },
            version: &BLENDER_VERSION,
        },
        ApplicationType::Cinema4d => Layout {
            keywords: &["cinema", "maxon"],
            probe: Probe::Fixed {
                primary: &[
                    "Contents/MacOS/Cinema 4D",
                    "Cinema 4D.app/Contents/MacOS/Cinema 4D",
                ],
                batch: &[
                    "Contents/MacOS/Commandline",
                    "Commandline.app/Contents/MacOS/Commandline",
                ],
            },
            version: &CINEMA4D_VERSION,
        },
        ApplicationType::Houdini => Layout {
            keywords: &["houdini"],
            probe: Probe::Fixed {
                primary: &["Frameworks/Houdini.framework/Versions/Current/Resources/bin/houdini"],
                batch: &["Frameworks/Houdini.framework/Versions/Current/Resources/bin/hbatch"],
            },
            version: &HOUDINI_VERSION,
        },
        ApplicationType::AfterEffects => Layout {
            keywords: &["after effects"],
            probe: Probe::Fixed {
                primary: &["Contents/MacOS/AfterFX"],
                batch: &["aerender"],
            },
            version: &AFTER_EFFECTS_VERSION,
        },
        ApplicationType::Nuke => Layout {
            keywords: &["nuke"],
            probe: Probe::Named {
                subdir: "Contents/MacOS",
                pattern: &NUKE_BINARY,
            },
            version: &NUKE_VERSION,
        },
        ApplicationType::Maya => Layout {
            keywords: &["maya"],
            probe: Probe::Fixed {
                primary: &["Maya.app/Contents/MacOS/Maya"],
                batch: &["Maya.app/Contents/bin/Render"],
            },
            version: &MAYA_VERSION,
        },
    };
    Some(layout)
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn layout(application: ApplicationType) -> Option<Layout> {
    match application {
        ApplicationType::Blender => Some(Layout {
            keywords: &["blender"],
            probe: Probe::Fixed {
                primary: &["blender"],
                batch: &[],
            },
            version: &BLENDER_VERSION,
        }),
        ApplicationType::Houdini => Some(Layout {
            keywords: &["houdini", "hfs"],
            probe: Probe::Fixed {
                primary: &["bin/houdini"],
                batch: &["bin/hbatch"],
            },
            version: &HOUDINI_VERSION,
        }),
        ApplicationType::Nuke => Some(Layout {
            keywords: &["nuke"],
            probe: Probe::Named {
                subdir: "",
                pattern: &NUKE_BINARY,
            },
            version: &NUKE_VERSION,
        }),
        ApplicationType::Maya => Some(Layout {
            keywords: &["maya"],
            probe: Probe::Fixed {
                primary: &["bin/maya"],
                batch: &["bin/Render"],
            },
            version: &MAYA_VERSION,
        }),
        // neither ships for linux
        ApplicationType::Cinema4d | ApplicationType::AfterEffects => None,
    }
}

#[cfg(target_os = "windows")]
fn default_roots(application: ApplicationType) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = match application {
        ApplicationType::Blender => vec![
            "C:\\Program Files\\Blender Foundation".into(),
            "C:\\Program Files (x86)\\Blender Foundation".into(),
        ],
        ApplicationType::Cinema4d => vec![
            "C:\\Program Files\\Maxon Cinema 4D".into(),
            "C:\\Program Files\\Maxon".into(),
            "C:\\Program Files".into(),
        ],
        ApplicationType::Houdini => vec!["C:\\Program Files\\Side Effects Software".into()],
        ApplicationType::AfterEffects => vec![
            "C:\\Program Files\\Adobe".into(),
            "C:\\Program Files (x86)\\Adobe".into(),
        ],
        ApplicationType::Nuke => vec![
            "C:\\Program Files".into(),
            "C:\\Program Files\\Nuke".into(),
        ],
        ApplicationType::Maya => vec![
            "C:\\Program Files\\Autodesk".into(),
            "C:\\Program Files (x86)\\Autodesk".into(),
        ],
    };
    if application == ApplicationType::Blender {
        if let Some(local) = dirs::data_local_dir() {
            roots.push(local.join("Blender Foundation"));
        }
    }
    roots
}

#[cfg(target_os = "macos")]
fn default_roots(application: ApplicationType) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = match application {
        ApplicationType::Cinema4d => vec!["/Applications".into(), "/Applications/Maxon".into()],
        ApplicationType::AfterEffects => vec!["/Applications".into()],
        ApplicationType::Maya => vec!["/Applications/Autodesk".into(), "/Applications".into()],
        _ => vec!["/Applications".into()],
    };
    if application == ApplicationType::Blender {
        if let Some(home) = dirs::home_dir() {
            roots.push(home.join("Applications"));
        }
    }
    roots
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn default_roots(application: ApplicationType) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = match application {
        ApplicationType::Blender => vec![
            "/usr/bin".into(),
            "/usr/local/bin".into(),
            "/opt".into(),
            "/snap/bin".into(),
        ],
        ApplicationType::Houdini | ApplicationType::Nuke => {
            vec!["/opt".into(), "/usr/local".into()]
        }
        ApplicationType::Maya => vec!["/usr/autodesk".into(), "/opt/autodesk".into()],
        ApplicationType::Cinema4d | ApplicationType::AfterEffects => Vec::new(),
    };
    if application == ApplicationType::Blender {
        if let Some(home) = dirs::home_dir() {
            roots.push(home.join("blender"));
        }
    }
    roots
}

fn first_existing(folder: &Path, candidates: &[&str]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(|relative| folder.join(relative))
        .find(|path| path.is_file())
}

fn matches_keyword(name: &str, keywords: &[&str]) -> bool {
    let name = name.to_lowercase();
    keywords.iter().any(|k| name.contains(k))
}

fn folder_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn subdirectories(path: &Path) -> Vec<PathBuf> {
    match fs::read_dir(path) {
        Ok(entries) => entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|p| p.is_dir())
            .collect(),
        Err(e) => {
            tracing::debug!("cannot read {}: {e}", path.display());
            Vec::new()
        }
    }
}

/// Filesystem backed discovery.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    roots: HashMap<ApplicationType, Vec<PathBuf>>,
}

impl Discovery {
    /// Search the usual install locations of this platform.
    pub fn for_current_platform() -> Self {
        let roots = ApplicationType::ALL
            .into_iter()
            .map(|app| (app, default_roots(app)))
            .collect();
        Self { roots }
    }

    /// Replace the search roots of one application.
    pub fn with_roots(mut self, application: ApplicationType, roots: Vec<PathBuf>) -> Self {
        self.roots.insert(application, roots);
        self
    }

    pub fn roots(&self, application: ApplicationType) -> &[PathBuf] {
        self.roots.get(&application).map(Vec::as_slice).unwrap_or(&[])
    }

    fn probe(
        &self,
        application: ApplicationType,
        layout: &Layout,
        folder: &Path,
        version_hint: Option<&str>,
    ) -> Vec<Installation> {
        let name = folder_name(folder);
        let version = |file_name: Option<&str>| -> String {
            [Some(name.as_str()), file_name]
                .into_iter()
                .flatten()
                .find_map(|text| layout.version.captures(text).map(|c| c[1].to_owned()))
                .or_else(|| version_hint.map(str::to_owned))
                .unwrap_or_else(|| name.clone())
        };

        match &layout.probe {
            Probe::Fixed { primary, batch } => {
                let primary_path = first_existing(folder, primary);
                let batch_path = first_existing(folder, batch);
                let Some(path) = primary_path.clone().or_else(|| batch_path.clone()) else {
                    return Vec::new();
                };
                let mut installation = Installation::new(application, version(None), &path, folder);
                if let Some(batch) = batch_path.filter(|b| *b != path) {
                    installation = installation.with_command_line(batch);
                }
                vec![installation]
            }
            Probe::Named { subdir, pattern } => {
                let dir = folder.join(subdir);
                let Ok(entries) = fs::read_dir(&dir) else {
                    return Vec::new();
                };
                entries
                    .flatten()
                    .filter(|entry| entry.path().is_file())
                    .filter_map(|entry| {
                        let file_name = entry.file_name().to_string_lossy().into_owned();
                        pattern.is_match(&file_name).then(|| {
                            Installation::new(
                                application,
                                version(Some(&file_name)),
                                entry.path(),
                                folder,
                            )
                        })
                    })
                    .collect()
            }
        }
    }

    fn search(&self, application: ApplicationType, layout: &Layout) -> Vec<Installation> {
        let mut found = Vec::new();
        for root in self.roots(application) {
            if !root.is_dir() {
                tracing::debug!("{application} search root missing: {}", root.display());
                continue;
            }

            // flat layouts such as /usr/bin/blender
            if let Probe::Fixed { .. } = layout.probe {
                found.extend(self.probe(application, layout, root, Some("Unknown")));
            }

            for dir in subdirectories(root) {
                if !matches_keyword(&folder_name(&dir), layout.keywords) {
                    continue;
                }
                found.extend(self.probe(application, layout, &dir, None));
                // vendor folders nest the versioned install one level down
                for nested in subdirectories(&dir) {
                    if matches_keyword(&folder_name(&nested), layout.keywords) {
                        found.extend(self.probe(application, layout, &nested, None));
                    }
                }
            }
        }

        let mut seen = std::collections::HashSet::new();
        found.retain(|installation| seen.insert(installation.path.clone()));
        found.sort_by(|a, b| compare_versions(&a.version, &b.version));
        found
    }
}

impl InstallationProvider for Discovery {
    fn installations(&self, application: ApplicationType) -> Vec<Installation> {
        let Some(layout) = layout(application) else {
            tracing::debug!("{application} is not available on this platform");
            return Vec::new();
        };
        let found = self.search(application, &layout);
        tracing::debug!("found {} {application} installation(s)", found.len());
        found
    }
}

/// A fixed set of installations, e.g. ones the user registered by hand.
#[derive(Debug, Clone, Default)]
pub struct KnownInstallations(pub Vec<Installation>);

impl InstallationProvider for KnownInstallations {
    fn installations(&self, application: ApplicationType) -> Vec<Installation> {
        let mut list: Vec<Installation> = self
            .0
            .iter()
            .filter(|i| i.application == application)
            .cloned()
            .collect();
        list.sort_by(|a, b| compare_versions(&a.version, &b.version));
        list
    }
}
