// Applications, per-application render settings and render events
pub mod models;

// Frame range text parsing and formatting
pub mod frame_range;

// Spawn, observe and terminate child processes
pub mod process;

// Per-application command line builders and output parsers
pub mod adapters;

// Locate installed copies of each supported application
pub mod discovery;

// Scene details and frames already on disk
pub mod scene;

pub use adapters::{
    adapter_for, Adapter, AdapterError, Invocation, OutputParser, ParseContext, SupportFile,
};
pub use discovery::{Discovery, DiscoveryError, InstallationProvider, KnownInstallations};
pub use frame_range::{Frame, FrameRangeError};
pub use models::{
    application::ApplicationType,
    event::{RenderEvent, Stream, SubProgress},
    installation::Installation,
    settings::AppSettings,
    unit::{RenderUnit, Strategy},
};
pub use scene::{ExistingFrame, SceneError, SceneInfo};
pub use process::{
    ProcessError, ProcessEvent, ProcessHandle, ProcessMeta, ProcessRunner, ProcessStatus,
    SpawnOptions, TrackedProcess,
};
