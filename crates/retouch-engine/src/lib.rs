pub mod backend;
pub mod camera;
pub mod client;
pub mod config;
pub mod dryrun;
pub mod gemini;
pub mod media;
pub mod workbench;

pub use backend::{build_backend, BackendKind, GenerationBackend};
pub use client::{RestorationClient, RestorationOutput};
pub use config::RetouchConfig;
pub use workbench::{FailureKind, RunFailure, RunState, Workbench};
