use crate::entry_points::EntryPoint;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type ScriptResult<T> = Result<T, ScriptError>;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("hostfxr not found (searched: {})", join_paths(searched))]
    HostLibraryNotFound { searched: Vec<PathBuf> },

    #[error("failed to load host library '{}'", path.display())]
    HostLibraryLoad {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("host library '{}' does not export '{symbol}'", path.display())]
    MissingHostSymbol { path: PathBuf, symbol: &'static str },

    #[error("runtime config not found at '{}'", .0.display())]
    RuntimeConfigMissing(PathBuf),

    #[error("runtime initialization failed (status {status:#010x})")]
    RuntimeInit { status: i32 },

    #[error("load-assembly delegate unavailable (status {status:#010x})")]
    DelegateUnavailable { status: i32 },

    #[error("a managed runtime context is already active")]
    RuntimeAlreadyActive,

    #[error("scripting host is not initialized")]
    NotInitialized,

    #[error("'{type_name}::{method}' not resolved from '{}' (status {status:#010x})", assembly.display())]
    ManagedLookup { assembly: PathBuf, type_name: String, method: String, status: i32 },

    #[error("managed entry point '{0}' is not resolved")]
    EntryPointMissing(EntryPoint),

    #[error("string cannot cross the managed boundary: {0:?}")]
    InvalidString(String),

    #[error("failed to launch '{command}'")]
    BuildLaunch {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("'{command}' failed ({status})")]
    BuildFailed { command: String, status: String, diagnostics: Vec<String> },

    #[error("compiled assembly not found (probed: {})", join_paths(probed))]
    AssemblyNotFound { probed: Vec<PathBuf> },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ScriptError {
    /// Whether this error leaves the host unable to run any managed code.
    pub fn is_fatal_to_init(&self) -> bool {
        matches!(
            self,
            ScriptError::HostLibraryNotFound { .. }
                | ScriptError::HostLibraryLoad { .. }
                | ScriptError::MissingHostSymbol { .. }
                | ScriptError::RuntimeConfigMissing(_)
                | ScriptError::RuntimeInit { .. }
                | ScriptError::DelegateUnavailable { .. }
                | ScriptError::RuntimeAlreadyActive
        )
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "<none>".to_string();
    }
    paths.iter().map(|path| path.display().to_string()).collect::<Vec<_>>().join(", ")
}
