//! Discovery and loading of the .NET host resolver library (`hostfxr`).

use crate::error::{ScriptError, ScriptResult};
use libloading::Library;
use std::cmp::Ordering;
use std::env;
use std::ffi::{c_void, OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[cfg(windows)]
pub type CharT = u16;
#[cfg(not(windows))]
pub type CharT = std::ffi::c_char;

pub type HostFxrHandle = *mut c_void;

#[repr(C)]
pub struct InitializeParameters {
    pub size: usize,
    pub host_path: *const CharT,
    pub dotnet_root: *const CharT,
}

pub type InitializeForRuntimeConfigFn = unsafe extern "C" fn(
    runtime_config_path: *const CharT,
    parameters: *const InitializeParameters,
    host_context_handle: *mut HostFxrHandle,
) -> i32;
pub type GetRuntimeDelegateFn =
    unsafe extern "C" fn(host_context_handle: HostFxrHandle, delegate_type: i32, delegate: *mut *mut c_void) -> i32;
pub type CloseFn = unsafe extern "C" fn(host_context_handle: HostFxrHandle) -> i32;
pub type ErrorWriterFn = unsafe extern "C" fn(message: *const CharT);
pub type SetErrorWriterFn = unsafe extern "C" fn(error_writer: Option<ErrorWriterFn>) -> Option<ErrorWriterFn>;

pub type LoadAssemblyAndGetFunctionPointerFn = unsafe extern "system" fn(
    assembly_path: *const CharT,
    type_name: *const CharT,
    method_name: *const CharT,
    delegate_type_name: *const CharT,
    reserved: *mut c_void,
    delegate: *mut *mut c_void,
) -> i32;

/// `hostfxr_delegate_type::hdt_load_assembly_and_get_function_pointer`
pub const HDT_LOAD_ASSEMBLY_AND_GET_FUNCTION_POINTER: i32 = 5;

/// Sentinel delegate type name telling the runtime the target is `[UnmanagedCallersOnly]`.
pub fn unmanaged_callers_only_method() -> *const CharT {
    usize::MAX as *const CharT
}

const INITIALIZE_SYMBOL: &str = "hostfxr_initialize_for_runtime_config";
const GET_DELEGATE_SYMBOL: &str = "hostfxr_get_runtime_delegate";
const CLOSE_SYMBOL: &str = "hostfxr_close";
const SET_ERROR_WRITER_SYMBOL: &str = "hostfxr_set_error_writer";

/// A NUL-terminated string in the host's native character width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostString(Vec<CharT>);

impl HostString {
    pub fn from_os_str(value: &OsStr) -> ScriptResult<Self> {
        let mut units = encode(value);
        if units.iter().any(|unit| *unit == 0) {
            return Err(ScriptError::InvalidString(value.to_string_lossy().into_owned()));
        }
        units.push(0);
        Ok(Self(units))
    }

    pub fn from_path(path: &Path) -> ScriptResult<Self> {
        Self::from_os_str(path.as_os_str())
    }

    pub fn new(value: &str) -> ScriptResult<Self> {
        Self::from_os_str(OsStr::new(value))
    }

    pub fn as_ptr(&self) -> *const CharT {
        self.0.as_ptr()
    }

    /// Length in code units, without the terminator.
    pub fn len(&self) -> usize {
        self.0.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(windows)]
fn encode(value: &OsStr) -> Vec<CharT> {
    use std::os::windows::ffi::OsStrExt;
    value.encode_wide().collect()
}

#[cfg(not(windows))]
fn encode(value: &OsStr) -> Vec<CharT> {
    use std::os::unix::ffi::OsStrExt;
    value.as_bytes().iter().map(|byte| *byte as CharT).collect()
}

/// Reads a NUL-terminated host string, replacing invalid sequences.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated `CharT` sequence.
pub unsafe fn read_host_string(ptr: *const CharT) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let mut len = 0usize;
    while *ptr.add(len) != 0 {
        len += 1;
    }
    decode(std::slice::from_raw_parts(ptr, len))
}

#[cfg(windows)]
fn decode(units: &[CharT]) -> String {
    String::from_utf16_lossy(units)
}

#[cfg(not(windows))]
fn decode(units: &[CharT]) -> String {
    let bytes: Vec<u8> = units.iter().map(|unit| *unit as u8).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

unsafe extern "C" fn forward_host_error(message: *const CharT) {
    let text = read_host_string(message);
    warn!(target: "hostfxr", "{}", text.trim_end());
}

/// Version directory name under `host/fxr`, e.g. `8.0.1` or `9.0.0-preview.7.24405.7`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FxrVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
}

impl FxrVersion {
    pub fn parse(text: &str) -> Option<Self> {
        let (core, prerelease) = match text.split_once('-') {
            Some((core, pre)) if !pre.is_empty() => (core, Some(pre.to_string())),
            Some(_) => return None,
            None => (text, None),
        };
        let mut parts = core.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self { major, minor, patch, prerelease })
    }
}

impl Ord for FxrVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for FxrVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub fn hostfxr_file_name() -> OsString {
    libloading::library_filename("hostfxr")
}

/// Picks the newest `host/fxr/<version>/` directory under `root` that holds the library.
pub fn hostfxr_in_root(root: &Path) -> Option<PathBuf> {
    let fxr_dir = root.join("host").join("fxr");
    let entries = fs::read_dir(&fxr_dir).ok()?;
    let file_name = hostfxr_file_name();
    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name();
            let version = FxrVersion::parse(name.to_str()?)?;
            let library = entry.path().join(&file_name);
            library.is_file().then_some((version, library))
        })
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, library)| library)
}

#[derive(Debug, Clone)]
pub struct HostFxrLocator {
    pub explicit_library: Option<PathBuf>,
    pub dotnet_root: Option<PathBuf>,
    pub use_environment: bool,
    pub use_default_locations: bool,
}

impl Default for HostFxrLocator {
    fn default() -> Self {
        Self { explicit_library: None, dotnet_root: None, use_environment: true, use_default_locations: true }
    }
}

impl HostFxrLocator {
    pub fn candidate_roots(&self) -> Vec<PathBuf> {
        let mut roots = Vec::new();
        if let Some(root) = &self.dotnet_root {
            roots.push(root.clone());
        }
        if self.use_environment {
            if let Some(root) = env::var_os("DOTNET_ROOT").filter(|value| !value.is_empty()) {
                roots.push(PathBuf::from(root));
            }
        }
        if self.use_default_locations {
            roots.extend(registered_install_location());
            roots.extend(default_install_locations());
        }
        let mut unique = Vec::with_capacity(roots.len());
        for root in roots {
            if !unique.contains(&root) {
                unique.push(root);
            }
        }
        unique
    }

    pub fn locate(&self) -> ScriptResult<PathBuf> {
        if let Some(path) = &self.explicit_library {
            if path.is_file() {
                return Ok(path.clone());
            }
            return Err(ScriptError::HostLibraryNotFound { searched: vec![path.clone()] });
        }
        let roots = self.candidate_roots();
        for root in &roots {
            debug!(root = %root.display(), "probing dotnet root");
            if let Some(library) = hostfxr_in_root(root) {
                return Ok(library);
            }
        }
        Err(ScriptError::HostLibraryNotFound { searched: roots })
    }
}

#[cfg(unix)]
fn registered_install_location() -> Option<PathBuf> {
    let arch_file = format!("/etc/dotnet/install_location_{}", dotnet_arch());
    [PathBuf::from(arch_file), PathBuf::from("/etc/dotnet/install_location")].into_iter().find_map(|file| {
        let contents = fs::read_to_string(file).ok()?;
        let line = contents.lines().next()?.trim();
        (!line.is_empty()).then(|| PathBuf::from(line))
    })
}

#[cfg(not(unix))]
fn registered_install_location() -> Option<PathBuf> {
    None
}

#[cfg(unix)]
fn dotnet_arch() -> &'static str {
    match env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        "x86" => "x86",
        "arm" => "arm",
        other => other,
    }
}

fn default_install_locations() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if cfg!(windows) {
        let program_files = env::var_os("ProgramFiles").map(PathBuf::from);
        roots.push(program_files.unwrap_or_else(|| PathBuf::from(r"C:\Program Files")).join("dotnet"));
    } else if cfg!(target_os = "macos") {
        roots.push(PathBuf::from("/usr/local/share/dotnet"));
    } else {
        roots.push(PathBuf::from("/usr/share/dotnet"));
        roots.push(PathBuf::from("/usr/lib/dotnet"));
        roots.push(PathBuf::from("/usr/local/share/dotnet"));
    }
    let home = env::var_os(if cfg!(windows) { "USERPROFILE" } else { "HOME" });
    if let Some(home) = home {
        roots.push(PathBuf::from(home).join(".dotnet"));
    }
    roots
}

/// The loaded host resolver with its three required exports.
pub struct HostFxr {
    path: PathBuf,
    initialize_for_runtime_config: InitializeForRuntimeConfigFn,
    get_runtime_delegate: GetRuntimeDelegateFn,
    close: CloseFn,
    _library: Library,
}

impl HostFxr {
    pub fn load(path: impl AsRef<Path>) -> ScriptResult<Self> {
        let path = path.as_ref().to_path_buf();
        let library = unsafe { Library::new(&path) }
            .map_err(|source| ScriptError::HostLibraryLoad { path: path.clone(), source })?;

        let initialize_for_runtime_config =
            unsafe { required_symbol::<InitializeForRuntimeConfigFn>(&library, &path, INITIALIZE_SYMBOL)? };
        let get_runtime_delegate =
            unsafe { required_symbol::<GetRuntimeDelegateFn>(&library, &path, GET_DELEGATE_SYMBOL)? };
        let close = unsafe { required_symbol::<CloseFn>(&library, &path, CLOSE_SYMBOL)? };

        match unsafe { optional_symbol::<SetErrorWriterFn>(&library, SET_ERROR_WRITER_SYMBOL) } {
            Some(set_error_writer) => {
                unsafe { set_error_writer(Some(forward_host_error as ErrorWriterFn)) };
            }
            None => debug!("'{SET_ERROR_WRITER_SYMBOL}' not exported; host errors go to stderr"),
        }

        info!(path = %path.display(), "loaded hostfxr");
        Ok(Self { path, initialize_for_runtime_config, get_runtime_delegate, close, _library: library })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn initialize_for_runtime_config_fn(&self) -> InitializeForRuntimeConfigFn {
        self.initialize_for_runtime_config
    }

    pub fn get_runtime_delegate_fn(&self) -> GetRuntimeDelegateFn {
        self.get_runtime_delegate
    }

    pub fn close_fn(&self) -> CloseFn {
        self.close
    }
}

unsafe fn required_symbol<T: Copy>(library: &Library, path: &Path, name: &'static str) -> ScriptResult<T> {
    optional_symbol(library, name).ok_or_else(|| ScriptError::MissingHostSymbol { path: path.to_path_buf(), symbol: name })
}

unsafe fn optional_symbol<T: Copy>(library: &Library, name: &str) -> Option<T> {
    let mut symbol = Vec::with_capacity(name.len() + 1);
    symbol.extend_from_slice(name.as_bytes());
    symbol.push(0);
    library.get::<T>(&symbol).ok().map(|symbol| *symbol)
}
