use crate::entry_points::ManagedType;
use crate::hostfxr::HostFxrLocator;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "RuntimeConfig::default_runtime_config")]
    pub runtime_config: PathBuf,
    #[serde(default)]
    pub hostfxr_path: Option<PathBuf>,
    #[serde(default)]
    pub dotnet_root: Option<PathBuf>,
    #[serde(default = "RuntimeConfig::default_search_default_locations")]
    pub search_default_locations: bool,
}

impl RuntimeConfig {
    fn default_runtime_config() -> PathBuf {
        PathBuf::from("ScriptCore.runtimeconfig.json")
    }

    const fn default_search_default_locations() -> bool {
        true
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            runtime_config: Self::default_runtime_config(),
            hostfxr_path: None,
            dotnet_root: None,
            search_default_locations: Self::default_search_default_locations(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssemblyConfig {
    #[serde(default = "AssemblyConfig::default_core_assembly")]
    pub core_assembly: PathBuf,
    #[serde(default = "AssemblyConfig::default_interop_type")]
    pub interop_type: String,
    #[serde(default = "AssemblyConfig::default_script_manager_type")]
    pub script_manager_type: String,
}

impl AssemblyConfig {
    fn default_core_assembly() -> PathBuf {
        PathBuf::from("ScriptCore.dll")
    }

    fn default_interop_type() -> String {
        "Himii.Interop, ScriptCore".to_string()
    }

    fn default_script_manager_type() -> String {
        "Himii.ScriptManager, ScriptCore".to_string()
    }

    /// Assembly-qualified name of the managed type declaring an entry point.
    pub fn type_name(&self, declaring: ManagedType) -> &str {
        match declaring {
            ManagedType::Interop => &self.interop_type,
            ManagedType::ScriptManager => &self.script_manager_type,
        }
    }
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            core_assembly: Self::default_core_assembly(),
            interop_type: Self::default_interop_type(),
            script_manager_type: Self::default_script_manager_type(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BuildProfile {
    #[default]
    Debug,
    Release,
}

impl BuildProfile {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildProfile::Debug => "Debug",
            BuildProfile::Release => "Release",
        }
    }
}

impl FromStr for BuildProfile {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "debug" => Ok(BuildProfile::Debug),
            "release" => Ok(BuildProfile::Release),
            other => bail!("Unknown build configuration '{other}'. Use Debug or Release."),
        }
    }
}

impl fmt::Display for BuildProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    #[serde(default = "BuildConfig::default_program")]
    pub program: String,
    #[serde(default = "BuildConfig::default_project")]
    pub project: PathBuf,
    #[serde(default)]
    pub configuration: BuildProfile,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default = "BuildConfig::default_output")]
    pub output: PathBuf,
}

impl BuildConfig {
    fn default_program() -> String {
        "dotnet".to_string()
    }

    fn default_project() -> PathBuf {
        PathBuf::from("HimiiEditor/GameAssembly.csproj")
    }

    fn default_output() -> PathBuf {
        PathBuf::from("HimiiEditor/Assets/Bin/net8.0/GameAssembly.dll")
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            program: Self::default_program(),
            project: Self::default_project(),
            configuration: BuildProfile::default(),
            extra_args: Vec::new(),
            working_dir: None,
            output: Self::default_output(),
        }
    }
}

/// How `entity_class_exists` answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClassLookup {
    /// Any non-empty class name is accepted.
    #[default]
    Permissive,
    /// Ask the managed `EntityClassExists` entry point when it is resolved.
    Managed,
}

impl FromStr for ClassLookup {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "permissive" => Ok(ClassLookup::Permissive),
            "managed" => Ok(ClassLookup::Managed),
            other => bail!("Unknown class lookup '{other}'. Use permissive or managed."),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ScriptingConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub assemblies: AssemblyConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub class_lookup: ClassLookup,
    /// Root for every relative path above; the process working directory when unset.
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptingOverrides {
    pub runtime_config: Option<PathBuf>,
    pub hostfxr_path: Option<PathBuf>,
    pub dotnet_root: Option<PathBuf>,
    pub configuration: Option<BuildProfile>,
    pub class_lookup: Option<ClassLookup>,
}

impl ScriptingConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                warn!("Config load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &ScriptingOverrides) {
        if let Some(path) = &overrides.runtime_config {
            self.runtime.runtime_config = path.clone();
        }
        if let Some(path) = &overrides.hostfxr_path {
            self.runtime.hostfxr_path = Some(path.clone());
        }
        if let Some(root) = &overrides.dotnet_root {
            self.runtime.dotnet_root = Some(root.clone());
        }
        if let Some(profile) = overrides.configuration {
            self.build.configuration = profile;
        }
        if let Some(lookup) = overrides.class_lookup {
            self.class_lookup = lookup;
        }
    }

    /// Absolute base directory; falls back to `.` if the working directory is unavailable.
    pub fn base_dir(&self) -> PathBuf {
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        match &self.base_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => cwd.join(dir),
            None => cwd,
        }
    }

    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir().join(path)
        }
    }

    pub fn runtime_config_path(&self) -> PathBuf {
        self.resolve_path(&self.runtime.runtime_config)
    }

    pub fn core_assembly_path(&self) -> PathBuf {
        self.resolve_path(&self.assemblies.core_assembly)
    }

    pub fn locator(&self) -> HostFxrLocator {
        HostFxrLocator {
            explicit_library: self.runtime.hostfxr_path.as_deref().map(|path| self.resolve_path(path)),
            dotnet_root: self.runtime.dotnet_root.as_deref().map(|path| self.resolve_path(path)),
            use_environment: true,
            use_default_locations: self.runtime.search_default_locations,
        }
    }
}

impl ScriptingOverrides {
    pub fn is_empty(&self) -> bool {
        self.applied_fields().is_empty()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.runtime_config.is_some() {
            fields.push("runtime_config");
        }
        if self.hostfxr_path.is_some() {
            fields.push("hostfxr_path");
        }
        if self.dotnet_root.is_some() {
            fields.push("dotnet_root");
        }
        if self.configuration.is_some() {
            fields.push("configuration");
        }
        if self.class_lookup.is_some() {
            fields.push("class_lookup");
        }
        fields
    }
}
