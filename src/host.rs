use crate::config::{ClassLookup, ScriptingConfig};
use crate::entry_points::{
    ClassExistsFn, EntryPoint, EntryPointTable, InteropInitializeFn, LoadGameAssemblyFn, ManagedSignature,
    OnCreateEntityFn, OnUpdateEntityFn,
};
use crate::error::{ScriptError, ScriptResult};
use crate::interop::{InteropBridge, NativeInteropTable};
use crate::runtime::{HostFxrRuntime, ManagedRuntime};
use crate::scene::Scene;
use crate::time::Timestep;
use bevy_ecs::prelude::Entity;
use std::cell::RefCell;
use std::ffi::CString;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, error, info, warn};

/// Outcome of loading one managed assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyLoadReport {
    pub assembly: PathBuf,
    pub interop_published: bool,
    pub resolved: Vec<EntryPoint>,
    pub missing: Vec<EntryPoint>,
}

impl AssemblyLoadReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Owns the managed runtime and everything resolved from it.
///
/// Until [`ScriptHost::init`] succeeds every operation is a no-op that reports why.
pub struct ScriptHost {
    config: ScriptingConfig,
    runtime: Box<dyn ManagedRuntime>,
    entry_points: EntryPointTable,
    interop: InteropBridge,
    error: Option<String>,
}

impl ScriptHost {
    pub fn new(config: ScriptingConfig) -> Self {
        let runtime = Box::new(HostFxrRuntime::new(config.locator()));
        Self::with_runtime(config, runtime)
    }

    pub fn with_runtime(config: ScriptingConfig, runtime: Box<dyn ManagedRuntime>) -> Self {
        Self { config, runtime, entry_points: EntryPointTable::default(), interop: InteropBridge::new(), error: None }
    }

    pub fn config(&self) -> &ScriptingConfig {
        &self.config
    }

    pub fn last_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_initialized(&self) -> bool {
        self.runtime.is_running()
    }

    pub fn entry_points(&self) -> &EntryPointTable {
        &self.entry_points
    }

    pub fn interop_table(&mut self) -> *mut NativeInteropTable {
        self.interop.table_ptr()
    }

    pub fn init(&mut self) -> ScriptResult<AssemblyLoadReport> {
        let result = self.start_runtime();
        if let Err(err) = &result {
            error!("scripting host initialization failed: {err}");
            self.error = Some(err.to_string());
        }
        result
    }

    fn start_runtime(&mut self) -> ScriptResult<AssemblyLoadReport> {
        if self.runtime.is_running() {
            return Err(ScriptError::RuntimeAlreadyActive);
        }
        self.runtime.load_host()?;

        let runtime_config = self.config.runtime_config_path();
        if !runtime_config.is_file() {
            return Err(ScriptError::RuntimeConfigMissing(runtime_config));
        }
        self.runtime.start(&runtime_config)?;

        let core = self.config.core_assembly_path();
        let report = self.load_assembly(&core)?;
        self.error = None;
        info!(
            assembly = %core.display(),
            resolved = report.resolved.len(),
            missing = report.missing.len(),
            "scripting host initialized"
        );
        Ok(report)
    }

    /// Closes the runtime and forgets everything resolved from it. Safe to call repeatedly.
    pub fn shutdown(&mut self) -> bool {
        self.interop.reset();
        self.entry_points.clear();
        let closed = self.runtime.shutdown();
        if closed {
            info!("scripting host shut down");
        }
        closed
    }

    /// Publishes the interop table (once) and resolves the lifecycle entry points from `assembly`.
    pub fn load_assembly(&mut self, assembly: &Path) -> ScriptResult<AssemblyLoadReport> {
        if !self.runtime.is_running() {
            return Err(ScriptError::NotInitialized);
        }

        let mut resolved = Vec::new();
        let mut missing = Vec::new();

        match self.resolve_entry::<InteropInitializeFn>(assembly) {
            Ok(initialize) => {
                resolved.push(EntryPoint::InteropInitialize);
                // SAFETY: the table outlives the runtime; `shutdown` resets it before the context closes.
                unsafe { self.interop.publish(initialize) };
            }
            Err(err) => {
                warn!("interop table not published: {err}");
                missing.push(EntryPoint::InteropInitialize);
            }
        }

        for entry in EntryPoint::LIFECYCLE {
            let outcome = match entry {
                EntryPoint::LoadGameAssembly => self.resolve_entry::<LoadGameAssemblyFn>(assembly).map(drop),
                EntryPoint::ClassExists => self.resolve_entry::<ClassExistsFn>(assembly).map(drop),
                EntryPoint::OnCreateEntity => self.resolve_entry::<OnCreateEntityFn>(assembly).map(drop),
                EntryPoint::OnUpdateEntity => self.resolve_entry::<OnUpdateEntityFn>(assembly).map(drop),
                EntryPoint::InteropInitialize => continue,
            };
            match outcome {
                Ok(()) => resolved.push(entry),
                Err(err) => {
                    warn!("{entry} unavailable: {err}");
                    missing.push(entry);
                }
            }
        }

        Ok(AssemblyLoadReport {
            assembly: assembly.to_path_buf(),
            interop_published: self.interop.is_published(),
            resolved,
            missing,
        })
    }

    /// Resolves one entry point into its slot. On failure the slot keeps its previous value.
    pub fn resolve_entry<F: ManagedSignature>(&mut self, assembly: &Path) -> ScriptResult<F> {
        if !self.runtime.is_running() {
            return Err(ScriptError::NotInitialized);
        }
        let type_name = self.config.assemblies.type_name(F::ENTRY.declaring_type());
        let raw = self.runtime.load_function(assembly, type_name, F::ENTRY.method_name())?;
        // SAFETY: the managed method was looked up by the name that belongs to this signature.
        let function = unsafe { F::from_raw(raw) };
        F::store(&mut self.entry_points, function);
        let entry = F::ENTRY;
        debug!(%entry, "resolved managed entry point");
        Ok(function)
    }

    /// Asks the managed script manager to load a (re)built game assembly.
    pub fn load_app_assembly(&mut self, path: &Path) -> ScriptResult<()> {
        let Some(load) = self.entry_points.get::<LoadGameAssemblyFn>() else {
            warn!(path = %path.display(), "LoadGameAssembly is not resolved; game assembly not loaded");
            return Err(ScriptError::EntryPointMissing(EntryPoint::LoadGameAssembly));
        };
        let text = path.to_str().ok_or_else(|| ScriptError::InvalidString(path.display().to_string()))?;
        let text = CString::new(text).map_err(|_| ScriptError::InvalidString(text.to_string()))?;
        unsafe { load(text.as_ptr()) };
        info!(path = %path.display(), "game assembly loaded");
        Ok(())
    }

    pub fn on_runtime_start(&mut self, scene: &Rc<RefCell<Scene>>) {
        self.interop.state().set_scene(Some(Rc::downgrade(scene)));
        if let Ok(scene) = scene.try_borrow() {
            debug!(scene = scene.name(), entities = scene.entity_count(), "runtime started");
        }
    }

    pub fn on_runtime_stop(&mut self) {
        self.interop.state().set_scene(None);
        debug!("runtime stopped");
    }

    pub fn scene_context(&self) -> Option<Rc<RefCell<Scene>>> {
        self.interop.state().scene()
    }

    /// Instantiates the managed behaviour bound to `entity`. Returns whether the managed side was called.
    pub fn on_create_entity(&mut self, entity: Entity) -> bool {
        let Some(create) = self.entry_points.get::<OnCreateEntityFn>() else {
            return false;
        };
        let Some((uuid, class_name)) = self.script_binding(entity) else {
            return false;
        };
        let Ok(class_name) = CString::new(class_name) else {
            warn!(uuid, "script class name contains a NUL byte");
            return false;
        };
        unsafe { create(uuid, class_name.as_ptr()) };
        true
    }

    /// Forwards a frame update to the managed behaviour bound to `entity`.
    pub fn on_update_script(&mut self, entity: Entity, timestep: Timestep) -> bool {
        let Some(update) = self.entry_points.get::<OnUpdateEntityFn>() else {
            return false;
        };
        // The scene borrow ends here; managed code may call back into it.
        let Some((uuid, _)) = self.script_binding(entity) else {
            return false;
        };
        unsafe { update(uuid, timestep.seconds()) };
        true
    }

    pub fn entity_class_exists(&self, class_name: &str) -> bool {
        if class_name.is_empty() {
            return false;
        }
        match self.config.class_lookup {
            ClassLookup::Permissive => true,
            ClassLookup::Managed => match self.entry_points.get::<ClassExistsFn>() {
                Some(exists) => match CString::new(class_name) {
                    Ok(name) => unsafe { exists(name.as_ptr()) != 0 },
                    Err(_) => false,
                },
                None => true,
            },
        }
    }

    fn script_binding(&self, entity: Entity) -> Option<(u64, String)> {
        let scene = self.scene_context()?;
        let scene = scene.try_borrow().ok()?;
        let class_name = scene.script_class(entity)?.to_string();
        Some((scene.entity_uuid(entity)?, class_name))
    }
}

impl Drop for ScriptHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}
