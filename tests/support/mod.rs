#![allow(dead_code)]

use script_host::config::{RuntimeConfig, ScriptingConfig};
use script_host::entry_points::{
    ClassExistsFn, EntryPoint, InteropInitializeFn, LoadGameAssemblyFn, OnCreateEntityFn, OnUpdateEntityFn,
};
use script_host::error::{ScriptError, ScriptResult};
use script_host::interop::NativeInteropTable;
use script_host::runtime::ManagedRuntime;
use script_host::ScriptHost;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::ffi::{c_char, c_void, CStr};
use std::fs;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::rc::Rc;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq)]
pub enum ManagedCall {
    InteropInitialize,
    LoadGameAssembly(String),
    ClassExists(String),
    OnCreateEntity(u64, String),
    OnUpdateEntity(u64, f32),
}

thread_local! {
    static CALLS: RefCell<Vec<ManagedCall>> = const { RefCell::new(Vec::new()) };
    static TABLE: Cell<*mut NativeInteropTable> = const { Cell::new(std::ptr::null_mut()) };
}

pub fn managed_calls() -> Vec<ManagedCall> {
    CALLS.with(|calls| calls.borrow().clone())
}

pub fn reset_managed() {
    CALLS.with(|calls| calls.borrow_mut().clear());
    TABLE.with(|table| table.set(std::ptr::null_mut()));
}

pub fn published_table() -> *mut NativeInteropTable {
    TABLE.with(Cell::get)
}

fn record(call: ManagedCall) {
    CALLS.with(|calls| calls.borrow_mut().push(call));
}

unsafe fn text(ptr: *const c_char) -> String {
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

unsafe extern "system" fn fake_interop_initialize(table: *mut c_void) {
    TABLE.with(|cell| cell.set(table as *mut NativeInteropTable));
    record(ManagedCall::InteropInitialize);
}

unsafe extern "system" fn fake_load_game_assembly(path: *const c_char) {
    record(ManagedCall::LoadGameAssembly(text(path)));
}

unsafe extern "system" fn fake_class_exists(name: *const c_char) -> u8 {
    let name = text(name);
    let exists = name.starts_with("Sandbox.");
    record(ManagedCall::ClassExists(name));
    exists as u8
}

unsafe extern "system" fn fake_on_create(entity_id: u64, class_name: *const c_char) {
    record(ManagedCall::OnCreateEntity(entity_id, text(class_name)));
}

/// Moves the entity along +x by `delta_seconds` through the published table, like a managed behaviour would.
unsafe extern "system" fn fake_on_update(entity_id: u64, delta_seconds: f32) {
    record(ManagedCall::OnUpdateEntity(entity_id, delta_seconds));
    let table = published_table();
    if table.is_null() {
        return;
    }
    let table = &*table;
    let mut position = [0.0f32; 3];
    if (table.get_translation)(table.context, entity_id, &mut position) == 1 {
        position[0] += delta_seconds;
        (table.set_translation)(table.context, entity_id, &position);
    }
}

pub fn managed_fn(entry: EntryPoint) -> NonNull<c_void> {
    let raw = match entry {
        EntryPoint::InteropInitialize => fake_interop_initialize as InteropInitializeFn as *mut c_void,
        EntryPoint::LoadGameAssembly => fake_load_game_assembly as LoadGameAssemblyFn as *mut c_void,
        EntryPoint::ClassExists => fake_class_exists as ClassExistsFn as *mut c_void,
        EntryPoint::OnCreateEntity => fake_on_create as OnCreateEntityFn as *mut c_void,
        EntryPoint::OnUpdateEntity => fake_on_update as OnUpdateEntityFn as *mut c_void,
    };
    NonNull::new(raw).expect("function pointers are non-null")
}

#[derive(Debug)]
pub struct FakeState {
    pub host_available: bool,
    pub start_status: i32,
    pub running: bool,
    pub available: HashSet<EntryPoint>,
    pub lookups: Vec<(PathBuf, String, String)>,
    pub started_with: Option<PathBuf>,
    pub shutdowns: usize,
    /// Entity looked up through the published table when the runtime closes.
    pub close_lookup: Option<u64>,
    /// What `entity_exists` answered for `close_lookup` at close time.
    pub visible_at_close: Option<bool>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            host_available: true,
            start_status: 0,
            running: false,
            available: EntryPoint::ALL.into_iter().collect(),
            lookups: Vec::new(),
            started_with: None,
            shutdowns: 0,
            close_lookup: None,
            visible_at_close: None,
        }
    }
}

/// In-process stand-in for the CLR. Clones share state so tests can inspect and steer it.
#[derive(Clone, Default)]
pub struct FakeRuntime {
    pub state: Rc<RefCell<FakeState>>,
}

impl FakeRuntime {
    pub fn with_entries(entries: &[EntryPoint]) -> Self {
        let runtime = Self::default();
        runtime.state.borrow_mut().available = entries.iter().copied().collect();
        runtime
    }
}

impl ManagedRuntime for FakeRuntime {
    fn load_host(&mut self) -> ScriptResult<()> {
        if self.state.borrow().host_available {
            Ok(())
        } else {
            Err(ScriptError::HostLibraryNotFound { searched: Vec::new() })
        }
    }

    fn start(&mut self, runtime_config: &Path) -> ScriptResult<()> {
        let mut state = self.state.borrow_mut();
        if state.running {
            return Err(ScriptError::RuntimeAlreadyActive);
        }
        if state.start_status < 0 {
            return Err(ScriptError::RuntimeInit { status: state.start_status });
        }
        state.running = true;
        state.started_with = Some(runtime_config.to_path_buf());
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.state.borrow().running
    }

    fn load_function(&mut self, assembly: &Path, type_name: &str, method: &str) -> ScriptResult<NonNull<c_void>> {
        let mut state = self.state.borrow_mut();
        state.lookups.push((assembly.to_path_buf(), type_name.to_string(), method.to_string()));
        let entry = EntryPoint::ALL
            .into_iter()
            .find(|entry| entry.method_name() == method && state.available.contains(entry));
        entry.map(managed_fn).ok_or_else(|| ScriptError::ManagedLookup {
            assembly: assembly.to_path_buf(),
            type_name: type_name.to_string(),
            method: method.to_string(),
            status: 0x8000_8062_u32 as i32,
        })
    }

    fn shutdown(&mut self) -> bool {
        let mut state = self.state.borrow_mut();
        state.shutdowns += 1;
        let table = published_table();
        if let (Some(entity_id), false) = (state.close_lookup, table.is_null()) {
            let table = unsafe { &*table };
            state.visible_at_close = Some(unsafe { (table.entity_exists)(table.context, entity_id) } == 1);
        }
        std::mem::replace(&mut state.running, false)
    }
}

/// A project directory with a runtime config on disk, used as the host's base directory.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("ScriptCore.runtimeconfig.json"), br#"{ "runtimeOptions": {} }"#)
            .expect("write runtime config");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config(&self) -> ScriptingConfig {
        ScriptingConfig {
            runtime: RuntimeConfig { search_default_locations: false, ..RuntimeConfig::default() },
            base_dir: Some(self.path().to_path_buf()),
            ..ScriptingConfig::default()
        }
    }

    /// Drops a fake compiled game assembly at the configured output path.
    pub fn write_game_assembly(&self, config: &ScriptingConfig) -> PathBuf {
        let path = self.path().join(&config.build.output);
        fs::create_dir_all(path.parent().expect("output has a parent")).expect("create output dir");
        fs::write(&path, b"MZ").expect("write game assembly");
        path
    }

    pub fn host(&self, runtime: &FakeRuntime) -> ScriptHost {
        ScriptHost::with_runtime(self.config(), Box::new(runtime.clone()))
    }
}
