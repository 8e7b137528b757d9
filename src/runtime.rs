//! Runtime context ownership and the seam every managed call goes through.
//!
//! [`ManagedRuntime`] is the only place that knows how function pointers are obtained from
//! the managed side. [`HostFxrRuntime`] implements it on top of `hostfxr`; tests plug in
//! their own implementation backed by plain Rust functions.

use crate::error::{ScriptError, ScriptResult};
use crate::hostfxr::{
    unmanaged_callers_only_method, CloseFn, HostFxr, HostFxrHandle, HostFxrLocator, HostString,
    InitializeForRuntimeConfigFn, LoadAssemblyAndGetFunctionPointerFn, HDT_LOAD_ASSEMBLY_AND_GET_FUNCTION_POINTER,
};
use std::ffi::c_void;
use std::path::Path;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

pub trait ManagedRuntime {
    /// Locates and loads whatever native library bootstraps the runtime.
    fn load_host(&mut self) -> ScriptResult<()>;

    /// Creates the runtime context from `runtime_config` and obtains the load delegate.
    fn start(&mut self, runtime_config: &Path) -> ScriptResult<()>;

    fn is_running(&self) -> bool;

    /// Loads `assembly` (if needed) and returns an `[UnmanagedCallersOnly]` method pointer.
    fn load_function(&mut self, assembly: &Path, type_name: &str, method: &str) -> ScriptResult<NonNull<c_void>>;

    /// Closes the live context. Returns `false` when nothing was running.
    fn shutdown(&mut self) -> bool;
}

static CONTEXT_LIVE: AtomicBool = AtomicBool::new(false);

/// hostfxr status codes below zero are failures; 0, 1 and 2 are flavours of success.
fn status_ok(status: i32) -> bool {
    status >= 0
}

pub struct RuntimeContext {
    handle: Option<NonNull<c_void>>,
    close: CloseFn,
}

impl RuntimeContext {
    pub fn initialize(fxr: &HostFxr, runtime_config: &Path) -> ScriptResult<Self> {
        Self::open(fxr.initialize_for_runtime_config_fn(), fxr.close_fn(), runtime_config)
    }

    fn open(initialize: InitializeForRuntimeConfigFn, close: CloseFn, runtime_config: &Path) -> ScriptResult<Self> {
        let config = HostString::from_path(runtime_config)?;
        if CONTEXT_LIVE.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return Err(ScriptError::RuntimeAlreadyActive);
        }

        let mut raw: HostFxrHandle = ptr::null_mut();
        let status = unsafe { initialize(config.as_ptr(), ptr::null(), &mut raw) };
        let handle = NonNull::new(raw);
        match handle {
            Some(handle) if status_ok(status) => Ok(Self { handle: Some(handle), close }),
            _ => {
                error!(status = %format!("{status:#010x}"), "runtime initialization failed");
                if let Some(handle) = handle {
                    unsafe { close(handle.as_ptr()) };
                }
                CONTEXT_LIVE.store(false, Ordering::Release);
                Err(ScriptError::RuntimeInit { status })
            }
        }
    }

    pub fn load_assembly_delegate(&self, fxr: &HostFxr) -> ScriptResult<LoadAssemblyAndGetFunctionPointerFn> {
        let Some(handle) = self.handle else {
            return Err(ScriptError::NotInitialized);
        };
        let mut delegate: *mut c_void = ptr::null_mut();
        let status = unsafe {
            (fxr.get_runtime_delegate_fn())(handle.as_ptr(), HDT_LOAD_ASSEMBLY_AND_GET_FUNCTION_POINTER, &mut delegate)
        };
        if !status_ok(status) || delegate.is_null() {
            error!(status = %format!("{status:#010x}"), "failed to obtain load-assembly delegate");
            return Err(ScriptError::DelegateUnavailable { status });
        }
        Ok(unsafe { std::mem::transmute::<*mut c_void, LoadAssemblyAndGetFunctionPointerFn>(delegate) })
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Closes the handle; returns the hostfxr status, or `None` if already closed.
    pub fn close(&mut self) -> Option<i32> {
        let handle = self.handle.take()?;
        let status = unsafe { (self.close)(handle.as_ptr()) };
        CONTEXT_LIVE.store(false, Ordering::Release);
        Some(status)
    }
}

impl Drop for RuntimeContext {
    fn drop(&mut self) {
        self.close();
    }
}

/// `hostfxr`-backed runtime. Field order matters: the context closes before the library unloads.
pub struct HostFxrRuntime {
    locator: HostFxrLocator,
    delegate: Option<LoadAssemblyAndGetFunctionPointerFn>,
    context: Option<RuntimeContext>,
    library: Option<HostFxr>,
}

impl HostFxrRuntime {
    pub fn new(locator: HostFxrLocator) -> Self {
        Self { locator, delegate: None, context: None, library: None }
    }

    pub fn library(&self) -> Option<&HostFxr> {
        self.library.as_ref()
    }
}

impl ManagedRuntime for HostFxrRuntime {
    fn load_host(&mut self) -> ScriptResult<()> {
        if self.library.is_some() {
            return Ok(());
        }
        let path = self.locator.locate()?;
        self.library = Some(HostFxr::load(path)?);
        Ok(())
    }

    fn start(&mut self, runtime_config: &Path) -> ScriptResult<()> {
        if self.context.is_some() {
            return Err(ScriptError::RuntimeAlreadyActive);
        }
        let Some(fxr) = self.library.as_ref() else {
            return Err(ScriptError::NotInitialized);
        };
        let context = RuntimeContext::initialize(fxr, runtime_config)?;
        // Dropping `context` on the error path closes it.
        let delegate = context.load_assembly_delegate(fxr)?;
        info!(config = %runtime_config.display(), "managed runtime context ready");
        self.context = Some(context);
        self.delegate = Some(delegate);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.delegate.is_some() && self.context.as_ref().is_some_and(RuntimeContext::is_open)
    }

    fn load_function(&mut self, assembly: &Path, type_name: &str, method: &str) -> ScriptResult<NonNull<c_void>> {
        let Some(delegate) = self.delegate else {
            return Err(ScriptError::NotInitialized);
        };
        let assembly_path = HostString::from_path(assembly)?;
        let type_string = HostString::new(type_name)?;
        let method_string = HostString::new(method)?;
        let mut function: *mut c_void = ptr::null_mut();
        let status = unsafe {
            delegate(
                assembly_path.as_ptr(),
                type_string.as_ptr(),
                method_string.as_ptr(),
                unmanaged_callers_only_method(),
                ptr::null_mut(),
                &mut function,
            )
        };
        match NonNull::new(function) {
            Some(function) if status == 0 => Ok(function),
            _ => Err(ScriptError::ManagedLookup {
                assembly: assembly.to_path_buf(),
                type_name: type_name.to_string(),
                method: method.to_string(),
                status,
            }),
        }
    }

    fn shutdown(&mut self) -> bool {
        self.delegate = None;
        let Some(mut context) = self.context.take() else {
            return false;
        };
        match context.close() {
            Some(status) if status_ok(status) => debug!("runtime context closed"),
            Some(status) => warn!(status = %format!("{status:#010x}"), "hostfxr_close reported an error"),
            None => {}
        }
        true
    }
}
