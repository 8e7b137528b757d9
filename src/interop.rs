//! Native callback table handed to managed code once per live runtime.
//!
//! The table and the state its context pointer refers to are heap allocations owned through
//! raw pointers, so their addresses stay fixed while managed code holds on to them.

use crate::scene::Scene;
use glam::Vec3;
use std::cell::RefCell;
use std::ffi::{c_char, c_void, CStr};
use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;
use std::rc::{Rc, Weak};
use tracing::{debug, error, info, trace, warn};

pub const INTEROP_TABLE_VERSION: u32 = 1;

/// Opaque stand-in for the host state behind a table's `context` pointer.
#[repr(C)]
pub struct HostContext {
    _data: [u8; 0],
    _marker: std::marker::PhantomData<(*mut u8, std::marker::PhantomPinned)>,
}

pub type LogCallback = unsafe extern "system" fn(context: *mut HostContext, level: i32, message: *const c_char);
pub type EntityExistsCallback = unsafe extern "system" fn(context: *mut HostContext, entity_id: u64) -> u8;
pub type GetTranslationCallback =
    unsafe extern "system" fn(context: *mut HostContext, entity_id: u64, out: *mut [f32; 3]) -> u8;
pub type SetTranslationCallback =
    unsafe extern "system" fn(context: *mut HostContext, entity_id: u64, value: *const [f32; 3]) -> u8;

#[repr(C)]
pub struct NativeInteropTable {
    pub version: u32,
    pub size: u32,
    pub context: *mut HostContext,
    pub log: LogCallback,
    pub entity_exists: EntityExistsCallback,
    pub get_translation: GetTranslationCallback,
    pub set_translation: SetTranslationCallback,
}

/// Host-side state reachable from the callbacks.
#[derive(Default)]
pub struct InteropState {
    scene: RefCell<Option<Weak<RefCell<Scene>>>>,
}

impl InteropState {
    pub fn set_scene(&self, scene: Option<Weak<RefCell<Scene>>>) {
        *self.scene.borrow_mut() = scene;
    }

    pub fn scene(&self) -> Option<Rc<RefCell<Scene>>> {
        self.scene.borrow().as_ref().and_then(Weak::upgrade)
    }

    fn with_scene<R>(&self, f: impl FnOnce(&mut Scene) -> Option<R>) -> Option<R> {
        let scene = self.scene()?;
        let mut guard = match scene.try_borrow_mut() {
            Ok(guard) => guard,
            Err(_) => {
                warn!(target: "interop", "scene is borrowed elsewhere; callback ignored");
                return None;
            }
        };
        f(&mut guard)
    }
}

/// Owns the state and the table through raw pointers so the addresses handed to managed code
/// stay valid however the bridge itself is moved.
pub struct InteropBridge {
    state: NonNull<InteropState>,
    table: NonNull<NativeInteropTable>,
    published: bool,
}

impl Default for InteropBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl InteropBridge {
    pub fn new() -> Self {
        let state = NonNull::from(Box::leak(Box::<InteropState>::default()));
        let table = NonNull::from(Box::leak(Box::new(NativeInteropTable {
            version: INTEROP_TABLE_VERSION,
            size: std::mem::size_of::<NativeInteropTable>() as u32,
            context: state.as_ptr() as *mut HostContext,
            log: host_log,
            entity_exists: host_entity_exists,
            get_translation: host_get_translation,
            set_translation: host_set_translation,
        })));
        Self { state, table, published: false }
    }

    pub fn state(&self) -> &InteropState {
        // SAFETY: allocated in `new`, freed only in `Drop`; callbacks only take shared references.
        unsafe { self.state.as_ref() }
    }

    pub fn table_ptr(&mut self) -> *mut NativeInteropTable {
        self.table.as_ptr()
    }

    pub fn is_published(&self) -> bool {
        self.published
    }

    /// Hands the table to `initializer` unless it was already published.
    ///
    /// # Safety
    /// `initializer` must accept a pointer to [`NativeInteropTable`] and must not retain it
    /// beyond the lifetime of this bridge.
    pub unsafe fn publish(&mut self, initializer: unsafe extern "system" fn(*mut c_void)) -> bool {
        if self.published {
            debug!("interop table already published");
            return false;
        }
        initializer(self.table_ptr() as *mut c_void);
        self.published = true;
        info!(version = INTEROP_TABLE_VERSION, "interop table published");
        true
    }

    /// Forgets the scene and the publication; the next runtime gets the table again.
    pub fn reset(&mut self) {
        self.state().set_scene(None);
        self.published = false;
    }
}

impl Drop for InteropBridge {
    fn drop(&mut self) {
        // SAFETY: both pointers came from `Box::leak` in `new` and are released exactly once.
        unsafe {
            drop(Box::from_raw(self.table.as_ptr()));
            drop(Box::from_raw(self.state.as_ptr()));
        }
    }
}

fn guarded<R>(fallback: R, f: impl FnOnce() -> R) -> R {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(_) => {
            error!(target: "interop", "panic inside native callback");
            fallback
        }
    }
}

unsafe fn state_from<'a>(context: *mut HostContext) -> Option<&'a InteropState> {
    (context as *const InteropState).as_ref()
}

unsafe extern "system" fn host_log(context: *mut HostContext, level: i32, message: *const c_char) {
    guarded((), || {
        if context.is_null() || message.is_null() {
            return;
        }
        let text = CStr::from_ptr(message).to_string_lossy();
        match level {
            i32::MIN..=0 => trace!(target: "managed", "{text}"),
            1 => debug!(target: "managed", "{text}"),
            2 => info!(target: "managed", "{text}"),
            3 => warn!(target: "managed", "{text}"),
            _ => error!(target: "managed", "{text}"),
        }
    })
}

unsafe extern "system" fn host_entity_exists(context: *mut HostContext, entity_id: u64) -> u8 {
    guarded(0, || {
        let Some(state) = state_from(context) else {
            return 0;
        };
        state.with_scene(|scene| scene.find_entity_by_uuid(entity_id)).is_some() as u8
    })
}

unsafe extern "system" fn host_get_translation(context: *mut HostContext, entity_id: u64, out: *mut [f32; 3]) -> u8 {
    guarded(0, || {
        let Some(state) = state_from(context) else {
            return 0;
        };
        if out.is_null() {
            return 0;
        }
        let translation = state.with_scene(|scene| {
            let entity = scene.find_entity_by_uuid(entity_id)?;
            scene.translation(entity)
        });
        match translation {
            Some(value) => {
                *out = value.to_array();
                1
            }
            None => 0,
        }
    })
}

unsafe extern "system" fn host_set_translation(
    context: *mut HostContext,
    entity_id: u64,
    value: *const [f32; 3],
) -> u8 {
    guarded(0, || {
        let Some(state) = state_from(context) else {
            return 0;
        };
        if value.is_null() {
            return 0;
        }
        let translation = Vec3::from_array(*value);
        let updated = state.with_scene(|scene| {
            let entity = scene.find_entity_by_uuid(entity_id)?;
            scene.set_translation(entity, translation).then_some(())
        });
        updated.is_some() as u8
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::ffi::CString;

    thread_local! {
        static RECEIVED: Cell<*mut c_void> = const { Cell::new(std::ptr::null_mut()) };
        static CALLS: Cell<u32> = const { Cell::new(0) };
    }

    unsafe extern "system" fn record_table(table: *mut c_void) {
        RECEIVED.with(|cell| cell.set(table));
        CALLS.with(|cell| cell.set(cell.get() + 1));
    }

    fn scene_with_player() -> (Rc<RefCell<Scene>>, u64) {
        let scene = Rc::new(RefCell::new(Scene::new("Interop")));
        scene.borrow_mut().create_entity_with_uuid(7, "Player");
        (scene, 7)
    }

    #[test]
    fn table_header_describes_layout() {
        let mut bridge = InteropBridge::new();
        let table = unsafe { &*bridge.table_ptr() };
        assert_eq!(table.version, INTEROP_TABLE_VERSION);
        assert_eq!(table.size as usize, std::mem::size_of::<NativeInteropTable>());
        assert!(!table.context.is_null());
    }

    #[test]
    fn publishes_exactly_once_until_reset() {
        CALLS.with(|cell| cell.set(0));
        let mut bridge = InteropBridge::new();
        assert!(unsafe { bridge.publish(record_table) });
        assert!(!unsafe { bridge.publish(record_table) });
        assert_eq!(CALLS.with(Cell::get), 1);
        assert_eq!(RECEIVED.with(Cell::get), bridge.table_ptr() as *mut c_void);

        bridge.reset();
        assert!(!bridge.is_published());
        assert!(unsafe { bridge.publish(record_table) });
        assert_eq!(CALLS.with(Cell::get), 2);
    }

    #[test]
    fn callbacks_reach_the_active_scene() {
        let mut bridge = InteropBridge::new();
        let (scene, id) = scene_with_player();
        bridge.state().set_scene(Some(Rc::downgrade(&scene)));
        let table = unsafe { &*bridge.table_ptr() };

        unsafe {
            assert_eq!((table.entity_exists)(table.context, id), 1);
            assert_eq!((table.entity_exists)(table.context, id + 1), 0);
            assert_eq!((table.set_translation)(table.context, id, &[4.0, 5.0, 6.0]), 1);
            let mut out = [0.0; 3];
            assert_eq!((table.get_translation)(table.context, id, &mut out), 1);
            assert_eq!(out, [4.0, 5.0, 6.0]);
            let message = CString::new("hello from managed").expect("no interior nul");
            (table.log)(table.context, 2, message.as_ptr());
        }
    }

    #[test]
    fn published_table_survives_moving_the_bridge() {
        let mut bridge = InteropBridge::new();
        let (scene, id) = scene_with_player();
        let table = bridge.table_ptr();
        let mut moved = vec![bridge];
        let bridge = moved.pop().expect("bridge");
        bridge.state().set_scene(Some(Rc::downgrade(&scene)));

        unsafe {
            let table = &*table;
            assert_eq!(table.context as *const InteropState, bridge.state() as *const InteropState);
            assert_eq!((table.set_translation)(table.context, id, &[1.0, 2.0, 3.0]), 1);
        }
        let scene = scene.borrow();
        let player = scene.find_entity_by_uuid(id).expect("player");
        assert_eq!(scene.translation(player), Some(Vec3::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn callbacks_fail_softly_without_a_scene() {
        let mut bridge = InteropBridge::new();
        let (scene, id) = scene_with_player();
        bridge.state().set_scene(Some(Rc::downgrade(&scene)));
        let table = unsafe { &*bridge.table_ptr() };

        let held = scene.borrow_mut();
        assert_eq!(unsafe { (table.entity_exists)(table.context, id) }, 0);
        drop(held);

        drop(scene);
        let mut out = [9.0; 3];
        unsafe {
            assert_eq!((table.get_translation)(table.context, id, &mut out), 0);
            assert_eq!((table.get_translation)(table.context, id, std::ptr::null_mut()), 0);
            assert_eq!((table.entity_exists)(std::ptr::null_mut(), id), 0);
            (table.log)(table.context, 3, std::ptr::null());
        }
        assert_eq!(out, [9.0; 3]);
    }
}
