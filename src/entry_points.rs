//! Typed registry of the managed entry points the host calls into.
//!
//! Every entry point is an `[UnmanagedCallersOnly]` static method resolved by
//! (assembly, type, method). Each signature type knows which entry it is and which
//! slot of [`EntryPointTable`] it lives in, so one generic routine resolves them all.

use std::ffi::{c_char, c_void};
use std::fmt;
use std::ptr::NonNull;

pub type InteropInitializeFn = unsafe extern "system" fn(function_table: *mut c_void);
pub type LoadGameAssemblyFn = unsafe extern "system" fn(assembly_path: *const c_char);
pub type ClassExistsFn = unsafe extern "system" fn(class_name: *const c_char) -> u8;
pub type OnCreateEntityFn = unsafe extern "system" fn(entity_id: u64, class_name: *const c_char);
pub type OnUpdateEntityFn = unsafe extern "system" fn(entity_id: u64, delta_seconds: f32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    InteropInitialize,
    LoadGameAssembly,
    ClassExists,
    OnCreateEntity,
    OnUpdateEntity,
}

/// The managed type an entry point is declared on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagedType {
    Interop,
    ScriptManager,
}

impl EntryPoint {
    pub const ALL: [EntryPoint; 5] = [
        EntryPoint::InteropInitialize,
        EntryPoint::LoadGameAssembly,
        EntryPoint::ClassExists,
        EntryPoint::OnCreateEntity,
        EntryPoint::OnUpdateEntity,
    ];

    pub const LIFECYCLE: [EntryPoint; 4] = [
        EntryPoint::LoadGameAssembly,
        EntryPoint::ClassExists,
        EntryPoint::OnCreateEntity,
        EntryPoint::OnUpdateEntity,
    ];

    pub fn method_name(self) -> &'static str {
        match self {
            EntryPoint::InteropInitialize => "Initialize",
            EntryPoint::LoadGameAssembly => "LoadGameAssembly",
            EntryPoint::ClassExists => "EntityClassExists",
            EntryPoint::OnCreateEntity => "OnCreateEntity",
            EntryPoint::OnUpdateEntity => "OnUpdateEntity",
        }
    }

    pub fn declaring_type(self) -> ManagedType {
        match self {
            EntryPoint::InteropInitialize => ManagedType::Interop,
            _ => ManagedType::ScriptManager,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EntryPoint::InteropInitialize => "interop-initialize",
            EntryPoint::LoadGameAssembly => "load-game-assembly",
            EntryPoint::ClassExists => "class-exists",
            EntryPoint::OnCreateEntity => "on-create-entity",
            EntryPoint::OnUpdateEntity => "on-update-entity",
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A function-pointer type that can be stored in the [`EntryPointTable`].
pub trait ManagedSignature: Copy {
    const ENTRY: EntryPoint;

    /// # Safety
    /// `raw` must point to a function with exactly this signature and calling convention,
    /// and must stay callable for as long as the returned value is used.
    unsafe fn from_raw(raw: NonNull<c_void>) -> Self;

    fn slot(table: &EntryPointTable) -> Option<Self>;

    fn store(table: &mut EntryPointTable, value: Self);
}

impl ManagedSignature for InteropInitializeFn {
    const ENTRY: EntryPoint = EntryPoint::InteropInitialize;

    unsafe fn from_raw(raw: NonNull<c_void>) -> Self {
        std::mem::transmute::<*mut c_void, Self>(raw.as_ptr())
    }

    fn slot(table: &EntryPointTable) -> Option<Self> {
        table.interop_initialize
    }

    fn store(table: &mut EntryPointTable, value: Self) {
        table.interop_initialize = Some(value);
    }
}

impl ManagedSignature for LoadGameAssemblyFn {
    const ENTRY: EntryPoint = EntryPoint::LoadGameAssembly;

    unsafe fn from_raw(raw: NonNull<c_void>) -> Self {
        std::mem::transmute::<*mut c_void, Self>(raw.as_ptr())
    }

    fn slot(table: &EntryPointTable) -> Option<Self> {
        table.load_game_assembly
    }

    fn store(table: &mut EntryPointTable, value: Self) {
        table.load_game_assembly = Some(value);
    }
}

impl ManagedSignature for ClassExistsFn {
    const ENTRY: EntryPoint = EntryPoint::ClassExists;

    unsafe fn from_raw(raw: NonNull<c_void>) -> Self {
        std::mem::transmute::<*mut c_void, Self>(raw.as_ptr())
    }

    fn slot(table: &EntryPointTable) -> Option<Self> {
        table.class_exists
    }

    fn store(table: &mut EntryPointTable, value: Self) {
        table.class_exists = Some(value);
    }
}

impl ManagedSignature for OnCreateEntityFn {
    const ENTRY: EntryPoint = EntryPoint::OnCreateEntity;

    unsafe fn from_raw(raw: NonNull<c_void>) -> Self {
        std::mem::transmute::<*mut c_void, Self>(raw.as_ptr())
    }

    fn slot(table: &EntryPointTable) -> Option<Self> {
        table.on_create_entity
    }

    fn store(table: &mut EntryPointTable, value: Self) {
        table.on_create_entity = Some(value);
    }
}

impl ManagedSignature for OnUpdateEntityFn {
    const ENTRY: EntryPoint = EntryPoint::OnUpdateEntity;

    unsafe fn from_raw(raw: NonNull<c_void>) -> Self {
        std::mem::transmute::<*mut c_void, Self>(raw.as_ptr())
    }

    fn slot(table: &EntryPointTable) -> Option<Self> {
        table.on_update_entity
    }

    fn store(table: &mut EntryPointTable, value: Self) {
        table.on_update_entity = Some(value);
    }
}

#[derive(Clone, Copy, Default)]
pub struct EntryPointTable {
    interop_initialize: Option<InteropInitializeFn>,
    load_game_assembly: Option<LoadGameAssemblyFn>,
    class_exists: Option<ClassExistsFn>,
    on_create_entity: Option<OnCreateEntityFn>,
    on_update_entity: Option<OnUpdateEntityFn>,
}

impl EntryPointTable {
    pub fn get<F: ManagedSignature>(&self) -> Option<F> {
        F::slot(self)
    }

    pub fn is_resolved(&self, entry: EntryPoint) -> bool {
        match entry {
            EntryPoint::InteropInitialize => self.interop_initialize.is_some(),
            EntryPoint::LoadGameAssembly => self.load_game_assembly.is_some(),
            EntryPoint::ClassExists => self.class_exists.is_some(),
            EntryPoint::OnCreateEntity => self.on_create_entity.is_some(),
            EntryPoint::OnUpdateEntity => self.on_update_entity.is_some(),
        }
    }

    pub fn resolved(&self) -> Vec<EntryPoint> {
        EntryPoint::ALL.into_iter().filter(|entry| self.is_resolved(*entry)).collect()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Debug for EntryPointTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.resolved()).finish()
    }
}
