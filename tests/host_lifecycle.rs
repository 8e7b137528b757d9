mod support;

use glam::Vec3;
use script_host::config::{ClassLookup, RuntimeConfig, ScriptingConfig};
use script_host::entry_points::{EntryPoint, OnUpdateEntityFn};
use script_host::error::ScriptError;
use script_host::scene::Scene;
use script_host::time::Timestep;
use script_host::ScriptHost;
use std::cell::RefCell;
use std::rc::Rc;
use support::{managed_calls, published_table, reset_managed, FakeRuntime, ManagedCall, Workspace};

fn scene_with_scripts() -> (Rc<RefCell<Scene>>, bevy_ecs::prelude::Entity, bevy_ecs::prelude::Entity) {
    let scene = Rc::new(RefCell::new(Scene::new("Sandbox")));
    let (player, prop) = {
        let mut scene = scene.borrow_mut();
        let player = scene.create_entity_with_uuid(1001, "Player");
        scene.add_script(player, "Sandbox.Player");
        let prop = scene.create_entity_with_uuid(1002, "Prop");
        (player, prop)
    };
    (scene, player, prop)
}

#[test]
fn init_publishes_the_table_and_resolves_every_entry() {
    reset_managed();
    let workspace = Workspace::new();
    let runtime = FakeRuntime::default();
    let mut host = workspace.host(&runtime);

    let report = host.init().expect("fake runtime initializes");
    assert!(report.interop_published);
    assert!(report.is_complete());
    assert_eq!(report.resolved, EntryPoint::ALL.to_vec());
    assert_eq!(report.assembly, workspace.path().join("ScriptCore.dll"));
    assert!(host.is_initialized());
    assert_eq!(host.entry_points().resolved(), EntryPoint::ALL.to_vec());

    assert_eq!(managed_calls(), vec![ManagedCall::InteropInitialize]);
    assert_eq!(published_table(), host.interop_table());
    assert_eq!(
        runtime.state.borrow().started_with.as_deref(),
        Some(workspace.path().join("ScriptCore.runtimeconfig.json").as_path())
    );

    let lookups = runtime.state.borrow().lookups.clone();
    let (_, interop_type, method) = &lookups[0];
    assert_eq!((interop_type.as_str(), method.as_str()), ("Himii.Interop, ScriptCore", "Initialize"));
    assert!(lookups[1..].iter().all(|(_, type_name, _)| type_name == "Himii.ScriptManager, ScriptCore"));
}

#[test]
fn table_is_published_once_per_live_runtime() {
    reset_managed();
    let workspace = Workspace::new();
    let runtime = FakeRuntime::default();
    let mut host = workspace.host(&runtime);
    host.init().expect("init");

    let again = host.load_assembly(&workspace.path().join("ScriptCore.dll")).expect("second load");
    assert!(again.interop_published);
    assert_eq!(managed_calls(), vec![ManagedCall::InteropInitialize]);

    assert!(host.shutdown());
    host.init().expect("re-init after shutdown");
    assert_eq!(managed_calls(), vec![ManagedCall::InteropInitialize, ManagedCall::InteropInitialize]);
}

#[test]
fn missing_runtime_config_is_fatal() {
    let workspace = Workspace::new();
    let runtime = FakeRuntime::default();
    let config = ScriptingConfig {
        runtime: RuntimeConfig { runtime_config: "Missing.runtimeconfig.json".into(), ..RuntimeConfig::default() },
        ..workspace.config()
    };
    let mut host = ScriptHost::with_runtime(config, Box::new(runtime.clone()));
    match host.init() {
        Err(ScriptError::RuntimeConfigMissing(path)) => {
            assert_eq!(path, workspace.path().join("Missing.runtimeconfig.json"))
        }
        other => panic!("expected RuntimeConfigMissing, got {other:?}"),
    }
    assert!(!host.is_initialized());
    assert!(runtime.state.borrow().started_with.is_none());
}

#[test]
fn failed_runtime_start_leaves_host_inert() {
    reset_managed();
    let workspace = Workspace::new();
    let runtime = FakeRuntime::default();
    runtime.state.borrow_mut().start_status = 0x8000_8096_u32 as i32;
    let mut host = workspace.host(&runtime);

    assert!(matches!(host.init(), Err(ScriptError::RuntimeInit { .. })));
    assert!(host.last_error().is_some_and(|err| err.contains("0x80008096")));

    let (scene, player, _) = scene_with_scripts();
    host.on_runtime_start(&scene);
    assert!(!host.on_create_entity(player));
    assert!(!host.on_update_script(player, Timestep(0.016)));
    assert!(managed_calls().is_empty());
}

#[test]
fn init_twice_is_rejected() {
    let workspace = Workspace::new();
    let runtime = FakeRuntime::default();
    let mut host = workspace.host(&runtime);
    host.init().expect("first init");
    assert!(matches!(host.init(), Err(ScriptError::RuntimeAlreadyActive)));
    assert!(host.is_initialized());
}

#[test]
fn double_shutdown_is_harmless() {
    let workspace = Workspace::new();
    let runtime = FakeRuntime::default();
    let mut host = workspace.host(&runtime);
    host.init().expect("init");

    assert!(host.shutdown());
    assert!(!host.shutdown());
    assert!(host.entry_points().resolved().is_empty());
    assert!(matches!(host.load_assembly(&workspace.path().join("ScriptCore.dll")), Err(ScriptError::NotInitialized)));
    drop(host);
    assert_eq!(runtime.state.borrow().shutdowns, 3);
}

#[test]
fn scene_is_detached_before_the_runtime_closes() {
    reset_managed();
    let workspace = Workspace::new();
    let runtime = FakeRuntime::default();
    runtime.state.borrow_mut().close_lookup = Some(1001);
    let mut host = workspace.host(&runtime);
    host.init().expect("init");
    let (scene, _, _) = scene_with_scripts();
    host.on_runtime_start(&scene);

    assert!(host.shutdown());
    assert_eq!(runtime.state.borrow().visible_at_close, Some(false));
    assert!(host.scene_context().is_none());
}

#[test]
fn create_and_update_reach_only_scripted_entities() {
    reset_managed();
    let workspace = Workspace::new();
    let runtime = FakeRuntime::default();
    let mut host = workspace.host(&runtime);
    host.init().expect("init");
    reset_managed();

    let (scene, player, prop) = scene_with_scripts();
    host.on_runtime_start(&scene);
    assert!(host.on_create_entity(player));
    assert!(!host.on_create_entity(prop));
    assert!(host.on_update_script(player, Timestep(0.5)));
    assert!(!host.on_update_script(prop, Timestep(0.5)));

    assert_eq!(
        managed_calls(),
        vec![
            ManagedCall::OnCreateEntity(1001, "Sandbox.Player".to_string()),
            ManagedCall::OnUpdateEntity(1001, 0.5),
        ]
    );
}

#[test]
fn managed_update_can_move_the_entity_through_the_table() {
    reset_managed();
    let workspace = Workspace::new();
    let runtime = FakeRuntime::default();
    let mut host = workspace.host(&runtime);
    host.init().expect("init");

    let (scene, player, _) = scene_with_scripts();
    host.on_runtime_start(&scene);
    for _ in 0..4 {
        assert!(host.on_update_script(player, Timestep(0.25)));
    }
    assert_eq!(scene.borrow().translation(player), Some(Vec3::new(1.0, 0.0, 0.0)));

    host.on_runtime_stop();
    assert!(host.scene_context().is_none());
    assert!(!host.on_update_script(player, Timestep(0.25)));
    assert_eq!(scene.borrow().translation(player), Some(Vec3::new(1.0, 0.0, 0.0)));
}

#[test]
fn partial_resolution_keeps_resolved_entries_callable() {
    reset_managed();
    let workspace = Workspace::new();
    let runtime = FakeRuntime::with_entries(&[EntryPoint::InteropInitialize, EntryPoint::OnUpdateEntity]);
    let mut host = workspace.host(&runtime);

    let report = host.init().expect("init with partial entries");
    assert_eq!(report.resolved, vec![EntryPoint::InteropInitialize, EntryPoint::OnUpdateEntity]);
    assert_eq!(
        report.missing,
        vec![EntryPoint::LoadGameAssembly, EntryPoint::ClassExists, EntryPoint::OnCreateEntity]
    );

    let (scene, player, _) = scene_with_scripts();
    host.on_runtime_start(&scene);
    assert!(!host.on_create_entity(player));
    assert!(host.on_update_script(player, Timestep(0.1)));
    assert!(matches!(
        host.load_app_assembly(&workspace.path().join("GameAssembly.dll")),
        Err(ScriptError::EntryPointMissing(EntryPoint::LoadGameAssembly))
    ));
}

#[test]
fn failed_reresolution_keeps_the_previous_pointer() {
    let workspace = Workspace::new();
    let runtime = FakeRuntime::default();
    let mut host = workspace.host(&runtime);
    host.init().expect("init");

    runtime.state.borrow_mut().available.remove(&EntryPoint::OnUpdateEntity);
    let core = workspace.path().join("ScriptCore.dll");
    assert!(matches!(host.resolve_entry::<OnUpdateEntityFn>(&core), Err(ScriptError::ManagedLookup { .. })));
    let report = host.load_assembly(&core).expect("reload core");
    assert_eq!(report.missing, vec![EntryPoint::OnUpdateEntity]);
    assert!(host.entry_points().is_resolved(EntryPoint::OnUpdateEntity));
}

#[test]
fn class_lookup_modes() {
    reset_managed();
    let workspace = Workspace::new();
    let runtime = FakeRuntime::default();

    let mut permissive = workspace.host(&runtime);
    permissive.init().expect("init");
    assert!(!permissive.entity_class_exists(""));
    assert!(permissive.entity_class_exists("Anything"));
    permissive.shutdown();
    assert!(managed_calls().iter().all(|call| !matches!(call, ManagedCall::ClassExists(_))));

    let config = ScriptingConfig { class_lookup: ClassLookup::Managed, ..workspace.config() };
    let mut managed = ScriptHost::with_runtime(config.clone(), Box::new(runtime.clone()));
    managed.init().expect("init");
    assert!(managed.entity_class_exists("Sandbox.Player"));
    assert!(!managed.entity_class_exists("Missing.Type"));
    assert!(!managed.entity_class_exists(""));
    managed.shutdown();

    let unresolved = FakeRuntime::with_entries(&[EntryPoint::InteropInitialize]);
    let mut fallback = ScriptHost::with_runtime(config, Box::new(unresolved));
    fallback.init().expect("init");
    assert!(fallback.entity_class_exists("Missing.Type"));
}
