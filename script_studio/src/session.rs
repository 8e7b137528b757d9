use script_host::scene::Scene;
use script_host::time::Timestep;
use script_host::{AssemblyReloader, ScriptHost};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{info, warn};

/// Describes the current editor execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneState {
    /// Editing the authored scene; nothing runs.
    Edit,
    /// Runtime play on a copy of the scene with managed scripts attached.
    Play,
    /// Runs the scene copy without scripts.
    Simulate,
}

/// Drives the scripting host the way the editor toolbar does.
pub struct EditorSession {
    host: ScriptHost,
    reloader: AssemblyReloader,
    editor_scene: Rc<RefCell<Scene>>,
    runtime_scene: Option<Rc<RefCell<Scene>>>,
    state: SceneState,
    error: Option<String>,
}

impl EditorSession {
    pub fn new(host: ScriptHost, reloader: AssemblyReloader, editor_scene: Scene) -> Self {
        Self {
            host,
            reloader,
            editor_scene: Rc::new(RefCell::new(editor_scene)),
            runtime_scene: None,
            state: SceneState::Edit,
            error: None,
        }
    }

    pub fn state(&self) -> SceneState {
        self.state
    }

    pub fn host(&self) -> &ScriptHost {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut ScriptHost {
        &mut self.host
    }

    pub fn editor_scene(&self) -> &Rc<RefCell<Scene>> {
        &self.editor_scene
    }

    /// The runtime copy while playing or simulating, otherwise the editor scene.
    pub fn active_scene(&self) -> Rc<RefCell<Scene>> {
        self.runtime_scene.clone().unwrap_or_else(|| self.editor_scene.clone())
    }

    pub fn last_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn on_scene_play(&mut self) {
        if self.state == SceneState::Simulate {
            self.on_scene_stop();
        }
        if self.state == SceneState::Play {
            return;
        }
        self.state = SceneState::Play;

        match self.reloader.reload_assembly(&mut self.host) {
            Ok(report) => {
                self.error = None;
                info!(assembly = %report.assembly.display(), "game assembly reloaded");
            }
            Err(err) => {
                warn!("game assembly reload failed; playing with the previous assembly: {err}");
                self.error = Some(err.to_string());
            }
        }

        let runtime = Rc::new(RefCell::new(self.editor_scene.borrow().duplicate()));
        self.host.on_runtime_start(&runtime);
        let scripted = runtime.borrow().scripted_entities();
        let created = scripted.into_iter().filter(|entity| self.host.on_create_entity(*entity)).count();
        self.runtime_scene = Some(runtime);
        info!(created, "entered play mode");
    }

    pub fn on_scene_simulate(&mut self) {
        if self.state == SceneState::Play {
            self.on_scene_stop();
        }
        if self.state == SceneState::Simulate {
            return;
        }
        self.state = SceneState::Simulate;
        self.runtime_scene = Some(Rc::new(RefCell::new(self.editor_scene.borrow().duplicate())));
        info!("entered simulation");
    }

    pub fn on_scene_stop(&mut self) {
        match self.state {
            SceneState::Edit => return,
            SceneState::Play => self.host.on_runtime_stop(),
            SceneState::Simulate => {}
        }
        self.state = SceneState::Edit;
        self.runtime_scene = None;
        info!("back to edit mode");
    }

    /// Runs one frame. Returns how many managed updates were dispatched.
    pub fn update(&mut self, timestep: Timestep) -> usize {
        if self.state != SceneState::Play {
            return 0;
        }
        let Some(scene) = self.runtime_scene.clone() else {
            return 0;
        };
        let scripted = scene.borrow().scripted_entities();
        scripted.into_iter().filter(|entity| self.host.on_update_script(*entity, timestep)).count()
    }
}
