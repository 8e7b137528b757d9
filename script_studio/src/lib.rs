pub use script_host::*;

pub mod project;
pub mod session;

pub use project::Project;
pub use session::{EditorSession, SceneState};
